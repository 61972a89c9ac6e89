//! Metadata export requested by the document itself.
//!
//! A document may set these reserved front-matter keys:
//!
//! ```yaml
//! meta-output-path: build/meta
//! meta-json-output: contract.json
//! meta-yaml-output: contract.yaml
//! ```
//!
//! The final metadata (including `_cross_references`) is written to each requested file.
//! Output paths are relative to `meta-output-path`, which is itself relative to the
//! document's directory.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::frontmatter::ReservedKey;

/// Write the requested exports and return the paths written.
pub fn export_metadata(metadata: &Value, document_dir: &Path) -> Result<Vec<PathBuf>> {
    let string_key = |key: ReservedKey| metadata.get(key.as_str()).and_then(Value::as_str);
    let out_dir = match string_key(ReservedKey::MetaOutputPath) {
        Some(dir) => document_dir.join(dir),
        None => document_dir.to_path_buf(),
    };

    let mut written = Vec::new();
    if let Some(name) = string_key(ReservedKey::MetaJsonOutput) {
        let path = out_dir.join(name);
        write_file(&path, &serde_json::to_string_pretty(metadata)?)?;
        written.push(path);
    }
    if let Some(name) = string_key(ReservedKey::MetaYamlOutput) {
        let path = out_dir.join(name);
        write_file(&path, &serde_yaml::to_string(metadata)?)?;
        written.push(path);
    }
    Ok(written)
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write metadata to {}", path.display()))?;
    debug!("Wrote metadata export {}", path.display());
    Ok(())
}
