//! `@import` expansion.
//!
//! A line consisting of `@import path` (the path optionally quoted) is replaced by a
//! container holding the imported file's body. Paths are resolved relative to the
//! directory of the file containing the directive. Expansion is depth-first, so nested
//! imports are spliced in before the next sibling directive is read.
//!
//! Each imported file's front matter is collected in pre-order; the imports stage merges
//! the collected mappings into the document with [`merge_sequence`](crate::frontmatter::merge_sequence).
//!
//! Runaway chains are stopped three ways: a file already on the current import chain is
//! skipped with a warning, nesting deeper than [`MAX_IMPORT_DEPTH`] is skipped, and a
//! global wall-clock budget aborts the whole expansion with [`ImportError::Timeout`].

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::ast::{Node, NodeKind, SourceSpan, parse_body};
use crate::constants::MAX_IMPORT_DEPTH;
use crate::frontmatter::{Deadline, FrontmatterParser, MergeError};

static IMPORT_DIRECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*@import\s+(?:"([^"]+)"|'([^']+)'|(\S+))\s*$"#)
        .expect("import pattern is valid")
});

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Import expansion exceeded its budget of {budget_ms}ms while importing '{}'", .path.display())]
    Timeout { path: PathBuf, budget_ms: u128 },

    #[error("Merging imported metadata failed: {0}")]
    Merge(#[from] MergeError),
}

/// Source of imported file contents.
pub trait FileReader {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;
}

/// Reads imports from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

impl FileReader for FsReader {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }
}

/// Serves imports from an in-memory map keyed by normalised path.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, String>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        self.files.insert(normalize_path(path.as_ref()), content.into());
    }
}

impl FileReader for MemoryReader {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        self.files.get(&normalize_path(path)).cloned().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no in-memory file at {}", path.display()),
            )
        })
    }
}

/// Path of an `@import` directive line, if the line is one.
pub fn parse_directive(line: &str) -> Option<&str> {
    let caps = IMPORT_DIRECTIVE.captures(line)?;
    caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)).map(|m| m.as_str())
}

/// Lexically normalise `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Everything an expansion produced besides the rewritten tree.
#[derive(Debug, Clone, Default)]
pub struct ImportExpansion {
    /// Front matter of each imported file, in pre-order.
    pub metadata: Vec<Value>,
    /// Every file that was spliced in, in pre-order.
    pub imported_files: Vec<PathBuf>,
    /// Skipped or unreadable imports and ignored front matter.
    pub warnings: Vec<String>,
}

/// Expands `@import` directives in a document tree.
pub struct ImportExpander<'a> {
    reader: &'a dyn FileReader,
    parser: &'a dyn FrontmatterParser,
    tracing: bool,
    budget: Duration,
}

impl<'a> ImportExpander<'a> {
    pub fn new(reader: &'a dyn FileReader, parser: &'a dyn FrontmatterParser) -> Self {
        Self {
            reader,
            parser,
            tracing: false,
            budget: crate::constants::DEFAULT_IMPORT_BUDGET,
        }
    }

    /// Wrap imported content in `<!-- start import -->` / `<!-- end import -->` comments.
    pub fn with_tracing(mut self, tracing: bool) -> Self {
        self.tracing = tracing;
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Expand every directive in `root`, resolving relative paths against `base_dir`.
    ///
    /// `main_file` is the document's own path when known; it starts the import chain so a
    /// document importing itself is detected.
    pub fn expand(
        &self,
        root: &mut Node,
        base_dir: &Path,
        main_file: Option<&Path>,
    ) -> Result<ImportExpansion, ImportError> {
        let deadline = Deadline::new("import expansion", self.budget);
        let mut chain: Vec<PathBuf> = main_file.map(normalize_path).into_iter().collect();
        let mut out = ImportExpansion::default();
        self.expand_children(&mut root.children, base_dir, &mut chain, &deadline, &mut out)?;
        Ok(out)
    }

    fn expand_children(
        &self,
        children: &mut Vec<Node>,
        dir: &Path,
        chain: &mut Vec<PathBuf>,
        deadline: &Deadline,
        out: &mut ImportExpansion,
    ) -> Result<(), ImportError> {
        for child in children.iter_mut() {
            if child.kind != NodeKind::Text {
                continue;
            }
            let Some(target) = parse_directive(&child.raw_text) else {
                continue;
            };
            let path = normalize_path(&dir.join(target));

            if deadline.is_expired() {
                return Err(ImportError::Timeout {
                    path,
                    budget_ms: deadline.budget().as_millis(),
                });
            }

            if chain.contains(&path) {
                let message = format!(
                    "Skipping circular import of '{}' (chain: {})",
                    path.display(),
                    chain.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" -> ")
                );
                warn!("{message}");
                out.warnings.push(message);
                *child = Node::container(Vec::new(), child.span.clone());
                continue;
            }
            if chain.len() >= MAX_IMPORT_DEPTH {
                let message = format!(
                    "Skipping import of '{}': nesting deeper than {MAX_IMPORT_DEPTH}",
                    path.display()
                );
                warn!("{message}");
                out.warnings.push(message);
                *child = Node::container(Vec::new(), child.span.clone());
                continue;
            }

            let content = match self.reader.read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    let message = format!("Cannot read import '{}': {e}", path.display());
                    warn!("{message}");
                    out.warnings.push(message);
                    continue;
                }
            };
            debug!("Importing {}", path.display());

            let parsed = self.parser.parse(&content);
            if let Some(warning) = parsed.warning {
                out.warnings.push(format!("{}: {warning}", path.display()));
            }
            out.metadata.push(parsed.metadata);
            out.imported_files.push(path.clone());

            let body = parsed.body.strip_suffix('\n').unwrap_or(&parsed.body);
            let mut imported = parse_body(body, Some(path.clone()));
            let child_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

            chain.push(path.clone());
            let result =
                self.expand_children(&mut imported.children, &child_dir, chain, deadline, out);
            chain.pop();
            result?;

            if self.tracing {
                let span = SourceSpan {
                    file: Some(path.clone()),
                    ..child.span.clone()
                };
                let display = path.display();
                imported
                    .children
                    .insert(0, Node::text(format!("<!-- start import: {display} -->"), span.clone()));
                imported.children.push(Node::text(format!("<!-- end import: {display} -->"), span));
            }
            imported.span = child.span.clone();
            *child = imported;
        }
        Ok(())
    }
}
