//! Run options for the processing engine.
//!
//! [`ProcessOptions`] controls which stages run, which of them are critical, how much
//! wall-clock time metadata and import processing may take, and a few output switches.
//! It can be built in code or loaded from a TOML file with kebab-case keys:
//!
//! ```toml
//! field-tracking = true
//! import-tracing = false
//! base-path = "contracts/clauses"
//! disabled-stages = ["conditions"]
//! critical-stages = ["imports"]
//! validate-merge-types = true
//! today = "2024-01-31"
//!
//! [budgets]
//! flatten-ms = 5000
//! merge-ms = 10000
//! sequence-ms = 15000
//! import-ms = 30000
//! ```
//!
//! Level formats (`level-one` .. `level-nine`, `level-indent`) are not options: they are
//! read from the main document's front matter.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    DEFAULT_FLATTEN_BUDGET, DEFAULT_IMPORT_BUDGET, DEFAULT_MERGE_BUDGET, DEFAULT_SEQUENCE_BUDGET,
};
use crate::core::LegalMdError;
use crate::frontmatter::MergeOptions;

fn default_critical_stages() -> Vec<String> {
    vec!["imports".to_string()]
}

/// Options for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProcessOptions {
    /// Wrap resolved values in `<span class="legal-field ...">` annotations.
    pub field_tracking: bool,

    /// Surround imported content with `<!-- start import -->` comments.
    pub import_tracing: bool,

    /// Directory `@import` paths are resolved against. Defaults to the document's directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,

    /// Stage names to skip.
    pub disabled_stages: Vec<String>,

    /// Stage names whose failure aborts the run.
    #[serde(default = "default_critical_stages")]
    pub critical_stages: Vec<String>,

    /// Record type mismatches between document and imported metadata.
    pub validate_merge_types: bool,

    /// Fixed date for `@today`; the local date when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub today: Option<NaiveDate>,

    pub budgets: Budgets,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            field_tracking: false,
            import_tracing: false,
            base_path: None,
            disabled_stages: Vec::new(),
            critical_stages: default_critical_stages(),
            validate_merge_types: false,
            today: None,
            budgets: Budgets::default(),
        }
    }
}

/// Wall-clock budgets in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Budgets {
    pub flatten_ms: u64,
    pub merge_ms: u64,
    pub sequence_ms: u64,
    pub import_ms: u64,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            flatten_ms: DEFAULT_FLATTEN_BUDGET.as_millis() as u64,
            merge_ms: DEFAULT_MERGE_BUDGET.as_millis() as u64,
            sequence_ms: DEFAULT_SEQUENCE_BUDGET.as_millis() as u64,
            import_ms: DEFAULT_IMPORT_BUDGET.as_millis() as u64,
        }
    }
}

impl Budgets {
    pub fn import(&self) -> Duration {
        Duration::from_millis(self.import_ms)
    }
}

impl ProcessOptions {
    /// Load options from a TOML file. Missing keys take their defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read options from {}", path.display()))?;
        Self::from_toml(&content).map_err(|reason| {
            LegalMdError::InvalidOptions {
                path: path.display().to_string(),
                reason,
            }
            .into()
        })
    }

    /// Parse options from TOML text, returning the parser message on failure.
    pub fn from_toml(content: &str) -> std::result::Result<Self, String> {
        toml::from_str(content).map_err(|e| e.message().to_string())
    }

    pub fn is_stage_disabled(&self, name: &str) -> bool {
        self.disabled_stages.iter().any(|s| s == name)
    }

    pub fn is_stage_critical(&self, name: &str) -> bool {
        self.critical_stages.iter().any(|s| s == name)
    }

    pub fn merge_options(&self) -> MergeOptions {
        MergeOptions {
            validate_types: self.validate_merge_types,
            flatten_budget: Duration::from_millis(self.budgets.flatten_ms),
            merge_budget: Duration::from_millis(self.budgets.merge_ms),
            sequence_budget: Duration::from_millis(self.budgets.sequence_ms),
        }
    }
}
