//! Test utilities for legal-md
//!
//! Helpers shared by unit tests and the integration suite:
//! - one-time logging initialisation
//! - document fixtures that can be written to a temporary directory or served from memory
//! - an engine preconfigured for deterministic output
//!
//! # Example
//!
//! ```rust,no_run
//! use legal_md::test_utils::{DocumentSet, init_test_logging, test_engine};
//!
//! init_test_logging(None);
//! let dir = tempfile::tempdir().unwrap();
//! let paths = DocumentSet::service_agreement().write_to(dir.path()).unwrap();
//! let doc = test_engine().process_file(&paths[0]).unwrap();
//! assert!(doc.resolved_text.starts_with("Article 1. Services"));
//! ```

pub mod fixtures;

pub use fixtures::{DocumentFixture, DocumentSet};

use chrono::NaiveDate;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::config::ProcessOptions;
use crate::engine::Engine;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` when given, otherwise `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=legal_md=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Date `@today` resolves to in [`test_options`].
pub fn test_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default()
}

/// Default options with a fixed `@today`.
pub fn test_options() -> ProcessOptions {
    ProcessOptions {
        today: Some(test_today()),
        ..ProcessOptions::default()
    }
}

/// Engine over [`test_options`], reading from disk.
pub fn test_engine() -> Engine {
    Engine::new(test_options()).expect("canonical pipeline is valid")
}
