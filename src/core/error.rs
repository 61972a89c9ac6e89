//! Error handling for legal-md
//!
//! The error system follows two rules:
//! 1. **Per-field failures never propagate.** An expression that fails to parse, a helper
//!    that does not exist, or a cross-reference that cannot be resolved leaves the original
//!    text in place and is reported through the field report and the diagnostics list.
//! 2. **Structural failures always propagate.** Budget timeouts, critical stage failures and
//!    pipeline configuration errors surface as a [`LegalMdError`] and produce no output.
//!
//! [`ErrorContext`] wraps a [`LegalMdError`] with details and a suggestion for display in
//! the CLI, mirroring how the error is presented to a document author.
//!
//! # Examples
//!
//! ```rust,no_run
//! use legal_md::core::{LegalMdError, user_friendly_error};
//!
//! let err = LegalMdError::CriticalStage {
//!     stage: "imports".to_string(),
//!     message: "import budget of 30000ms exceeded".to_string(),
//! };
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

use crate::frontmatter::MergeError;
use crate::imports::ImportError;
use crate::pipeline::PipelineConfigError;

/// The main error type for legal-md operations.
///
/// Only failures that abort a whole run are represented here. Anything that can be
/// recovered from by leaving text unresolved is reported as a
/// [`Diagnostic`](crate::pipeline::Diagnostic) instead.
#[derive(Error, Debug)]
pub enum LegalMdError {
    /// The pipeline's stage set is inconsistent for the given options.
    #[error("Pipeline configuration error: {0}")]
    Configuration(#[from] PipelineConfigError),

    /// A stage marked critical failed; the run produced no output.
    #[error("Critical stage '{stage}' failed: {message}")]
    CriticalStage {
        /// Name of the failing stage
        stage: String,
        /// Rendered cause chain
        message: String,
    },

    /// Flattening or merging metadata exceeded its wall-clock budget.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Import expansion failed structurally (timeout or merge failure).
    #[error(transparent)]
    Import(#[from] ImportError),

    /// The options file could not be parsed.
    #[error("Invalid options file '{path}': {reason}")]
    InvalidOptions {
        /// Options file path
        path: String,
        /// Parser message
        reason: String,
    },

    /// Reading or writing a file failed.
    #[error("File operation failed: {operation} on {path}")]
    FileSystem {
        /// What was attempted
        operation: String,
        /// The path involved
        path: String,
    },

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error context wrapper that provides user-friendly error information.
///
/// Details are shown in yellow and suggestions in green when displayed in a terminal.
#[derive(Debug)]
pub struct ErrorContext {
    /// Short message for the failure
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from any displayable error.
    #[must_use]
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            message: error.to_string(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with suggestions tailored to the failure.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(err) = error.downcast_ref::<LegalMdError>() {
        return context_for(err);
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        return match io_error.kind() {
            std::io::ErrorKind::NotFound => ErrorContext::new(&error)
                .with_suggestion("Check that the document path is correct"),
            std::io::ErrorKind::PermissionDenied => ErrorContext::new(&error)
                .with_suggestion("Check the file permissions of the document and its imports"),
            _ => ErrorContext::new(&error),
        };
    }

    let chain: Vec<String> = error.chain().skip(1).map(ToString::to_string).collect();
    let ctx = ErrorContext::new(&error);
    if chain.is_empty() {
        ctx
    } else {
        ctx.with_details(chain.join(": "))
    }
}

fn context_for(err: &LegalMdError) -> ErrorContext {
    match err {
        LegalMdError::Configuration(_) => ErrorContext::new(err)
            .with_details("Stages must run after every enabled stage they depend on")
            .with_suggestion("Re-enable the dependency or disable the dependent stage"),
        LegalMdError::CriticalStage {
            stage,
            ..
        } if stage == "imports" => ErrorContext::new(err)
            .with_details("The imports stage is critical: a failed import aborts the run")
            .with_suggestion(
                "Check for files that import themselves, or remove 'imports' from critical-stages",
            ),
        LegalMdError::CriticalStage {
            ..
        } => ErrorContext::new(err)
            .with_suggestion("Run with --verbose to see the stage log"),
        LegalMdError::Merge(_) | LegalMdError::Import(_) => ErrorContext::new(err)
            .with_details("Metadata processing has a wall-clock budget to stop runaway documents")
            .with_suggestion("Look for very large or self-referencing front matter"),
        LegalMdError::InvalidOptions {
            ..
        } => ErrorContext::new(err)
            .with_suggestion("Options files use TOML with kebab-case keys"),
        LegalMdError::FileSystem {
            ..
        }
        | LegalMdError::Io(_) => ErrorContext::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_critical_stage_message_names_stage() {
        let err = LegalMdError::CriticalStage {
            stage: "imports".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Critical stage 'imports' failed: boom");
    }

    #[test]
    fn test_user_friendly_error_adds_suggestion_for_imports() {
        let err = LegalMdError::CriticalStage {
            stage: "imports".to_string(),
            message: "timeout".to_string(),
        };
        let ctx = user_friendly_error(anyhow::Error::from(err));
        assert!(ctx.suggestion.is_some());
        assert!(ctx.to_string().contains("Suggestion:"));
    }

    #[test]
    fn test_user_friendly_error_keeps_anyhow_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        let ctx = user_friendly_error(err);
        assert_eq!(ctx.message, "outer");
        assert_eq!(ctx.details.as_deref(), Some("inner"));
    }
}
