//! Core types for legal-md
//!
//! This module holds the crate-level error type and the user-facing error context used by
//! the CLI. Module-specific error types ([`ExpressionError`](crate::expression::ExpressionError),
//! [`MergeError`](crate::frontmatter::MergeError), [`ImportError`](crate::imports::ImportError),
//! [`PipelineConfigError`](crate::pipeline::PipelineConfigError)) live beside the code that
//! raises them and convert into [`LegalMdError`] where they are allowed to propagate.

pub mod error;

pub use error::{ErrorContext, LegalMdError, user_friendly_error};
