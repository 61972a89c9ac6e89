//! Integration test suite for legal-md
//!
//! End-to-end tests that drive the public engine API and the `lmd` binary.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **pipeline**: whole-document processing, invariants of the field report, isolation
//! - **imports**: `@import` expansion and metadata merging on a real filesystem
//! - **headers_crossrefs**: numbering formats and cross-reference resolution
//! - **cli**: the `lmd` command line

mod cli;
mod headers_crossrefs;
mod imports;
mod pipeline;
