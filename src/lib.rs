//! legal-md - a templating and structural-numbering engine for Legal Markdown
//!
//! Documents combine a YAML front-matter block with a body written in the Legal Markdown
//! dialect:
//!
//! ```text
//! ---
//! client: Acme Corp
//! fee: 1500
//! level-one: "Article %n."
//! level-two: "Section %n."
//! ---
//! l. Services
//! ll. Payment |payment|
//! {{client}} pays {{formatCurrency(fee, "USD")}}.
//! Late payment is governed by |payment|[ and accrues interest]{fee > 1000}.
//! @import clauses/confidentiality.md
//! ```
//!
//! The engine resolves everything into final text plus metadata, a field report, per-stage
//! metrics and a diagnostics list.
//!
//! # Architecture Overview
//!
//! Processing runs a fixed pipeline of stages over a per-document AST:
//!
//! 1. `imports` - splice `@import` files and merge their front matter ("source always wins")
//! 2. `template` - apply `{{#if}}` blocks, then evaluate `{{ ... }}` expressions
//! 3. `crossref` - collect `|key|` definitions on headers and substitute references
//! 4. `headers` - number `l.` / `ll.` / ... headers from per-level format patterns
//! 5. `conditions` - apply inline `[text]{cond}` clauses
//! 6. `annotation` - turn field markers into HTML spans (field tracking only)
//!
//! # Core Modules
//!
//! - [`engine`] - the entry point, [`engine::Engine::process`]
//! - [`pipeline`] - stage trait, validation, failure isolation and metrics
//! - [`ast`] - document tree
//! - [`expression`] - expression parser, evaluator and helper library
//! - [`headers`] - section counters and the numbering format language
//! - [`crossref`] - cross-reference collection and substitution
//! - [`conditions`] - conditional clauses
//! - [`tracking`] - field registry, report and annotations
//! - [`frontmatter`] - front-matter parsing, flatten/unflatten, merging, reserved keys
//! - [`imports`] - `@import` expansion
//!
//! ## Supporting Modules
//! - [`config`] - [`config::ProcessOptions`] and its TOML form
//! - [`core`] - error types and user-facing error context
//! - [`constants`] - default budgets and marker characters
//! - [`cli`] - the `lmd` command

pub mod ast;
pub mod cli;
pub mod conditions;
pub mod config;
pub mod constants;
pub mod core;
pub mod crossref;
pub mod engine;
pub mod expression;
pub mod frontmatter;
pub mod headers;
pub mod imports;
pub mod pipeline;
pub mod tracking;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
