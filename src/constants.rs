//! Global constants used throughout the legal-md codebase.
//!
//! Wall-clock budgets, marker characters, and other values shared by more
//! than one module.

use std::time::Duration;

/// Default budget for flattening a single metadata mapping (5 seconds).
pub const DEFAULT_FLATTEN_BUDGET: Duration = Duration::from_secs(5);

/// Default budget for one two-way merge (10 seconds).
pub const DEFAULT_MERGE_BUDGET: Duration = Duration::from_secs(10);

/// Default budget for folding every import's metadata into the document (15 seconds).
pub const DEFAULT_SEQUENCE_BUDGET: Duration = Duration::from_secs(15);

/// Default global budget for recursive `@import` expansion (30 seconds).
///
/// This is the backstop that keeps self-importing or mutually importing files
/// from hanging the run when the visited-chain check cannot see the cycle
/// (for example when paths differ only by normalisation).
pub const DEFAULT_IMPORT_BUDGET: Duration = Duration::from_secs(30);

/// Number of hierarchical header levels (`l.` through `lllllllll.`).
pub const MAX_HEADER_LEVEL: usize = 9;

/// Largest `level-indent` honoured; bigger values are clamped to it.
pub const MAX_LEVEL_INDENT: f64 = 8.0;

/// Sentinel substituted for a container that is revisited while flattening.
pub const CIRCULAR_REFERENCE_SENTINEL: &str = "[Circular Reference]";

/// Metadata key under which cross-reference definitions are published.
pub const CROSS_REFERENCES_KEY: &str = "_cross_references";

/// Opens an annotation marker: `OPEN name SEP value CLOSE`.
///
/// Markers use private-use code points that never occur in authored text.
pub const FIELD_MARKER_OPEN: char = '\u{E000}';

/// Separates the field name from the value inside an annotation marker.
pub const FIELD_MARKER_SEP: char = '\u{E001}';

/// Closes an annotation marker.
pub const FIELD_MARKER_CLOSE: char = '\u{E002}';

/// Maximum `@import` nesting depth before a branch is abandoned.
pub const MAX_IMPORT_DEPTH: usize = 32;
