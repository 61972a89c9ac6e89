//! "Source always wins" metadata merging.
//!
//! Both sides are flattened and merged leaf by leaf, so sibling keys under the same
//! mapping are combined individually. A leaf present on both sides keeps the current
//! value and is recorded as a conflict. Reserved keys are stripped from the imported
//! side before anything else happens.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::Deadline;
use super::flatten::{flatten, separator_offsets, unflatten};
use super::reserved::filter_reserved;
use crate::constants::{DEFAULT_FLATTEN_BUDGET, DEFAULT_MERGE_BUDGET, DEFAULT_SEQUENCE_BUDGET};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MergeError {
    #[error("{operation} exceeded its budget of {budget_ms}ms")]
    Timeout { operation: String, budget_ms: u128 },
}

/// Budgets and switches for a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Record leaf type mismatches in [`MergeResult::type_conflicts`].
    pub validate_types: bool,
    pub flatten_budget: Duration,
    pub merge_budget: Duration,
    pub sequence_budget: Duration,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            validate_types: false,
            flatten_budget: DEFAULT_FLATTEN_BUDGET,
            merge_budget: DEFAULT_MERGE_BUDGET,
            sequence_budget: DEFAULT_SEQUENCE_BUDGET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeConflict {
    pub key: String,
    pub current_type: &'static str,
    pub imported_type: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    /// Nested metadata after the merge.
    pub merged: Value,
    /// Flattened keys where the current value was kept over an imported one.
    pub conflicts: Vec<String>,
    /// Imported keys dropped by the reserved-key filter.
    pub filtered: Vec<String>,
    pub type_conflicts: Vec<TypeConflict>,
}

/// Merge `imported` into `current`; `current` wins every clash.
pub fn merge(
    current: &Value,
    imported: &Value,
    options: &MergeOptions,
) -> Result<MergeResult, MergeError> {
    let deadline = Deadline::new("metadata merge", options.merge_budget);

    let mut flat_current = flatten(&current, &Deadline::new("flatten", options.flatten_budget))?;
    let mut flat_imported =
        flatten(&imported, &Deadline::new("flatten", options.flatten_budget))?;
    let filtered = filter_reserved(&mut flat_imported);
    if !filtered.is_empty() {
        debug!("Dropped reserved keys from imported metadata: {}", filtered.join(", "));
    }

    // Every interior path of the current tree; an imported leaf there would replace a subtree.
    let interior: HashSet<String> = flat_current
        .keys()
        .flat_map(|key| separator_offsets(key).into_iter().map(move |i| key[..i].to_string()))
        .collect();

    let mut conflicts = Vec::new();
    let mut type_conflicts = Vec::new();

    for (key, value) in flat_imported {
        deadline.check()?;

        if let Some(existing) = flat_current.get(&key) {
            if options.validate_types && type_name(existing) != type_name(&value) {
                type_conflicts.push(TypeConflict {
                    key: key.clone(),
                    current_type: type_name(existing),
                    imported_type: type_name(&value),
                });
            }
            conflicts.push(key);
            continue;
        }

        let runs_through_leaf =
            separator_offsets(&key).into_iter().any(|i| flat_current.contains_key(&key[..i]));
        if runs_through_leaf || interior.contains(&key) {
            conflicts.push(key);
            continue;
        }

        flat_current.insert(key, value);
    }

    Ok(MergeResult {
        merged: unflatten(&flat_current),
        conflicts,
        filtered,
        type_conflicts,
    })
}

/// Fold several imports into `current` in order.
///
/// Priority is `current`, then the first import, then the second, and so on. The
/// sequence budget is checked before each import's merge.
pub fn merge_sequence(
    current: &Value,
    imports: &[Value],
    options: &MergeOptions,
) -> Result<MergeResult, MergeError> {
    let deadline = Deadline::new("import metadata sequence", options.sequence_budget);
    let mut result = MergeResult {
        merged: current.clone(),
        ..MergeResult::default()
    };

    for imported in imports {
        deadline.check()?;
        let step = merge(&result.merged, imported, options)?;
        result.merged = step.merged;
        result.conflicts.extend(step.conflicts);
        result.filtered.extend(step.filtered);
        result.type_conflicts.extend(step.type_conflicts);
    }
    Ok(result)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_always_wins_per_leaf() {
        let current = json!({"client": {"name": "Acme"}, "term": 12});
        let imported = json!({"client": {"name": "Other", "city": "Lyon"}, "term": 24, "law": "FR"});
        let result = merge(&current, &imported, &MergeOptions::default()).unwrap();
        assert_eq!(
            result.merged,
            json!({"client": {"name": "Acme", "city": "Lyon"}, "term": 12, "law": "FR"})
        );
        assert_eq!(result.conflicts, ["client.name", "term"]);
        assert!(result.type_conflicts.is_empty());
    }

    #[test]
    fn test_reserved_keys_never_merged() {
        let current = json!({"title": "NDA"});
        let imported = json!({"level-one": "Hacked %n", "_cross_references": [], "ok": 1});
        let result = merge(&current, &imported, &MergeOptions::default()).unwrap();
        assert_eq!(result.merged, json!({"title": "NDA", "ok": 1}));
        assert_eq!(result.filtered, ["_cross_references", "level-one"]);
    }

    #[test]
    fn test_structure_clashes_keep_current() {
        let current = json!({"party": "Acme", "address": {"city": "Rome"}});
        let imported = json!({"party": {"name": "X"}, "address": "flat"});
        let result = merge(&current, &imported, &MergeOptions::default()).unwrap();
        assert_eq!(result.merged, current);
        assert_eq!(result.conflicts, ["address", "party.name"]);
    }

    #[test]
    fn test_type_validation_records_without_blocking() {
        let options = MergeOptions {
            validate_types: true,
            ..MergeOptions::default()
        };
        let result = merge(&json!({"amount": 100}), &json!({"amount": "100"}), &options).unwrap();
        assert_eq!(result.merged, json!({"amount": 100}));
        assert_eq!(
            result.type_conflicts,
            [TypeConflict {
                key: "amount".to_string(),
                current_type: "number",
                imported_type: "string",
            }]
        );
    }

    #[test]
    fn test_sequence_priority() {
        let imports = [json!({"a": 1, "b": 1}), json!({"a": 2, "b": 2, "c": 2})];
        let result = merge_sequence(&json!({"a": 0}), &imports, &MergeOptions::default()).unwrap();
        assert_eq!(result.merged, json!({"a": 0, "b": 1, "c": 2}));
    }

    #[test]
    fn test_sequence_timeout() {
        let options = MergeOptions {
            sequence_budget: Duration::ZERO,
            ..MergeOptions::default()
        };
        let result = merge_sequence(&json!({}), &[json!({"a": 1})], &options);
        assert_eq!(
            result,
            Err(MergeError::Timeout {
                operation: "import metadata sequence".to_string(),
                budget_ms: 0,
            })
        );
    }
}
