//! Field tracking registry.
//!
//! Every resolving stage records the fields it produced in a [`FieldRegistry`] owned by
//! the current run. The registry classifies each field as filled, empty or computed by
//! logic, and the final [`FieldReport`] aggregates those records.
//!
//! When field tracking is enabled, stages also wrap each inserted value in an invisible
//! annotation marker (see [`mark`]). The annotation stage turns markers into HTML spans
//! as its last step; markers left anywhere else are stripped before output.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::constants::{FIELD_MARKER_CLOSE, FIELD_MARKER_OPEN, FIELD_MARKER_SEP};
use crate::expression::Resolved;

/// Classification of one tracked field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldStatus {
    Filled,
    Empty,
    Logic,
}

impl FieldStatus {
    /// CSS class used by the annotation stage.
    pub fn css_class(self) -> &'static str {
        match self {
            FieldStatus::Filled => "imported-value",
            FieldStatus::Empty => "missing-value",
            FieldStatus::Logic => "highlight",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedField {
    pub name: String,
    /// `None` when the field did not resolve.
    pub value: Option<Value>,
    pub original_text: String,
    pub status: FieldStatus,
    pub has_logic: bool,
}

/// Aggregate counts plus every tracked field in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FieldReport {
    pub total: usize,
    pub filled: usize,
    pub empty: usize,
    pub logic: usize,
    pub fields: Vec<TrackedField>,
}

/// Per-run store of tracked fields.
///
/// Construct one per document run, or call [`clear`](Self::clear) before reusing an
/// instance for another document.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: Vec<TrackedField>,
    index: HashMap<String, usize>,
}

impl FieldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&TrackedField> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[TrackedField] {
        &self.fields
    }

    /// Record a resolved field and return its status.
    ///
    /// `Logic` when `has_logic`, otherwise `Empty` for a missing or null value,
    /// otherwise `Filled`. Tracking the same name again replaces the earlier record.
    pub fn track(
        &mut self,
        name: &str,
        value: &Resolved,
        original_text: &str,
        has_logic: bool,
    ) -> FieldStatus {
        let status = if has_logic {
            FieldStatus::Logic
        } else if value.is_empty() {
            FieldStatus::Empty
        } else {
            FieldStatus::Filled
        };
        self.insert(TrackedField {
            name: name.to_string(),
            value: value.as_value().cloned(),
            original_text: original_text.to_string(),
            status,
            has_logic,
        });
        status
    }

    /// Record a field whose status is `Logic` regardless of its value.
    pub fn track_logic(&mut self, name: &str, value: Value, original_text: &str) -> FieldStatus {
        self.insert(TrackedField {
            name: name.to_string(),
            value: Some(value),
            original_text: original_text.to_string(),
            status: FieldStatus::Logic,
            has_logic: true,
        });
        FieldStatus::Logic
    }

    fn insert(&mut self, field: TrackedField) {
        match self.index.get(&field.name) {
            Some(&i) => self.fields[i] = field,
            None => {
                self.index.insert(field.name.clone(), self.fields.len());
                self.fields.push(field);
            }
        }
    }

    /// Whether `slice` may be wrapped in an annotation for `field`.
    ///
    /// False when the slice already carries an annotation for that field, or when
    /// `preceding` (the text before the slice) leaves it inside inline code.
    pub fn should_annotate(&self, slice: &str, field: &str, preceding: &str) -> bool {
        !inside_inline_code(preceding) && !is_annotated(slice, field)
    }

    pub fn report(&self) -> FieldReport {
        let count = |status| self.fields.iter().filter(|f| f.status == status).count();
        FieldReport {
            total: self.fields.len(),
            filled: count(FieldStatus::Filled),
            empty: count(FieldStatus::Empty),
            logic: count(FieldStatus::Logic),
            fields: self.fields.clone(),
        }
    }
}

fn is_annotated(slice: &str, field: &str) -> bool {
    let trimmed = slice.trim_start();
    trimmed.starts_with("<span class=\"legal-field")
        && trimmed.contains(&format!("data-field=\"{}\"", escape_attr(field)))
}

/// Wrap `value` in an annotation marker for `field`.
pub fn mark(field: &str, value: &str) -> String {
    format!("{FIELD_MARKER_OPEN}{field}{FIELD_MARKER_SEP}{value}{FIELD_MARKER_CLOSE}")
}

/// True when an odd number of backticks precede the end of `prefix` on its line.
pub fn inside_inline_code(prefix: &str) -> bool {
    let line = prefix.rsplit('\n').next().unwrap_or(prefix);
    line.matches('`').count() % 2 == 1
}

/// Remove every marker, keeping the marked values.
pub fn strip_markers(text: &str) -> String {
    rewrite_markers(text, |_, value, _| value.to_string())
}

/// Replace markers with `<span>` annotations classified by the registry.
///
/// Values inside inline code are left bare. Values that already carry an annotation for
/// the same field are not wrapped again.
pub fn annotate(text: &str, registry: &FieldRegistry) -> String {
    rewrite_markers(text, |field, value, prefix| {
        if !registry.should_annotate(value, field, prefix) {
            return value.to_string();
        }
        let class = registry.get(field).map_or(FieldStatus::Filled, |f| f.status).css_class();
        format!(
            "<span class=\"legal-field {class}\" data-field=\"{}\">{value}</span>",
            escape_attr(field)
        )
    })
}

/// Rewrite markers innermost-first in one pass. `render(field, value, prefix)` receives
/// the text already emitted before the marker so callers can inspect its context.
///
/// Stray closing markers are dropped; an unclosed marker keeps its text.
fn rewrite_markers(text: &str, mut render: impl FnMut(&str, &str, &str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    // Output offset of each open marker and of its separator, if seen.
    let mut open: Vec<(usize, Option<usize>)> = Vec::new();

    for c in text.chars() {
        match c {
            FIELD_MARKER_OPEN => open.push((out.len(), None)),
            FIELD_MARKER_SEP => {
                if let Some((_, sep @ None)) = open.last_mut() {
                    *sep = Some(out.len());
                }
            }
            FIELD_MARKER_CLOSE => {
                let Some((start, sep)) = open.pop() else {
                    continue;
                };
                let sep = sep.unwrap_or(start);
                let replacement = render(&out[start..sep], &out[sep..], &out[..start]);
                out.truncate(start);
                out.push_str(&replacement);
            }
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(value: &str) -> String {
    value.replace('&', "&amp;").replace('"', "&quot;").replace('<', "&lt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_classification() {
        let mut registry = FieldRegistry::new();
        assert_eq!(
            registry.track("a", &Resolved::Value(json!("x")), "{{a}}", false),
            FieldStatus::Filled
        );
        assert_eq!(registry.track("b", &Resolved::Empty, "{{b}}", false), FieldStatus::Empty);
        assert_eq!(
            registry.track("c", &Resolved::Value(Value::Null), "{{c}}", false),
            FieldStatus::Empty
        );
        assert_eq!(registry.track("d", &Resolved::Empty, "{{upper(d)}}", true), FieldStatus::Logic);
        // Falsy but present is still filled.
        assert_eq!(
            registry.track("e", &Resolved::Value(json!(false)), "{{e}}", false),
            FieldStatus::Filled
        );

        let report = registry.report();
        assert_eq!((report.total, report.filled, report.empty, report.logic), (5, 2, 2, 1));
        assert_eq!(report.total, report.filled + report.empty + report.logic);
    }

    #[test]
    fn test_retracking_replaces_entry() {
        let mut registry = FieldRegistry::new();
        registry.track("name", &Resolved::Empty, "{{name}}", false);
        registry.track("name", &Resolved::Value(json!("Acme")), "{{name}}", false);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("name").unwrap().status, FieldStatus::Filled);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut registry = FieldRegistry::new();
        registry.track_logic("crossref.x", json!("Section 1."), "|x|");
        registry.clear();
        assert!(registry.is_empty());
        assert_eq!(registry.report(), FieldReport::default());
    }

    #[test]
    fn test_annotate_classes() {
        let mut registry = FieldRegistry::new();
        registry.track("party", &Resolved::Value(json!("Acme")), "{{party}}", false);
        registry.track("missing", &Resolved::Empty, "{{missing}}", false);
        let text = format!("{} and {}", mark("party", "Acme"), mark("missing", "{{missing}}"));
        assert_eq!(
            annotate(&text, &registry),
            "<span class=\"legal-field imported-value\" data-field=\"party\">Acme</span> and \
             <span class=\"legal-field missing-value\" data-field=\"missing\">{{missing}}</span>"
        );
    }

    #[test]
    fn test_no_annotation_inside_inline_code() {
        let mut registry = FieldRegistry::new();
        registry.track("x", &Resolved::Value(json!("1")), "{{x}}", false);
        let text = format!("`code {}` then {}", mark("x", "1"), mark("x", "1"));
        let out = annotate(&text, &registry);
        assert!(out.starts_with("`code 1` then <span"));

        assert!(!registry.should_annotate("1", "x", "see `code "));
        assert!(registry.should_annotate("1", "x", "`code` then "));
        assert!(registry.should_annotate("1", "x", "`open\nnext line "));
    }

    #[test]
    fn test_no_double_wrapping() {
        let mut registry = FieldRegistry::new();
        registry.track("x", &Resolved::Value(json!("1")), "{{x}}", false);
        let already = "<span class=\"legal-field imported-value\" data-field=\"x\">1</span>";
        assert!(!registry.should_annotate(already, "x", ""));
        assert!(registry.should_annotate(already, "y", ""));
        assert_eq!(annotate(&mark("x", already), &registry), already);
    }

    #[test]
    fn test_strip_nested_and_stray_markers() {
        let nested = mark("outer", &format!("a {} b", mark("inner", "v")));
        assert_eq!(strip_markers(&nested), "a v b");
        let stray = format!("x{FIELD_MARKER_CLOSE}y{FIELD_MARKER_OPEN}z");
        assert_eq!(strip_markers(&stray), "xyz");
    }

    #[test]
    fn test_nested_markers_render_innermost_first() {
        let nested = mark("outer", &format!("a {} b", mark("inner", "v")));
        let mut seen = Vec::new();
        let out = rewrite_markers(&format!("pre {nested}"), |field, value, prefix| {
            seen.push((field.to_string(), value.to_string(), prefix.to_string()));
            format!("[{value}]")
        });
        assert_eq!(out, "pre [a [v] b]");
        assert_eq!(
            seen,
            [
                ("inner".to_string(), "v".to_string(), "pre outera ".to_string()),
                ("outer".to_string(), "a [v] b".to_string(), "pre ".to_string()),
            ]
        );
    }

    #[test]
    fn test_many_markers_in_one_line() {
        let line: String = (0..2000).map(|i| mark("n", &i.to_string())).collect::<Vec<_>>().join(" ");
        let stripped = strip_markers(&line);
        assert!(stripped.starts_with("0 1 2 "));
        assert!(stripped.ends_with(" 1999"));
    }
}
