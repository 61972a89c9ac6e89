//! Front matter: splitting, parsing and metadata merging.
//!
//! A document may open with a YAML block delimited by `---` lines:
//!
//! ```text
//! ---
//! client:
//!   name: Acme Corp
//! level-one: "Article %n."
//! ---
//! l. Definitions
//! ```
//!
//! [`YamlFrontmatter`] splits that block off, parses it into a JSON-shaped mapping and
//! returns the body untouched. The submodules implement the metadata operations the
//! import stage relies on: [`flatten`] / [`flatten::unflatten`], the reserved-key
//! filter in [`reserved`], and the "source always wins" [`merge`].

pub mod flatten;
pub mod merge;
pub mod reserved;
pub mod shared;

use serde_json::{Map, Number, Value};
use std::time::{Duration, Instant};

pub use flatten::{MetadataNode, flatten, unflatten};
pub use merge::{MergeError, MergeOptions, MergeResult, TypeConflict, merge, merge_sequence};
pub use reserved::{ReservedKey, filter_reserved, is_reserved};
pub use shared::SharedValue;

/// Wall-clock budget for one bounded operation.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    operation: &'static str,
    started: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn new(operation: &'static str, budget: Duration) -> Self {
        Self {
            operation,
            started: Instant::now(),
            budget,
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn is_expired(&self) -> bool {
        self.started.elapsed() >= self.budget
    }

    pub fn check(&self) -> Result<(), MergeError> {
        if self.is_expired() {
            return Err(MergeError::Timeout {
                operation: self.operation.to_string(),
                budget_ms: self.budget.as_millis(),
            });
        }
        Ok(())
    }
}

/// Byte offsets of the front-matter block, delimiters included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontmatterBoundaries {
    pub start: usize,
    /// First byte of the body.
    pub end: usize,
    /// YAML text between the delimiter lines.
    pub yaml_start: usize,
    pub yaml_end: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFrontmatter {
    /// Always a mapping; empty when there was no block or it could not be used.
    pub metadata: Value,
    /// Everything after the closing delimiter, byte for byte.
    pub body: String,
    pub raw_frontmatter: Option<String>,
    /// Why the block was ignored, when it was.
    pub warning: Option<String>,
}

impl ParsedFrontmatter {
    pub fn has_frontmatter(&self) -> bool {
        self.raw_frontmatter.is_some()
    }
}

/// Turns raw document text into metadata plus body.
pub trait FrontmatterParser {
    fn parse(&self, content: &str) -> ParsedFrontmatter;
}

/// Default parser for `---` delimited YAML front matter.
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFrontmatter;

impl FrontmatterParser for YamlFrontmatter {
    fn parse(&self, content: &str) -> ParsedFrontmatter {
        let Some(bounds) = frontmatter_boundaries(content) else {
            return ParsedFrontmatter {
                metadata: Value::Object(Map::new()),
                body: content.to_string(),
                ..ParsedFrontmatter::default()
            };
        };

        let raw = &content[bounds.yaml_start..bounds.yaml_end];
        let (metadata, warning) = match serde_yaml::from_str::<serde_yaml::Value>(raw) {
            Ok(serde_yaml::Value::Null) => (Value::Object(Map::new()), None),
            Ok(yaml) => match yaml_to_json(yaml) {
                mapping @ Value::Object(_) => (mapping, None),
                _ => (
                    Value::Object(Map::new()),
                    Some("Front matter is not a mapping; metadata ignored".to_string()),
                ),
            },
            Err(e) => (
                Value::Object(Map::new()),
                Some(format!("Unable to parse YAML front matter: {e}")),
            ),
        };

        ParsedFrontmatter {
            metadata,
            body: content[bounds.end..].to_string(),
            raw_frontmatter: Some(raw.to_string()),
            warning,
        }
    }
}

/// Locate a leading `---` block whose delimiters sit on their own lines.
pub fn frontmatter_boundaries(content: &str) -> Option<FrontmatterBoundaries> {
    let start = content.len() - content.trim_start_matches('\u{feff}').len();
    let first_line_end = line_end(content, start);
    if content[start..first_line_end].trim_end() != "---" {
        return None;
    }
    let yaml_start = next_line(content, first_line_end);

    let mut cursor = yaml_start;
    while cursor < content.len() {
        let end = line_end(content, cursor);
        let line = content[cursor..end].trim_end();
        if line == "---" || line == "..." {
            return Some(FrontmatterBoundaries {
                start,
                end: next_line(content, end),
                yaml_start,
                yaml_end: cursor,
            });
        }
        cursor = next_line(content, end);
    }
    None
}

fn line_end(content: &str, from: usize) -> usize {
    content[from..].find('\n').map_or(content.len(), |i| from + i)
}

fn next_line(content: &str, line_end: usize) -> usize {
    (line_end + 1).min(content.len())
}

/// Convert parsed YAML into JSON. Non-string keys are stringified; tags are dropped.
pub fn yaml_to_json(yaml: serde_yaml::Value) -> Value {
    match yaml {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Number(i.into())
            } else if let Some(u) = n.as_u64() {
                Value::Number(u.into())
            } else {
                n.as_f64().and_then(Number::from_f64).map_or(Value::Null, Value::Number)
            }
        }
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.into_iter().map(yaml_to_json).collect())
        }
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match yaml_to_json(key) {
                    Value::String(s) => s,
                    Value::Null => "null".to_string(),
                    other => other.to_string(),
                };
                map.insert(key, yaml_to_json(value));
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_json(tagged.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_front_matter_and_body() {
        let doc = "---\ntitle: NDA\nclient:\n  name: Acme\n---\nl. Scope\n\nBody text\n";
        let parsed = YamlFrontmatter.parse(doc);
        assert_eq!(parsed.metadata, json!({"title": "NDA", "client": {"name": "Acme"}}));
        assert_eq!(parsed.body, "l. Scope\n\nBody text\n");
        assert!(parsed.warning.is_none());
    }

    #[test]
    fn test_no_front_matter() {
        let doc = "Just text\n---\nnot yaml";
        let parsed = YamlFrontmatter.parse(doc);
        assert!(!parsed.has_frontmatter());
        assert_eq!(parsed.body, doc);
        assert_eq!(parsed.metadata, json!({}));
    }

    #[test]
    fn test_malformed_yaml_is_not_fatal() {
        let parsed = YamlFrontmatter.parse("---\nkey: [unclosed\n---\nbody");
        assert_eq!(parsed.metadata, json!({}));
        assert_eq!(parsed.body, "body");
        assert!(parsed.warning.unwrap().contains("Unable to parse"));
    }

    #[test]
    fn test_scalar_front_matter_is_ignored() {
        let parsed = YamlFrontmatter.parse("---\njust a string\n---\nbody");
        assert_eq!(parsed.metadata, json!({}));
        assert!(parsed.warning.is_some());
    }

    #[test]
    fn test_empty_block_and_non_string_keys() {
        assert_eq!(YamlFrontmatter.parse("---\n---\nx").metadata, json!({}));
        let parsed = YamlFrontmatter.parse("---\n1: one\ntrue: yes\n---\n");
        assert_eq!(parsed.metadata, json!({"1": "one", "true": "yes"}));
        assert_eq!(parsed.body, "");
    }

    #[test]
    fn test_delimiter_must_be_whole_line() {
        assert!(frontmatter_boundaries("---x\na: 1\n---\n").is_none());
        assert!(frontmatter_boundaries("---\na: 1\n").is_none());
    }
}
