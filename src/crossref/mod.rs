//! Cross-references between numbered sections.
//!
//! A header ending in `|key|` defines a reference target; `|key|` anywhere else in the
//! body is replaced by that header's section number:
//!
//! ```text
//! ll. Confidentiality |conf|
//! ...
//! The obligations in |conf| survive termination.
//! ```
//!
//! Resolution runs in two passes. [`CrossReferences::collect`] numbers every header with
//! its own [`HeaderNumberer`], since it runs before the header stage, and records each
//! definition. [`CrossReferences::substitute`] then rewrites text leaves. A key with no
//! definition falls back to a metadata lookup; anything else is left untouched.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;

use crate::ast::{Node, NodeKind};
use crate::constants::CROSS_REFERENCES_KEY;
use crate::expression::{Resolved, VariablePath, display_value};
use crate::headers::{HeaderFormats, HeaderNumberer, parse_header_line};
use crate::tracking::{FieldRegistry, mark, strip_markers};

static REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\|([A-Za-z_][\w.-]*)\|").expect("reference pattern is valid"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossReferenceDefinition {
    pub key: String,
    /// Rendered number, e.g. `Section 2.`
    pub section_number: String,
    /// Number plus title, e.g. `Section 2. Confidentiality`
    pub section_text: String,
}

/// Definitions collected from one document, in first-definition order.
#[derive(Debug, Clone, Default)]
pub struct CrossReferences {
    definitions: Vec<CrossReferenceDefinition>,
    index: HashMap<String, usize>,
}

impl CrossReferences {
    /// First pass: number every header and record the ones carrying a key.
    ///
    /// Returns the definitions and one warning per duplicated key. A later duplicate
    /// replaces the earlier definition.
    pub fn collect(root: &Node, metadata: &Value) -> (Self, Vec<String>) {
        let mut numberer = HeaderNumberer::new(HeaderFormats::from_metadata(metadata));
        let mut refs = Self::default();
        let mut warnings = Vec::new();

        for leaf in root.leaves() {
            if leaf.kind != NodeKind::Text {
                continue;
            }
            let Some(header) = parse_header_line(&leaf.raw_text) else {
                continue;
            };
            let section_number = numberer.number(header.level);
            let Some(key) = header.reference_key else {
                continue;
            };

            let section_text = if header.title.is_empty() {
                section_number.clone()
            } else {
                format!("{section_number} {}", strip_markers(&header.title))
            };
            let definition = CrossReferenceDefinition {
                key: key.clone(),
                section_number,
                section_text,
            };

            match refs.index.get(&key) {
                Some(&i) => {
                    let message = format!(
                        "Duplicate cross-reference key '{key}': '{}' replaces '{}'",
                        definition.section_text, refs.definitions[i].section_text
                    );
                    warn!("{message}");
                    warnings.push(message);
                    refs.definitions[i] = definition;
                }
                None => {
                    refs.index.insert(key, refs.definitions.len());
                    refs.definitions.push(definition);
                }
            }
        }
        (refs, warnings)
    }

    pub fn definitions(&self) -> &[CrossReferenceDefinition] {
        &self.definitions
    }

    pub fn get(&self, key: &str) -> Option<&CrossReferenceDefinition> {
        self.index.get(key).map(|&i| &self.definitions[i])
    }

    /// Second pass: replace `|key|` in every text leaf. Returns the substitution count.
    ///
    /// Each substitution is tracked as `crossref.<key>` with status `Logic`. With
    /// `annotate` set, substituted values carry annotation markers.
    pub fn substitute(
        &self,
        root: &mut Node,
        metadata: &Value,
        registry: &mut FieldRegistry,
        annotate: bool,
    ) -> usize {
        let mut count = 0;
        for leaf in root.text_leaves_mut() {
            // The defining key on a header line belongs to the header stage.
            let cut = parse_header_line(&leaf.raw_text)
                .and_then(|h| h.reference_key)
                .and_then(|key| leaf.raw_text.rfind(&format!("|{key}|")))
                .unwrap_or(leaf.raw_text.len());

            let (rewritten, replaced) = {
                let (head, tail) = leaf.raw_text.split_at(cut);
                let mut replaced = 0;
                let body = REFERENCE.replace_all(head, |caps: &regex::Captures<'_>| {
                    let key = &caps[1];
                    match self.resolve(key, metadata) {
                        Some(value) => {
                            let field = format!("crossref.{key}");
                            registry.track_logic(&field, Value::String(value.clone()), &caps[0]);
                            replaced += 1;
                            if annotate {
                                mark(&field, &value)
                            } else {
                                value
                            }
                        }
                        None => caps[0].to_string(),
                    }
                });
                (format!("{body}{tail}"), replaced)
            };
            if replaced > 0 {
                leaf.raw_text = rewritten;
                count += replaced;
            }
        }
        count
    }

    fn resolve(&self, key: &str, metadata: &Value) -> Option<String> {
        if let Some(definition) = self.get(key) {
            return Some(definition.section_number.clone());
        }
        match VariablePath::parse(key)?.resolve(metadata) {
            Resolved::Value(value) if !value.is_null() => Some(display_value(&value)),
            _ => None,
        }
    }

    /// Store the definitions under the reserved `_cross_references` key.
    pub fn publish(&self, metadata: &mut Value) {
        if let Value::Object(map) = metadata {
            let list = serde_json::to_value(&self.definitions).unwrap_or(Value::Array(Vec::new()));
            map.insert(CROSS_REFERENCES_KEY.to_string(), list);
        }
    }
}
