//! Expression evaluator for `{{ ... }}` mixins and conditional clauses.
//!
//! An expression is parsed into an [`Expr`] tree by a recursive-descent [`parser`] and
//! evaluated by a tree walk in [`eval`]. The result is a [`Resolved`] value, which keeps a
//! missing variable ([`Resolved::Empty`]) distinct from a present-but-falsy one; the field
//! tracking registry relies on that distinction to classify fields.
//!
//! # Failure contract
//!
//! Nothing in this module panics or aborts a document on bad input. Parse errors, unknown
//! helpers and helper failures come back as [`ExpressionError`] values and the calling stage
//! leaves the original `{{ ... }}` text in place.
//!
//! # Examples
//!
//! ```
//! use legal_md::expression::{EvalContext, HelperRegistry, Resolved, evaluate_str};
//! use serde_json::json;
//!
//! let metadata = json!({"client": {"name": "Acme"}, "years": 3});
//! let helpers = HelperRegistry::builtin();
//! let ctx = EvalContext::new(&metadata, &helpers);
//!
//! let value = evaluate_str("years > 2 ? upper(client.name) : 'n/a'", &ctx).unwrap();
//! assert_eq!(value, Resolved::Value(json!("ACME")));
//! ```

pub mod eval;
pub mod helpers;
pub mod parser;

use serde_json::Value;
use std::ops::Range;
use thiserror::Error;

pub use eval::{EvalContext, evaluate, evaluate_str};
pub use helpers::HelperRegistry;
pub use parser::{parse, split_arguments, split_helper_call};

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Quoted string, number, `true`/`false` or `null`.
    Literal(Value),
    /// Dot-separated metadata path such as `client.address.city` or `parties[0].name`.
    Path(VariablePath),
    /// Engine-provided variable such as `@today`.
    Special(String),
    /// Helper call with arguments evaluated depth-first.
    Call { name: String, args: Vec<Expr> },
    Not(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// True for anything beyond a bare variable path or literal.
    ///
    /// Fields produced by such expressions are classified as `Logic` by the tracker.
    pub fn has_logic(&self) -> bool {
        !matches!(self, Expr::Path(_) | Expr::Literal(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    And,
    Or,
}

/// A variable path split into segments. Numeric segments index arrays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariablePath {
    segments: Vec<String>,
}

impl VariablePath {
    /// Parse `a.b[0].c` / `a.b.0.c`. Returns `None` for empty segments or bad brackets.
    pub fn parse(text: &str) -> Option<Self> {
        let mut segments = Vec::new();
        for part in text.split('.') {
            let (head, mut rest) = match part.find('[') {
                Some(i) => (&part[..i], &part[i..]),
                None => (part, ""),
            };
            if head.is_empty() && (rest.is_empty() || segments.is_empty()) {
                return None;
            }
            if !head.is_empty() {
                segments.push(head.to_string());
            }
            while !rest.is_empty() {
                let close = rest.find(']')?;
                let index = &rest[1..close];
                if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                segments.push(index.to_string());
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return None;
                }
            }
        }
        Some(Self {
            segments,
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Look the path up in `root`. A missing step yields [`Resolved::Empty`].
    pub fn resolve(&self, root: &Value) -> Resolved {
        let mut current = root;
        for segment in &self.segments {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Resolved::Empty,
            }
        }
        Resolved::Value(current.clone())
    }
}

impl std::fmt::Display for VariablePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// Outcome of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The referenced variable does not exist.
    Empty,
    Value(Value),
}

impl Resolved {
    /// True for `Empty` and for a present `null`.
    pub fn is_empty(&self) -> bool {
        matches!(self, Resolved::Empty | Resolved::Value(Value::Null))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Resolved::Empty => None,
            Resolved::Value(v) => Some(v),
        }
    }

    /// Boolean interpretation used by `&&`, `||`, `!`, ternaries and conditional clauses.
    pub fn is_truthy(&self) -> bool {
        match self {
            Resolved::Empty => false,
            Resolved::Value(v) => match v {
                Value::Null => false,
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                Value::String(s) => !s.is_empty(),
                Value::Array(items) => !items.is_empty(),
                Value::Object(map) => !map.is_empty(),
            },
        }
    }
}

/// Render a metadata value as document text.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(", "),
        Value::Object(_) => value.to_string(),
    }
}

/// Errors raised while parsing or evaluating one expression. Never fatal to a document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExpressionError {
    #[error("cannot parse '{input}' at offset {offset}: {message}")]
    Parse {
        input: String,
        offset: usize,
        message: String,
    },

    #[error("unknown helper '{name}'{}", suggestion_suffix(.suggestion))]
    UnknownHelper {
        name: String,
        suggestion: Option<String>,
    },

    #[error("helper '{helper}' failed: {message}")]
    Helper { helper: String, message: String },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default()
}

/// One `{{ ... }}` occurrence in a line of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixinSpan {
    /// Byte range of the whole `{{ ... }}` including braces.
    pub range: Range<usize>,
    /// Trimmed inner expression text.
    pub inner: String,
}

impl MixinSpan {
    /// Block-conditional markers (`{{#if ..}}`, `{{else}}`, `{{/if}}`) are applied as blocks,
    /// never evaluated as expressions.
    pub fn is_block_marker(&self) -> bool {
        self.inner.starts_with('#') || self.inner.starts_with('/') || self.inner == "else"
    }
}

/// Find every `{{ ... }}` in `text`. Quotes inside the braces may contain `}}`.
pub fn scan_mixins(text: &str) -> Vec<MixinSpan> {
    let mut spans = Vec::new();
    let mut search_from = 0;

    while let Some(found) = text[search_from..].find("{{") {
        let start = search_from + found;
        let body_start = start + 2;
        let mut quote: Option<char> = None;
        let mut escaped = false;
        let mut end = None;
        let body = &text[body_start..];

        for (offset, c) in body.char_indices() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    quote = None;
                }
                continue;
            }
            match c {
                '"' | '\'' => quote = Some(c),
                '}' if body[offset..].starts_with("}}") => {
                    end = Some(body_start + offset);
                    break;
                }
                _ => {}
            }
        }

        match end {
            Some(close) => {
                spans.push(MixinSpan {
                    range: start..close + 2,
                    inner: text[body_start..close].trim().to_string(),
                });
                search_from = close + 2;
            }
            None => break,
        }
    }
    spans
}
