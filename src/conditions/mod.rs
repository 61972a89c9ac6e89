//! Conditional clauses.
//!
//! Two forms are supported:
//!
//! * inline: `[text shown when true]{condition}`
//! * block: `{{#if condition}}` ... `{{else}}` ... `{{/if}}`, either within one line or with
//!   each marker on its own line around any number of lines. Blocks nest.
//!
//! Conditions use the expression language. An inline clause whose condition cannot be
//! evaluated is left as written. A block whose condition cannot be evaluated is treated
//! as false, since its markers cannot be left half-applied across lines.
//!
//! Blocks are template syntax and are applied by [`apply_blocks`] before any header is
//! numbered, so a header inside a hidden block never takes a number. [`apply_conditions`]
//! applies both forms in one pass.

use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

use crate::ast::{Node, NodeKind};
use crate::expression::{EvalContext, evaluate_str};

static INLINE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]]*)\]\{([^{}]+)\}").expect("inline clause pattern is valid")
});

static BLOCK_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{\{\s*#if\s+(.+?)\s*\}\}$").expect("block pattern is valid"));

const ELSE_MARKER: &str = "{{else}}";
const CLOSE_MARKER: &str = "{{/if}}";

/// What a pass over the document did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionOutcome {
    /// Inline clauses and single-line blocks that were resolved.
    pub inline_resolved: usize,
    /// Lines dropped by block conditions, marker lines included.
    pub removed_lines: usize,
    pub warnings: Vec<String>,
}

/// Apply every conditional clause in `root`: blocks first, then inline clauses.
pub fn apply_conditions(root: &mut Node, ctx: &EvalContext<'_>) -> ConditionOutcome {
    let mut outcome = apply_blocks(root, ctx);
    for leaf in root.text_leaves_mut() {
        let (line, resolved) = resolve_inline_clauses(&leaf.raw_text, ctx, &mut outcome.warnings);
        if resolved > 0 {
            leaf.raw_text = line;
            outcome.inline_resolved += resolved;
        }
    }
    outcome
}

/// Apply `{{#if}}` blocks only, both single-line and multi-line.
pub fn apply_blocks(root: &mut Node, ctx: &EvalContext<'_>) -> ConditionOutcome {
    let mut outcome = ConditionOutcome::default();

    for leaf in root.text_leaves_mut() {
        let (line, resolved) = resolve_line_blocks(&leaf.raw_text, ctx, &mut outcome.warnings);
        if resolved > 0 {
            leaf.raw_text = line;
            outcome.inline_resolved += resolved;
        }
    }

    let mut blocks = BlockState::default();
    let before = root.leaves().len();
    root.retain_leaves(|leaf| blocks.keep(leaf, ctx));
    outcome.removed_lines = before - root.leaves().len();
    outcome.warnings.append(&mut blocks.finish());
    outcome
}

/// Resolve blocks that open and close within one line.
///
/// Returns the rewritten line and the number of blocks resolved.
fn resolve_line_blocks(
    line: &str,
    ctx: &EvalContext<'_>,
    warnings: &mut Vec<String>,
) -> (String, usize) {
    let mut text = line.to_string();
    let mut resolved = 0;

    // Innermost first: the first close pairs with the nearest open.
    let mut from = 0;
    while let Some(close) = text[from..].find(CLOSE_MARKER).map(|i| from + i) {
        let after_close = close + CLOSE_MARKER.len();
        let Some(open) = text[..close].rfind("{{#if") else {
            from = after_close;
            continue;
        };
        let Some(open_end) = text[open..close].find("}}").map(|i| open + i + 2) else {
            from = after_close;
            continue;
        };
        let condition = text[open + 5..open_end - 2].trim().to_string();
        let body = &text[open_end..close];
        let (when_true, when_false) = body.split_once(ELSE_MARKER).unwrap_or((body, ""));

        match evaluate_str(&condition, ctx) {
            Ok(value) => {
                let chosen = if value.is_truthy() { when_true } else { when_false }.to_string();
                text.replace_range(open..after_close, &chosen);
                resolved += 1;
                from = open;
            }
            Err(e) => {
                let message = format!("Condition '{condition}' left unresolved: {e}");
                warn!("{message}");
                warnings.push(message);
                from = after_close;
            }
        }
    }
    (text, resolved)
}

/// Resolve `[text]{condition}` clauses in one line.
fn resolve_inline_clauses(
    line: &str,
    ctx: &EvalContext<'_>,
    warnings: &mut Vec<String>,
) -> (String, usize) {
    let mut resolved = 0;
    let rewritten = INLINE_CLAUSE.replace_all(line, |caps: &regex::Captures<'_>| {
        match evaluate_str(caps[2].trim(), ctx) {
            Ok(value) => {
                resolved += 1;
                if value.is_truthy() {
                    caps[1].to_string()
                } else {
                    String::new()
                }
            }
            Err(e) => {
                let message = format!("Condition '{}' left unresolved: {e}", caps[2].trim());
                warn!("{message}");
                warnings.push(message);
                caps[0].to_string()
            }
        }
    });
    (rewritten.into_owned(), resolved)
}

struct Frame {
    /// Whether the enclosing content is shown.
    parent_active: bool,
    condition: bool,
    in_else: bool,
}

impl Frame {
    fn active(&self) -> bool {
        self.parent_active && (self.condition != self.in_else)
    }
}

/// Line-by-line state for multi-line blocks.
#[derive(Default)]
struct BlockState {
    frames: Vec<Frame>,
    warnings: Vec<String>,
}

impl BlockState {
    fn active(&self) -> bool {
        self.frames.last().is_none_or(Frame::active)
    }

    fn keep(&mut self, leaf: &Node, ctx: &EvalContext<'_>) -> bool {
        if leaf.kind != NodeKind::Text {
            return self.active();
        }
        let line = leaf.raw_text.trim();

        if let Some(caps) = BLOCK_OPEN.captures(line) {
            let parent_active = self.active();
            let condition = parent_active && self.evaluate(&caps[1], ctx);
            self.frames.push(Frame {
                parent_active,
                condition,
                in_else: false,
            });
            return false;
        }
        if line == ELSE_MARKER {
            match self.frames.last_mut() {
                Some(frame) if !frame.in_else => {
                    frame.in_else = true;
                    return false;
                }
                _ => {
                    self.warn(format!("Unmatched {ELSE_MARKER} on line {}", leaf.span.start_line));
                    return self.active();
                }
            }
        }
        if line == CLOSE_MARKER {
            if self.frames.pop().is_some() {
                return false;
            }
            self.warn(format!("Unmatched {CLOSE_MARKER} on line {}", leaf.span.start_line));
            return true;
        }
        self.active()
    }

    fn evaluate(&mut self, condition: &str, ctx: &EvalContext<'_>) -> bool {
        match evaluate_str(condition, ctx) {
            Ok(value) => value.is_truthy(),
            Err(e) => {
                self.warn(format!("Block condition '{condition}' treated as false: {e}"));
                false
            }
        }
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.warnings.push(message);
    }

    fn finish(mut self) -> Vec<String> {
        if !self.frames.is_empty() {
            let open = self.frames.len();
            self.warn(format!("{open} conditional block(s) not closed before end of document"));
        }
        self.warnings
    }
}
