//! Hierarchical header numbering.
//!
//! A header line starts with a level marker, either repeated letters (`l.`, `ll.`, ...
//! up to nine) or a letter plus digit (`l1.` .. `l9.`), followed by the title:
//!
//! ```text
//! l. Definitions
//! ll. Confidential Information |confidential|
//! ```
//!
//! Each level's display pattern comes from metadata keys `level-one` .. `level-nine`
//! and uses the tokens documented in [`format`]. Levels without a pattern render the
//! placeholder `{{undefined-level-N}}` so the gap is visible in the output.
//!
//! A trailing `|key|` on a header registers a cross-reference target and is removed
//! from the rendered line.

pub mod format;

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::constants::{MAX_HEADER_LEVEL, MAX_LEVEL_INDENT};
pub use format::render_format;

static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(l{1,9}|l[1-9])\.\s+(.*)$").expect("header pattern is valid")
});

static TRAILING_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s*\|([A-Za-z_][\w.-]*)\|\s*$").expect("key pattern is valid")
});

const LEVEL_NAMES: [&str; MAX_HEADER_LEVEL] =
    ["one", "two", "three", "four", "five", "six", "seven", "eight", "nine"];

/// A recognised header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    /// 1-based level.
    pub level: usize,
    /// Title with any trailing `|key|` removed.
    pub title: String,
    /// Cross-reference key defined by this header.
    pub reference_key: Option<String>,
}

/// Recognise a header line. Returns `None` for ordinary text.
pub fn parse_header_line(line: &str) -> Option<HeaderLine> {
    let caps = HEADER_LINE.captures(line)?;
    let marker = &caps[1];
    let level = match marker.as_bytes() {
        [b'l', d @ b'1'..=b'9'] => usize::from(d - b'0'),
        _ => marker.len(),
    };
    let rest = caps.get(2).map_or("", |m| m.as_str());

    let (title, reference_key) = match TRAILING_KEY.captures(rest) {
        Some(key) => {
            let whole = key.get(0).map_or(rest.len(), |m| m.start());
            (rest[..whole].to_string(), Some(key[1].to_string()))
        }
        None => (rest.trim_end().to_string(), None),
    };

    Some(HeaderLine {
        level,
        title,
        reference_key,
    })
}

/// Running section counters for levels 1..=9.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionCounters {
    counters: [u32; MAX_HEADER_LEVEL],
}

impl SectionCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter value at `level` (1-based). Out-of-range levels read as zero.
    pub fn get(&self, level: usize) -> u32 {
        level.checked_sub(1).and_then(|i| self.counters.get(i)).copied().unwrap_or(0)
    }

    pub fn set(&mut self, level: usize, value: u32) {
        if let Some(slot) = level.checked_sub(1).and_then(|i| self.counters.get_mut(i)) {
            *slot = value;
        }
    }

    /// Count one more header at `level` and reset every deeper level.
    pub fn advance(&mut self, level: usize) {
        let level = level.clamp(1, MAX_HEADER_LEVEL);
        self.counters[level - 1] += 1;
        for deeper in &mut self.counters[level..] {
            *deeper = 0;
        }
    }

    pub fn reset(&mut self) {
        self.counters = [0; MAX_HEADER_LEVEL];
    }
}

/// Per-level patterns plus indentation, read from document metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderFormats {
    patterns: [Option<String>; MAX_HEADER_LEVEL],
    /// Indent unit per level; each unit is two spaces.
    pub level_indent: f64,
}

impl HeaderFormats {
    pub fn from_metadata(metadata: &Value) -> Self {
        let mut formats = Self::default();
        for (i, name) in LEVEL_NAMES.iter().enumerate() {
            formats.patterns[i] = match metadata.get(format!("level-{name}")) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };
        }
        let level_indent = match metadata.get("level-indent") {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        };
        formats.level_indent = clamp_indent(level_indent);
        formats
    }

    pub fn with_pattern(mut self, level: usize, pattern: impl Into<String>) -> Self {
        if let Some(slot) = level.checked_sub(1).and_then(|i| self.patterns.get_mut(i)) {
            *slot = Some(pattern.into());
        }
        self
    }

    pub fn pattern(&self, level: usize) -> Option<&str> {
        level.checked_sub(1).and_then(|i| self.patterns.get(i)).and_then(|p| p.as_deref())
    }

    /// Leading spaces for a header at `level`.
    pub fn indent(&self, level: usize) -> String {
        let depth = level.clamp(1, MAX_HEADER_LEVEL) - 1;
        let width = (depth as f64 * clamp_indent(self.level_indent) * 2.0).round();
        " ".repeat(width as usize)
    }
}

/// Non-finite or negative indents become 0; large ones are capped.
fn clamp_indent(unit: f64) -> f64 {
    if unit.is_finite() { unit.clamp(0.0, MAX_LEVEL_INDENT) } else { 0.0 }
}

/// Numbering state for one pass over a document.
#[derive(Debug, Clone, Default)]
pub struct HeaderNumberer {
    counters: SectionCounters,
    formats: HeaderFormats,
}

impl HeaderNumberer {
    pub fn new(formats: HeaderFormats) -> Self {
        Self {
            counters: SectionCounters::new(),
            formats,
        }
    }

    pub fn counters(&self) -> &SectionCounters {
        &self.counters
    }

    /// Advance the counters for `level` and return its formatted section number.
    pub fn number(&mut self, level: usize) -> String {
        let level = level.clamp(1, MAX_HEADER_LEVEL);
        self.counters.advance(level);
        match self.formats.pattern(level) {
            Some(pattern) => render_format(pattern, level, &self.counters),
            None => format!("{{{{undefined-level-{level}}}}}"),
        }
    }

    /// Render a parsed header as its final output line.
    pub fn render(&mut self, header: &HeaderLine) -> String {
        let number = self.number(header.level);
        let indent = self.formats.indent(header.level);
        match (number.is_empty(), header.title.is_empty()) {
            (true, _) => format!("{indent}{}", header.title),
            (false, true) => format!("{indent}{number}"),
            (false, false) => format!("{indent}{number} {}", header.title),
        }
    }
}
