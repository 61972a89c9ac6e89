//! Built-in helper functions callable from expressions.
//!
//! Helpers are pure, synchronous functions over already-evaluated arguments. None of them
//! performs I/O. A helper that receives an [`Resolved::Empty`] primary argument returns
//! `Empty` so a missing field stays missing instead of turning into a formatted blank.
//!
//! | Helper | Example |
//! |---|---|
//! | `formatDate(date, fmt?)` | `formatDate(start, "MMMM Do, YYYY")` |
//! | `addYears/addMonths/addDays(date, n)` | `addYears(@today, 3)` |
//! | `upper`, `lower`, `capitalize`, `titleCase`, `trim` | `upper(client.name)` |
//! | `concat(a, b, ...)`, `join(list, sep?)` | `join(parties, "; ")` |
//! | `default(value, fallback)` | `default(client.vat, "N/A")` |
//! | `pluralize(word, count)` | `pluralize("day", term)` |
//! | `formatInteger(n, sep?)`, `formatPercent(n, decimals?)`, `round(n, decimals?)` | |
//! | `formatCurrency(n, code?, decimals?)` | `formatCurrency(fee, "EUR")` |
//! | `numberToWords(n)` | `numberToWords(30)` → `thirty` |

use chrono::{Datelike, Months, NaiveDate, TimeDelta};
use serde_json::Value;
use std::collections::BTreeMap;
use strsim::levenshtein;

use super::eval::EvalContext;
use super::{Resolved, display_value};

/// Signature shared by all helpers. Errors are plain messages; the evaluator wraps them.
pub type HelperFn = fn(&[Resolved], &EvalContext<'_>) -> Result<Resolved, String>;

/// Maximum edit distance, as a percentage of the name length, for "did you mean" hints.
const SIMILARITY_THRESHOLD_PERCENT: usize = 50;

/// Name → function table.
#[derive(Clone)]
pub struct HelperRegistry {
    helpers: BTreeMap<&'static str, HelperFn>,
}

impl std::fmt::Debug for HelperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HelperRegistry").field("helpers", &self.helpers.keys()).finish()
    }
}

impl Default for HelperRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HelperRegistry {
    /// An empty registry: every call is an unknown helper.
    pub fn empty() -> Self {
        Self {
            helpers: BTreeMap::new(),
        }
    }

    /// Registry with every built-in helper.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("formatDate", format_date);
        registry.register("addYears", add_years);
        registry.register("addMonths", add_months);
        registry.register("addDays", add_days);
        registry.register("upper", |args, _| map_text(args, |s| s.to_uppercase()));
        registry.register("lower", |args, _| map_text(args, |s| s.to_lowercase()));
        registry.register("capitalize", |args, _| map_text(args, capitalize));
        registry.register("titleCase", |args, _| {
            map_text(args, |s| s.split(' ').map(capitalize).collect::<Vec<_>>().join(" "))
        });
        registry.register("trim", |args, _| map_text(args, |s| s.trim().to_string()));
        registry.register("concat", concat);
        registry.register("join", join);
        registry.register("default", default);
        registry.register("pluralize", pluralize);
        registry.register("formatInteger", format_integer);
        registry.register("formatPercent", format_percent);
        registry.register("formatCurrency", format_currency);
        registry.register("numberToWords", number_to_words_helper);
        registry.register("round", round);
        registry
    }

    /// Add or replace a helper.
    pub fn register(&mut self, name: &'static str, helper: HelperFn) {
        self.helpers.insert(name, helper);
    }

    pub fn get(&self, name: &str) -> Option<HelperFn> {
        self.helpers.get(name).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.helpers.keys().copied()
    }

    /// Closest registered name within the similarity threshold.
    pub fn suggest(&self, name: &str) -> Option<String> {
        let max_distance = (name.len() * SIMILARITY_THRESHOLD_PERCENT / 100).max(1);
        self.names()
            .map(|candidate| (levenshtein(name, candidate), candidate))
            .filter(|(distance, _)| *distance <= max_distance)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, candidate)| candidate.to_string())
    }
}

/// Numeric view of a value: numbers, and strings that parse as numbers (commas ignored).
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

/// `n` as an integer when it is whole and fits in `i64`.
pub(crate) fn whole_number(n: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, which is already out of range.
    (n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64)
        .then_some(n as i64)
}

fn count_arg(args: &[Resolved], index: usize, helper: &str) -> Result<i64, String> {
    let n = number_arg(args, index, helper)?.unwrap_or(0.0);
    whole_number(n.trunc()).ok_or_else(|| format!("{helper}: {n} is out of range"))
}

fn arg<'a>(args: &'a [Resolved], index: usize) -> Option<&'a Value> {
    args.get(index).and_then(Resolved::as_value)
}

fn text_arg(args: &[Resolved], index: usize) -> Option<String> {
    arg(args, index).map(display_value)
}

fn number_arg(args: &[Resolved], index: usize, helper: &str) -> Result<Option<f64>, String> {
    match arg(args, index) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => as_number(value)
            .map(Some)
            .ok_or_else(|| format!("argument {} to {helper} is not a number", index + 1)),
    }
}

fn text(value: impl Into<String>) -> Result<Resolved, String> {
    Ok(Resolved::Value(Value::String(value.into())))
}

fn map_text(args: &[Resolved], f: impl Fn(&str) -> String) -> Result<Resolved, String> {
    match text_arg(args, 0) {
        Some(s) => text(f(&s)),
        None => Ok(Resolved::Empty),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Parse `YYYY-MM-DD`, optionally followed by a time part.
pub(crate) fn parse_date(value: &Value) -> Option<NaiveDate> {
    let s = value.as_str()?.trim();
    let date_part = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn date_arg(args: &[Resolved], helper: &str) -> Result<Option<NaiveDate>, String> {
    match arg(args, 0) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            parse_date(value).map(Some).ok_or_else(|| format!("'{}' is not a date for {helper}", display_value(value)))
        }
    }
}

fn iso(date: NaiveDate) -> Result<Resolved, String> {
    text(date.format("%Y-%m-%d").to_string())
}

fn shift_months(date: NaiveDate, months: i64) -> Option<NaiveDate> {
    let magnitude = Months::new(u32::try_from(months.unsigned_abs()).ok()?);
    if months >= 0 {
        date.checked_add_months(magnitude)
    } else {
        date.checked_sub_months(magnitude)
    }
}

fn add_years(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(date) = date_arg(args, "addYears")? else {
        return Ok(Resolved::Empty);
    };
    let months = count_arg(args, 1, "addYears")?
        .checked_mul(12)
        .ok_or_else(|| "date out of range".to_string())?;
    shift_months(date, months).map_or_else(|| Err("date out of range".to_string()), iso)
}

fn add_months(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(date) = date_arg(args, "addMonths")? else {
        return Ok(Resolved::Empty);
    };
    let months = count_arg(args, 1, "addMonths")?;
    shift_months(date, months).map_or_else(|| Err("date out of range".to_string()), iso)
}

fn add_days(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(date) = date_arg(args, "addDays")? else {
        return Ok(Resolved::Empty);
    };
    let days = count_arg(args, 1, "addDays")?;
    TimeDelta::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .map_or_else(|| Err("date out of range".to_string()), iso)
}

const MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

fn ordinal_suffix(n: u32) -> &'static str {
    match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Render `date` with Moment-style tokens, or a chrono pattern when `%` is present.
pub(crate) fn render_date(date: NaiveDate, pattern: &str) -> String {
    if pattern.contains('%') {
        return date.format(pattern).to_string();
    }

    let month_name = MONTHS[date.month0() as usize];
    let weekday = date.weekday();
    let weekday_name = match weekday {
        chrono::Weekday::Mon => "Monday",
        chrono::Weekday::Tue => "Tuesday",
        chrono::Weekday::Wed => "Wednesday",
        chrono::Weekday::Thu => "Thursday",
        chrono::Weekday::Fri => "Friday",
        chrono::Weekday::Sat => "Saturday",
        chrono::Weekday::Sun => "Sunday",
    };

    let tokens: [(&str, String); 11] = [
        ("YYYY", format!("{:04}", date.year())),
        ("YY", format!("{:02}", date.year().rem_euclid(100))),
        ("MMMM", month_name.to_string()),
        ("MMM", month_name[..3].to_string()),
        ("MM", format!("{:02}", date.month())),
        ("M", date.month().to_string()),
        ("DD", format!("{:02}", date.day())),
        ("Do", format!("{}{}", date.day(), ordinal_suffix(date.day()))),
        ("D", date.day().to_string()),
        ("dddd", weekday_name.to_string()),
        ("ddd", weekday_name[..3].to_string()),
    ];

    let mut out = String::new();
    let mut rest = pattern;
    'scan: while !rest.is_empty() {
        for (token, replacement) in &tokens {
            if let Some(after) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = after;
                continue 'scan;
            }
        }
        let c = rest.chars().next().unwrap_or_default();
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

fn format_date(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(date) = date_arg(args, "formatDate")? else {
        return Ok(Resolved::Empty);
    };
    let pattern = text_arg(args, 1).unwrap_or_else(|| "YYYY-MM-DD".to_string());
    text(render_date(date, &pattern))
}

fn concat(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    text(args.iter().filter_map(Resolved::as_value).map(display_value).collect::<String>())
}

fn join(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let separator = text_arg(args, 1).unwrap_or_else(|| ", ".to_string());
    match arg(args, 0) {
        None => Ok(Resolved::Empty),
        Some(Value::Array(items)) => {
            text(items.iter().map(display_value).collect::<Vec<_>>().join(&separator))
        }
        Some(other) => text(display_value(other)),
    }
}

fn default(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    match args.first() {
        Some(first) if first.is_truthy() => Ok(first.clone()),
        _ => Ok(args.get(1).cloned().unwrap_or(Resolved::Empty)),
    }
}

fn pluralize(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(word) = text_arg(args, 0) else {
        return Ok(Resolved::Empty);
    };
    let count = number_arg(args, 1, "pluralize")?.unwrap_or(2.0);
    if count == 1.0 {
        return text(word);
    }
    let plural = if let Some(stem) = word.strip_suffix('y')
        && !stem.ends_with(['a', 'e', 'i', 'o', 'u'])
    {
        format!("{stem}ies")
    } else if word.ends_with(['s', 'x', 'z']) || word.ends_with("ch") || word.ends_with("sh") {
        format!("{word}es")
    } else {
        format!("{word}s")
    };
    text(plural)
}

/// Group the integer digits of `digits` with `separator` every three places.
fn group_thousands(digits: &str, separator: &str) -> String {
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

/// Fixed-point rendering with grouped thousands, e.g. `1234.5` → `1,234.50`.
pub(crate) fn format_grouped(n: f64, decimals: usize, separator: &str) -> String {
    let fixed = format!("{:.*}", decimals, n.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed, None),
    };
    let sign = if n < 0.0 && fixed_is_nonzero(&int_part, frac_part.as_deref()) {
        "-"
    } else {
        ""
    };
    let mut out = format!("{sign}{}", group_thousands(&int_part, separator));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(&frac);
    }
    out
}

fn fixed_is_nonzero(int_part: &str, frac_part: Option<&str>) -> bool {
    int_part.chars().chain(frac_part.unwrap_or("").chars()).any(|c| c != '0')
}

fn decimals_arg(args: &[Resolved], index: usize, helper: &str, default: usize) -> Result<usize, String> {
    Ok(number_arg(args, index, helper)?.map_or(default, |d| d.clamp(0.0, 10.0) as usize))
}

fn format_integer(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(n) = number_arg(args, 0, "formatInteger")? else {
        return Ok(Resolved::Empty);
    };
    let separator = text_arg(args, 1).unwrap_or_else(|| ",".to_string());
    text(format_grouped(n.round(), 0, &separator))
}

fn format_percent(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(n) = number_arg(args, 0, "formatPercent")? else {
        return Ok(Resolved::Empty);
    };
    let decimals = decimals_arg(args, 1, "formatPercent", 2)?;
    text(format!("{}%", format_grouped(n * 100.0, decimals, ",")))
}

fn format_currency(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(n) = number_arg(args, 0, "formatCurrency")? else {
        return Ok(Resolved::Empty);
    };
    let code = text_arg(args, 1).unwrap_or_else(|| "USD".to_string()).to_uppercase();
    let decimals = decimals_arg(args, 2, "formatCurrency", 2)?;
    let amount = format_grouped(n, decimals, ",");
    let symbol = match code.as_str() {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "JPY" => Some("¥"),
        _ => None,
    };
    match symbol {
        Some(symbol) => match amount.strip_prefix('-') {
            Some(positive) => text(format!("-{symbol}{positive}")),
            None => text(format!("{symbol}{amount}")),
        },
        None => text(format!("{amount} {code}")),
    }
}

fn round(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    let Some(n) = number_arg(args, 0, "round")? else {
        return Ok(Resolved::Empty);
    };
    let decimals = decimals_arg(args, 1, "round", 0)?;
    let factor = 10f64.powi(decimals as i32);
    let rounded = (n * factor).round() / factor;
    let value = match whole_number(rounded) {
        Some(whole) if decimals == 0 => Value::from(whole),
        _ => serde_json::Number::from_f64(rounded).map_or(Value::Null, Value::Number),
    };
    Ok(Resolved::Value(value))
}

const ONES: [&str; 20] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    "eleven", "twelve", "thirteen", "fourteen", "fifteen", "sixteen", "seventeen", "eighteen",
    "nineteen",
];
const TENS: [&str; 10] =
    ["", "", "twenty", "thirty", "forty", "fifty", "sixty", "seventy", "eighty", "ninety"];
const SCALES: [(u64, &str); 4] = [
    (1_000_000_000_000, "trillion"),
    (1_000_000_000, "billion"),
    (1_000_000, "million"),
    (1_000, "thousand"),
];

fn below_thousand(n: u64) -> String {
    let mut parts = Vec::new();
    let hundreds = n / 100;
    let rest = n % 100;
    if hundreds > 0 {
        parts.push(format!("{} hundred", ONES[hundreds as usize]));
    }
    if rest > 0 {
        if rest < 20 {
            parts.push(ONES[rest as usize].to_string());
        } else if rest % 10 == 0 {
            parts.push(TENS[(rest / 10) as usize].to_string());
        } else {
            parts.push(format!("{}-{}", TENS[(rest / 10) as usize], ONES[(rest % 10) as usize]));
        }
    }
    parts.join(" ")
}

/// English words for a whole number, e.g. `1205` → `one thousand two hundred five`.
pub fn number_to_words(n: i64) -> String {
    if n == 0 {
        return ONES[0].to_string();
    }
    let mut remaining = n.unsigned_abs();
    let mut parts = Vec::new();
    for (scale, name) in SCALES {
        if remaining >= scale {
            parts.push(format!("{} {name}", number_to_words((remaining / scale) as i64)));
            remaining %= scale;
        }
    }
    if remaining > 0 {
        parts.push(below_thousand(remaining));
    }
    let words = parts.join(" ");
    if n < 0 { format!("minus {words}") } else { words }
}

fn number_to_words_helper(args: &[Resolved], _: &EvalContext<'_>) -> Result<Resolved, String> {
    match number_arg(args, 0, "numberToWords")? {
        Some(n) => whole_number(n.trunc())
            .map(number_to_words)
            .map_or_else(|| Err(format!("numberToWords: {n} is out of range")), text),
        None => Ok(Resolved::Empty),
    }
}
