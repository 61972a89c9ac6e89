//! Header format mini-language.
//!
//! | Token | Meaning |
//! |---|---|
//! | `%n` | current level number |
//! | `%a` / `%A` | current level as lower / upper letters (`a`..`z`, `aa`, ...) |
//! | `%r` / `%R` | current level as lower / upper Roman numerals |
//! | `%l1`..`%l9` | counter of any level, for dotted formats like `%l1.%l2.%l3` |
//! | `%0{w}n`, `%0{w}l{k}` | zero-padded to width `w` (at most 9), e.g. `%02n`, `%03l1` |
//!
//! Anything else after `%`, including a wider padding, is copied verbatim.

use super::SectionCounters;

/// Widest zero padding a format may request.
const MAX_PAD_WIDTH: usize = 9;

/// Render `pattern` for a header at `level` given the already-advanced counters.
pub fn render_format(pattern: &str, level: usize, counters: &SectionCounters) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut rest = pattern;

    while let Some(percent) = rest.find('%') {
        out.push_str(&rest[..percent]);
        let after = &rest[percent + 1..];
        match parse_token(after) {
            Some((token, consumed)) => {
                out.push_str(&token.render(level, counters));
                rest = &after[consumed..];
            }
            None => {
                out.push('%');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Number { width: usize },
    LowerAlpha,
    UpperAlpha,
    LowerRoman,
    UpperRoman,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token {
    style: Style,
    /// `None` for the current level, `Some(k)` for `%l{k}`.
    level: Option<usize>,
}

impl Token {
    fn render(self, current: usize, counters: &SectionCounters) -> String {
        let value = counters.get(self.level.unwrap_or(current));
        match self.style {
            Style::Number {
                width,
            } => format!("{value:0width$}"),
            Style::LowerAlpha => to_alpha(value),
            Style::UpperAlpha => to_alpha(value).to_uppercase(),
            Style::LowerRoman => to_roman(value).to_lowercase(),
            Style::UpperRoman => to_roman(value),
        }
    }
}

/// Parse the token following a `%`. Returns the token and the bytes consumed.
fn parse_token(input: &str) -> Option<(Token, usize)> {
    let bytes = input.as_bytes();
    let simple = |style| {
        Some((
            Token {
                style,
                level: None,
            },
            1,
        ))
    };

    match bytes.first()? {
        b'n' => simple(Style::Number {
            width: 0,
        }),
        b'a' => simple(Style::LowerAlpha),
        b'A' => simple(Style::UpperAlpha),
        b'r' => simple(Style::LowerRoman),
        b'R' => simple(Style::UpperRoman),
        b'l' => {
            let level = level_digit(bytes.get(1))?;
            Some((
                Token {
                    style: Style::Number {
                        width: 0,
                    },
                    level: Some(level),
                },
                2,
            ))
        }
        b'0' => {
            let digits = input[1..].bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            let width: usize = input[1..1 + digits].parse().ok()?;
            if width > MAX_PAD_WIDTH {
                return None;
            }
            let tail = 1 + digits;
            match bytes.get(tail)? {
                b'n' => Some((
                    Token {
                        style: Style::Number {
                            width,
                        },
                        level: None,
                    },
                    tail + 1,
                )),
                b'l' => {
                    let level = level_digit(bytes.get(tail + 1))?;
                    Some((
                        Token {
                            style: Style::Number {
                                width,
                            },
                            level: Some(level),
                        },
                        tail + 2,
                    ))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn level_digit(byte: Option<&u8>) -> Option<usize> {
    match byte {
        Some(b @ b'1'..=b'9') => Some(usize::from(b - b'0')),
        _ => None,
    }
}

/// Bijective base-26: 1 → `a`, 26 → `z`, 27 → `aa`. Zero renders as `0`.
pub fn to_alpha(mut n: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Upper-case Roman numerals. Zero renders as `0`.
pub fn to_roman(mut n: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    const TABLE: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for (value, numeral) in TABLE {
        while n >= value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}
