//! Recursive-descent parser for `{{ ... }}` expressions.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! ternary    := or ( '?' ternary ':' ternary )?
//! or         := and ( '||' and )*
//! and        := comparison ( '&&' comparison )*
//! comparison := unary ( ( '==' | '!=' | '>=' | '<=' | '>' | '<' ) unary )?
//! unary      := '!' unary | primary
//! primary    := '(' ternary ')' | string | number | true | false | null
//!             | name '(' args ')' | path
//! ```
//!
//! Helper-call argument lists are delimited with a quote- and paren-aware scan and split with
//! [`split_arguments`]; every argument is then parsed recursively, so nested calls such as
//! `formatDate(addYears(@today, 3), "YYYY")` become one call node with two arguments.

use serde_json::Value;

use super::{BinaryOp, Expr, ExpressionError, VariablePath};

/// Parse a complete expression. Trailing input is an error.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let mut parser = Parser::new(input);
    let expr = parser.parse_ternary()?;
    parser.skip_ws();
    if parser.pos < input.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

/// Split a helper argument list on top-level commas.
///
/// The scan tracks quote state (with backslash escapes inside quotes) and parenthesis /
/// bracket depth, so commas inside string literals or nested calls never split. Each
/// argument is trimmed; an all-whitespace list yields no arguments.
///
/// ```
/// use legal_md::expression::split_arguments;
///
/// let args = split_arguments(r#"a, "x,y", g(b,c)"#);
/// assert_eq!(args, vec!["a", r#""x,y""#, "g(b,c)"]);
/// ```
pub fn split_arguments(list: &str) -> Vec<String> {
    if list.trim().is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth: usize = 0;

    for c in list.chars() {
        if let Some(q) = quote {
            current.push(c);
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
            '"' | '\'' => {
                quote = Some(c);
                current.push(c);
            }
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => {
                args.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    args.push(current.trim().to_string());
    args
}

/// Split `name(arg, ...)` into the helper name and its top-level argument texts.
///
/// Returns `None` when the text is not a single well-formed call.
pub fn split_helper_call(text: &str) -> Option<(&str, Vec<String>)> {
    let text = text.trim();
    let open = text.find('(')?;
    let name = text[..open].trim();
    if name.is_empty() || !name.chars().all(is_name_char) {
        return None;
    }
    let close = find_closing_paren(text, open)?;
    if close != text.len() - 1 {
        return None;
    }
    Some((name, split_arguments(&text[open + 1..close])))
}

/// Byte offset of the `)` matching the `(` at `open`, honouring quotes.
pub(crate) fn find_closing_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[open..].char_indices() {
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
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '[' | ']' | '@' | '$')
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || matches!(c, '_' | '@' | '$')
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
        }
    }

    fn error(&self, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Parse {
            input: self.input.to_string(),
            offset: self.pos,
            message: message.into(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    /// Consume `token` if the remaining input starts with it (after whitespace).
    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<(), ExpressionError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{token}'")))
        }
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExpressionError> {
        let condition = self.parse_or()?;
        if self.eat("?") {
            let then = self.parse_ternary()?;
            self.expect(":")?;
            let otherwise = self.parse_ternary()?;
            return Ok(Expr::Ternary {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(condition)
    }

    fn parse_or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_and()?;
        while self.eat("||") {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_comparison()?;
        while self.eat("&&") {
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.parse_unary()?;
        self.skip_ws();
        // Two-character operators first so ">=" is not read as ">".
        let op = [
            ("==", BinaryOp::Eq),
            ("!=", BinaryOp::Ne),
            (">=", BinaryOp::Ge),
            ("<=", BinaryOp::Le),
            (">", BinaryOp::Gt),
            ("<", BinaryOp::Lt),
        ]
        .into_iter()
        .find(|(token, _)| self.rest().starts_with(token));

        match op {
            Some((token, op)) => {
                self.pos += token.len();
                let right = self.parse_unary()?;
                Ok(Expr::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                })
            }
            None => Ok(left),
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        self.skip_ws();
        if self.rest().starts_with('!') && !self.rest().starts_with("!=") {
            self.pos += 1;
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Err(self.error("unexpected end of expression"));
        };

        match c {
            '(' => {
                self.pos += 1;
                let inner = self.parse_ternary()?;
                self.expect(")")?;
                Ok(inner)
            }
            '"' | '\'' => self.parse_string(c),
            c if c.is_ascii_digit() => self.parse_number(),
            '-' if self.rest()[1..].starts_with(|d: char| d.is_ascii_digit()) => {
                self.parse_number()
            }
            c if is_name_start(c) => self.parse_name(),
            _ => Err(self.error(format!("unexpected character '{c}'"))),
        }
    }

    fn parse_string(&mut self, quote: char) -> Result<Expr, ExpressionError> {
        let start = self.pos;
        self.pos += quote.len_utf8();
        let mut value = String::new();
        let mut escaped = false;

        for (offset, c) in self.rest().char_indices() {
            if escaped {
                value.push(match c {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == quote {
                self.pos += offset + c.len_utf8();
                return Ok(Expr::Literal(Value::String(value)));
            } else {
                value.push(c);
            }
        }

        self.pos = start;
        Err(self.error("unterminated string literal"))
    }

    fn parse_number(&mut self) -> Result<Expr, ExpressionError> {
        let rest = self.rest();
        let len = rest
            .char_indices()
            .skip(1)
            .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
            .map_or(rest.len(), |(i, _)| i);
        let text = &rest[..len];
        // Integers too wide for i64 stay floating point.
        let integer = if text.contains('.') { None } else { text.parse::<i64>().ok() };
        let number = integer
            .map(Value::from)
            .or_else(|| {
                text.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number)
            })
            .ok_or_else(|| self.error(format!("invalid number '{text}'")))?;
        self.pos += len;
        Ok(Expr::Literal(number))
    }

    fn parse_name(&mut self) -> Result<Expr, ExpressionError> {
        let rest = self.rest();
        let len = rest.char_indices().find(|(_, c)| !is_name_char(*c)).map_or(rest.len(), |(i, _)| i);
        let name = &rest[..len];
        let name_start = self.pos;
        self.pos += len;

        // A call only when '(' follows the name directly or after spaces.
        self.skip_ws();
        if self.peek() == Some('(') {
            let open = self.pos;
            let close = find_closing_paren(self.input, open)
                .ok_or_else(|| self.error(format!("unbalanced parentheses in call to '{name}'")))?;
            let mut args = Vec::new();
            for arg in split_arguments(&self.input[open + 1..close]) {
                if arg.is_empty() {
                    return Err(self.error(format!("empty argument in call to '{name}'")));
                }
                args.push(parse(&arg)?);
            }
            self.pos = close + 1;
            return Ok(Expr::Call {
                name: name.to_string(),
                args,
            });
        }
        self.pos = name_start + len;

        match name {
            "true" => Ok(Expr::Literal(Value::Bool(true))),
            "false" => Ok(Expr::Literal(Value::Bool(false))),
            "null" | "undefined" => Ok(Expr::Literal(Value::Null)),
            _ if name.starts_with('@') => Ok(Expr::Special(name[1..].to_string())),
            _ => VariablePath::parse(name)
                .map(Expr::Path)
                .ok_or_else(|| self.error(format!("invalid variable path '{name}'"))),
        }
    }
}
