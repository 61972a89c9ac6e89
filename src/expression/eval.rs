//! Tree-walk evaluation of parsed expressions.

use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::cmp::Ordering;

use super::helpers::HelperRegistry;
use super::{BinaryOp, Expr, ExpressionError, Resolved, parse};

/// Everything an expression can read: metadata, helpers and the evaluation date.
#[derive(Clone, Copy)]
pub struct EvalContext<'a> {
    pub metadata: &'a Value,
    pub helpers: &'a HelperRegistry,
    /// Date returned by `@today`.
    pub today: NaiveDate,
}

impl<'a> EvalContext<'a> {
    /// Context evaluating `@today` as the local calendar date.
    pub fn new(metadata: &'a Value, helpers: &'a HelperRegistry) -> Self {
        Self {
            metadata,
            helpers,
            today: Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

/// Parse and evaluate in one step.
pub fn evaluate_str(input: &str, ctx: &EvalContext<'_>) -> Result<Resolved, ExpressionError> {
    let expr = parse(input)?;
    evaluate(&expr, ctx)
}

/// Evaluate an expression tree against `ctx`.
pub fn evaluate(expr: &Expr, ctx: &EvalContext<'_>) -> Result<Resolved, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(Resolved::Value(value.clone())),
        Expr::Path(path) => Ok(path.resolve(ctx.metadata)),
        Expr::Special(name) => Ok(special(name, ctx)),
        Expr::Call {
            name,
            args,
        } => {
            let helper = ctx.helpers.get(name).ok_or_else(|| ExpressionError::UnknownHelper {
                name: name.clone(),
                suggestion: ctx.helpers.suggest(name),
            })?;
            // Depth-first: inner calls finish before the outer helper sees their values.
            let values = args.iter().map(|arg| evaluate(arg, ctx)).collect::<Result<Vec<_>, _>>()?;
            helper(&values, ctx).map_err(|message| ExpressionError::Helper {
                helper: name.clone(),
                message,
            })
        }
        Expr::Not(inner) => Ok(Resolved::Value(Value::Bool(!evaluate(inner, ctx)?.is_truthy()))),
        Expr::Binary {
            op: BinaryOp::And,
            left,
            right,
        } => {
            let result = evaluate(left, ctx)?.is_truthy() && evaluate(right, ctx)?.is_truthy();
            Ok(Resolved::Value(Value::Bool(result)))
        }
        Expr::Binary {
            op: BinaryOp::Or,
            left,
            right,
        } => {
            let result = evaluate(left, ctx)?.is_truthy() || evaluate(right, ctx)?.is_truthy();
            Ok(Resolved::Value(Value::Bool(result)))
        }
        Expr::Binary {
            op,
            left,
            right,
        } => {
            let l = evaluate(left, ctx)?;
            let r = evaluate(right, ctx)?;
            Ok(Resolved::Value(Value::Bool(compare(*op, &l, &r))))
        }
        Expr::Ternary {
            condition,
            then,
            otherwise,
        } => {
            if evaluate(condition, ctx)?.is_truthy() {
                evaluate(then, ctx)
            } else {
                evaluate(otherwise, ctx)
            }
        }
    }
}

fn special(name: &str, ctx: &EvalContext<'_>) -> Resolved {
    match name {
        "today" => Resolved::Value(Value::String(ctx.today.format("%Y-%m-%d").to_string())),
        _ => Resolved::Empty,
    }
}

fn to_value(resolved: &Resolved) -> Value {
    resolved.as_value().cloned().unwrap_or(Value::Null)
}

/// Comparison by operand type.
///
/// Two numbers compare numerically. Equality is otherwise structural, so a numeric
/// string never equals a number. Ordering between two strings is lexicographic, which
/// orders ISO dates correctly; any other ordering comparison is false.
fn compare(op: BinaryOp, left: &Resolved, right: &Resolved) -> bool {
    let l = to_value(left);
    let r = to_value(right);
    let numeric = match (&l, &r) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        _ => None,
    };

    let ordering = match numeric {
        Some(ordering) => Some(ordering),
        None => match (&l, &r) {
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        },
    };

    match op {
        BinaryOp::Eq => numeric.map_or_else(|| l == r, |o| o == Ordering::Equal),
        BinaryOp::Ne => numeric.map_or_else(|| l != r, |o| o != Ordering::Equal),
        BinaryOp::Gt => ordering == Some(Ordering::Greater),
        BinaryOp::Lt => ordering == Some(Ordering::Less),
        BinaryOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators are evaluated lazily"),
    }
}
