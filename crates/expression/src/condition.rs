//! The route condition mini-language.
//!
//! `side OP side` with `OP ∈ { ===, !==, ==, !=, <, <=, >, >=, includes }`,
//! or a bare boolean (`true`, `false`, or a template resolving to one).
//! Sides are templates, quoted strings, numeric literals, booleans, or
//! bare paths. Deliberately small: anything more complex is computed
//! upstream by a cognition node.

use serde_json::Value;

use crate::context::ResolveContext;
use crate::error::ExpressionError;
use crate::path::Path;
use crate::resolve::resolve_string;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// Strict equality (type-sensitive).
    StrictEq,
    /// Strict inequality.
    StrictNe,
    /// Loose equality (string/number/boolean normalization).
    LooseEq,
    /// Loose inequality.
    LooseNe,
    /// Numeric less-than.
    Lt,
    /// Numeric less-or-equal.
    Le,
    /// Numeric greater-than.
    Gt,
    /// Numeric greater-or-equal.
    Ge,
    /// Array membership or substring containment.
    Includes,
}

impl Comparator {
    fn as_str(self) -> &'static str {
        match self {
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::LooseEq => "==",
            Self::LooseNe => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Includes => "includes",
        }
    }
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// A bare operand that must evaluate to a boolean.
    Truth(Operand),
    /// A binary comparison.
    Compare {
        /// Left operand.
        lhs: Operand,
        /// The operator.
        op: Comparator,
        /// Right operand.
        rhs: Operand,
    },
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// A literal JSON value (quoted string, number, boolean).
    Literal(Value),
    /// A `{{ }}`-bearing template.
    Template(String),
    /// A bare path looked up in the context.
    Path(String),
}

impl Operand {
    fn evaluate(&self, ctx: &ResolveContext) -> Result<Value, ExpressionError> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Template(text) => resolve_string(text, ctx),
            Self::Path(text) => ctx.lookup(&Path::parse(text)?),
        }
    }
}

impl Condition {
    /// Parse a condition string.
    pub fn parse(input: &str) -> Result<Self, ExpressionError> {
        let src = input.trim();
        if src.is_empty() {
            return Err(invalid(input, "empty condition"));
        }

        if let Some((lhs, op, rhs)) = split_on_comparator(src) {
            return Ok(Self::Compare {
                lhs: parse_operand(src, lhs)?,
                op,
                rhs: parse_operand(src, rhs)?,
            });
        }

        Ok(Self::Truth(parse_operand(src, src)?))
    }

    /// Evaluate against a context.
    pub fn evaluate(&self, ctx: &ResolveContext) -> Result<bool, ExpressionError> {
        match self {
            Self::Truth(operand) => match operand.evaluate(ctx)? {
                Value::Bool(b) => Ok(b),
                other => Err(ExpressionError::IncomparableOperands {
                    lhs: other.to_string(),
                    op: "as-boolean".to_owned(),
                    rhs: String::new(),
                }),
            },
            Self::Compare { lhs, op, rhs } => {
                let left = lhs.evaluate(ctx)?;
                let right = rhs.evaluate(ctx)?;
                compare(&left, *op, &right)
            }
        }
    }
}

/// Parse and evaluate in one step.
pub fn evaluate_condition(input: &str, ctx: &ResolveContext) -> Result<bool, ExpressionError> {
    Condition::parse(input)?.evaluate(ctx)
}

fn invalid(condition: &str, reason: impl Into<String>) -> ExpressionError {
    ExpressionError::InvalidCondition {
        condition: condition.to_owned(),
        reason: reason.into(),
    }
}

/// Split `src` on the first top-level comparator, honoring quotes and
/// `{{ }}` spans. Longest operators match first (`===` before `==`).
fn split_on_comparator(src: &str) -> Option<(&str, Comparator, &str)> {
    const SYMBOLIC: [(&str, Comparator); 8] = [
        ("===", Comparator::StrictEq),
        ("!==", Comparator::StrictNe),
        ("==", Comparator::LooseEq),
        ("!=", Comparator::LooseNe),
        ("<=", Comparator::Le),
        (">=", Comparator::Ge),
        ("<", Comparator::Lt),
        (">", Comparator::Gt),
    ];

    let bytes = src.as_bytes();
    let mut in_quote: Option<u8> = None;
    let mut brace_depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = in_quote {
            if b == q {
                in_quote = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => {
                in_quote = Some(b);
                i += 1;
            }
            b'{' if bytes.get(i + 1) == Some(&b'{') => {
                brace_depth += 1;
                i += 2;
            }
            b'}' if bytes.get(i + 1) == Some(&b'}') && brace_depth > 0 => {
                brace_depth -= 1;
                i += 2;
            }
            _ if brace_depth > 0 => i += 1,
            _ if !src.is_char_boundary(i) => i += 1,
            _ => {
                for (symbol, op) in SYMBOLIC {
                    if src[i..].starts_with(symbol) {
                        return Some((&src[..i], op, &src[i + symbol.len()..]));
                    }
                }
                // `includes` must stand alone as a word.
                if src[i..].starts_with("includes")
                    && (i == 0 || bytes[i - 1].is_ascii_whitespace())
                    && src[i + 8..].starts_with(char::is_whitespace)
                {
                    return Some((&src[..i], Comparator::Includes, &src[i + 8..]));
                }
                i += 1;
            }
        }
    }
    None
}

fn parse_operand(condition: &str, text: &str) -> Result<Operand, ExpressionError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(invalid(condition, "missing operand"));
    }
    if text.contains("{{") {
        return Ok(Operand::Template(text.to_owned()));
    }
    if (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
        || (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
    {
        return Ok(Operand::Literal(Value::String(
            text[1..text.len() - 1].to_owned(),
        )));
    }
    if text == "true" {
        return Ok(Operand::Literal(Value::Bool(true)));
    }
    if text == "false" {
        return Ok(Operand::Literal(Value::Bool(false)));
    }
    if text == "null" {
        return Ok(Operand::Literal(Value::Null));
    }
    if let Ok(number) = serde_json::from_str::<serde_json::Number>(text) {
        return Ok(Operand::Literal(Value::Number(number)));
    }
    Ok(Operand::Path(text.to_owned()))
}

fn compare(lhs: &Value, op: Comparator, rhs: &Value) -> Result<bool, ExpressionError> {
    match op {
        Comparator::StrictEq => Ok(lhs == rhs),
        Comparator::StrictNe => Ok(lhs != rhs),
        Comparator::LooseEq => Ok(loose_eq(lhs, rhs)),
        Comparator::LooseNe => Ok(!loose_eq(lhs, rhs)),
        Comparator::Lt | Comparator::Le | Comparator::Gt | Comparator::Ge => {
            let (a, b) = match (as_number(lhs), as_number(rhs)) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(ExpressionError::IncomparableOperands {
                        lhs: lhs.to_string(),
                        op: op.as_str().to_owned(),
                        rhs: rhs.to_string(),
                    });
                }
            };
            Ok(match op {
                Comparator::Lt => a < b,
                Comparator::Le => a <= b,
                Comparator::Gt => a > b,
                Comparator::Ge => a >= b,
                _ => unreachable!(),
            })
        }
        Comparator::Includes => match lhs {
            Value::Array(items) => Ok(items.iter().any(|item| loose_eq(item, rhs))),
            Value::String(haystack) => {
                let needle = match rhs {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Ok(haystack.contains(&needle))
            }
            other => Err(ExpressionError::IncomparableOperands {
                lhs: other.to_string(),
                op: op.as_str().to_owned(),
                rhs: rhs.to_string(),
            }),
        },
    }
}

/// Loose equality: equal after string/number/boolean normalization.
fn loose_eq(lhs: &Value, rhs: &Value) -> bool {
    if lhs == rhs {
        return true;
    }
    match (lhs, rhs) {
        (Value::Number(_), Value::String(_)) | (Value::String(_), Value::Number(_)) => {
            match (as_number(lhs), as_number(rhs)) {
                (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
                _ => false,
            }
        }
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.eq_ignore_ascii_case(if *b { "true" } else { "false" })
        }
        _ => false,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
