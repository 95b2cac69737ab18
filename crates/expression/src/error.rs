//! Expression and template errors.

use serde::{Deserialize, Serialize};

/// A diagnostic for a `{{path}}` occurrence that could not be resolved.
///
/// Whether an unresolved path is fatal depends on the enclosing context:
/// node inputs treat it as an error, plan text merely collects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unresolved {
    /// The expression content as written, without the braces.
    pub expression: String,
    /// Human-readable reason the path did not resolve.
    pub reason: String,
}

impl std::fmt::Display for Unresolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{{{}}}}}: {}", self.expression, self.reason)
    }
}

/// Errors from template parsing, path resolution, and condition evaluation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExpressionError {
    /// A `{{` without a matching `}}`.
    #[error("unclosed '{{{{' at line {line}, column {column}")]
    UnclosedExpression {
        /// 1-based line of the opening braces.
        line: usize,
        /// 1-based column of the opening braces.
        column: usize,
    },

    /// A path did not conform to the `segment ('.' segment | '[' index ']')*` grammar.
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath {
        /// The offending path text.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// A path resolved nowhere in the current context.
    #[error("unresolved {0}")]
    UnresolvedPath(Unresolved),

    /// A condition did not conform to the `path OP value` grammar.
    #[error("invalid condition {condition:?}: {reason}")]
    InvalidCondition {
        /// The offending condition text.
        condition: String,
        /// What went wrong.
        reason: String,
    },

    /// A comparison was applied to operands it does not support.
    #[error("cannot compare {lhs} {op} {rhs}")]
    IncomparableOperands {
        /// Rendered left operand.
        lhs: String,
        /// The operator.
        op: String,
        /// Rendered right operand.
        rhs: String,
    },

    /// Nested template resolution exceeded the depth limit.
    #[error("template nesting too deep (max {max})")]
    NestingTooDeep {
        /// The depth limit.
        max: usize,
    },
}

impl ExpressionError {
    /// Shorthand for an [`ExpressionError::UnresolvedPath`].
    pub fn unresolved(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvedPath(Unresolved {
            expression: expression.into(),
            reason: reason.into(),
        })
    }
}
