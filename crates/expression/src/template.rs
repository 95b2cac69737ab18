//! Template parsing and rendering.
//!
//! A template is a string interleaving static text with `{{ path }}`
//! expressions. Parsing records line/column positions so unresolved
//! paths can be reported against the original source. A template that
//! consists of exactly one expression renders to the resolved value with
//! its type preserved; anything else renders to a concatenated string.

use std::fmt;

use serde_json::Value;
use tracing::trace;

use crate::context::ResolveContext;
use crate::error::ExpressionError;
use crate::path::Path;

/// Maximum number of expressions in a single template.
const MAX_TEMPLATE_EXPRESSIONS: usize = 1000;

/// Maximum depth for templates nested inside expression content.
const MAX_NESTING_DEPTH: usize = 8;

/// One parsed part of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Literal text copied through unchanged.
    Static(String),
    /// An expression to resolve, without the surrounding braces.
    Expression {
        /// The expression content as written.
        content: String,
        /// 1-based line of the opening `{{`.
        line: usize,
        /// 1-based column of the opening `{{`.
        column: usize,
    },
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<TemplatePart>,
}

impl Template {
    /// Parse a template string.
    pub fn parse(source: impl Into<String>) -> Result<Self, ExpressionError> {
        let source = source.into();
        let parts = parse_parts(&source)?;
        Ok(Self { source, parts })
    }

    /// The original source string.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed parts.
    #[must_use]
    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Whether the template contains any expressions.
    #[must_use]
    pub fn has_expressions(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, TemplatePart::Expression { .. }))
    }

    /// Render against a context.
    ///
    /// A template that is exactly one expression (ignoring empty static
    /// parts) returns the resolved value unchanged; otherwise every
    /// expression is stringified and concatenated with the static text.
    pub fn render(&self, ctx: &ResolveContext) -> Result<Value, ExpressionError> {
        self.render_at_depth(ctx, 0)
    }

    fn render_at_depth(&self, ctx: &ResolveContext, depth: usize) -> Result<Value, ExpressionError> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(ExpressionError::NestingTooDeep {
                max: MAX_NESTING_DEPTH,
            });
        }

        // Whole-string interpolation preserves the value's type.
        if let [TemplatePart::Expression { content, .. }] = self.parts.as_slice() {
            return resolve_expression(content, ctx, depth);
        }

        let mut result = String::with_capacity(self.source.len());
        for part in &self.parts {
            match part {
                TemplatePart::Static(text) => result.push_str(text),
                TemplatePart::Expression { content, line, column } => {
                    trace!(expression = content.as_str(), line, column, "rendering expression");
                    let value = resolve_expression(content, ctx, depth)?;
                    match value.as_str() {
                        Some(s) => result.push_str(s),
                        None => result.push_str(&value.to_string()),
                    }
                }
            }
        }
        Ok(Value::String(result))
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Resolve one expression's content: either a bare path, or a nested
/// template whose rendering yields the path to resolve.
fn resolve_expression(
    content: &str,
    ctx: &ResolveContext,
    depth: usize,
) -> Result<Value, ExpressionError> {
    let trimmed = content.trim();
    if trimmed.contains("{{") {
        let inner = Template::parse(trimmed)?;
        let rendered = inner.render_at_depth(ctx, depth + 1)?;
        let path_text = match rendered.as_str() {
            Some(s) => s.to_owned(),
            None => rendered.to_string(),
        };
        let path = Path::parse(&path_text)?;
        return ctx.lookup(&path);
    }
    let path = Path::parse(trimmed)?;
    ctx.lookup(&path)
}

fn parse_parts(source: &str) -> Result<Vec<TemplatePart>, ExpressionError> {
    let chars: Vec<char> = source.chars().collect();
    let len = chars.len();

    let mut parts = Vec::new();
    let mut current_static = String::new();
    let mut expression_count = 0usize;

    let mut i = 0;
    let mut line = 1;
    let mut column = 1;

    while i < len {
        if i + 1 < len && chars[i] == '{' && chars[i + 1] == '{' {
            let (open_line, open_column) = (line, column);

            // Find the matching `}}`, counting nested `{{`.
            let mut j = i + 2;
            let mut depth = 1usize;
            while j + 1 < len {
                if chars[j] == '{' && chars[j + 1] == '{' {
                    depth += 1;
                    j += 2;
                } else if chars[j] == '}' && chars[j + 1] == '}' {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    j += 2;
                } else {
                    j += 1;
                }
            }
            if depth != 0 || j + 1 >= len {
                return Err(ExpressionError::UnclosedExpression {
                    line: open_line,
                    column: open_column,
                });
            }

            if !current_static.is_empty() {
                parts.push(TemplatePart::Static(std::mem::take(&mut current_static)));
            }

            let content: String = chars[i + 2..j].iter().collect();
            expression_count += 1;
            if expression_count > MAX_TEMPLATE_EXPRESSIONS {
                return Err(ExpressionError::InvalidPath {
                    path: source.to_owned(),
                    reason: format!(
                        "template contains too many expressions (max {MAX_TEMPLATE_EXPRESSIONS})"
                    ),
                });
            }
            parts.push(TemplatePart::Expression {
                content,
                line: open_line,
                column: open_column,
            });

            // Advance position tracking across the consumed expression.
            for &c in &chars[i..=j + 1] {
                if c == '\n' {
                    line += 1;
                    column = 1;
                } else {
                    column += 1;
                }
            }
            i = j + 2;
        } else {
            current_static.push(chars[i]);
            if chars[i] == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
            i += 1;
        }
    }

    if !current_static.is_empty() {
        parts.push(TemplatePart::Static(current_static));
    }

    Ok(parts)
}
