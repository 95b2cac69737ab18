//! Structure-walking resolution.
//!
//! Node `params` and `config` are arbitrary JSON structures whose string
//! leaves may contain `{{ }}` expressions. [`resolve_value`] rewrites
//! every such leaf in place (fatal on the first unresolved path), while
//! [`resolve_lenient`] substitutes what it can and collects diagnostics
//! for the rest -- the mode used for plan text.

use serde_json::Value;

use crate::context::ResolveContext;
use crate::error::{ExpressionError, Unresolved};
use crate::template::Template;

/// Resolve a single string, preserving the value type for whole-string
/// interpolation.
pub fn resolve_string(s: &str, ctx: &ResolveContext) -> Result<Value, ExpressionError> {
    if !s.contains("{{") {
        return Ok(Value::String(s.to_owned()));
    }
    Template::parse(s)?.render(ctx)
}

/// Recursively resolve every templated string leaf of a JSON structure.
///
/// Any unresolved path or malformed template is an error; the input is
/// left untouched on failure.
pub fn resolve_value(value: &Value, ctx: &ResolveContext) -> Result<Value, ExpressionError> {
    match value {
        Value::String(s) => resolve_string(s, ctx),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_value(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                resolved.insert(key.clone(), resolve_value(item, ctx)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}

/// Resolve what can be resolved, leaving failed leaves as written and
/// collecting a diagnostic per failure.
///
/// Lenient mode is for plan text and other prose: string leaves stay
/// strings (a whole-template leaf resolving to a non-string is rendered
/// as JSON text), and nothing here is fatal.
pub fn resolve_lenient(value: &Value, ctx: &ResolveContext) -> (Value, Vec<Unresolved>) {
    let mut diagnostics = Vec::new();
    let resolved = lenient_inner(value, ctx, &mut diagnostics);
    (resolved, diagnostics)
}

fn lenient_inner(value: &Value, ctx: &ResolveContext, out: &mut Vec<Unresolved>) -> Value {
    match value {
        Value::String(s) => match resolve_string(s, ctx) {
            Ok(Value::String(resolved)) => Value::String(resolved),
            Ok(resolved) => Value::String(resolved.to_string()),
            Err(err) => {
                out.push(match err {
                    ExpressionError::UnresolvedPath(diag) => diag,
                    other => Unresolved {
                        expression: s.clone(),
                        reason: other.to_string(),
                    },
                });
                value.clone()
            }
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| lenient_inner(item, ctx, out))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| (key.clone(), lenient_inner(item, ctx, out)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ctx() -> ResolveContext {
        let mut ctx = ResolveContext::new();
        ctx.set_global("apiKey", json!("sk-123"));
        ctx.set_global("max", json!(3));
        ctx
    }

    #[test]
    fn plain_values_pass_through() {
        let input = json!({"n": 1, "b": true, "s": "literal", "z": null});
        assert_eq!(resolve_value(&input, &ctx()).unwrap(), input);
    }

    #[test]
    fn nested_structures_are_rewritten() {
        let input = json!({
            "headers": {"authorization": "Bearer {{apiKey}}"},
            "limits": [{"max": "{{max}}"}]
        });
        let resolved = resolve_value(&input, &ctx()).unwrap();
        assert_eq!(
            resolved,
            json!({
                "headers": {"authorization": "Bearer sk-123"},
                "limits": [{"max": 3}]
            })
        );
    }

    #[test]
    fn whole_string_leaf_keeps_type() {
        let resolved = resolve_value(&json!({"count": "{{max}}"}), &ctx()).unwrap();
        assert_eq!(resolved, json!({"count": 3}));
    }

    #[test]
    fn first_unresolved_leaf_is_fatal() {
        let input = json!({"ok": "{{apiKey}}", "bad": "{{missing}}"});
        assert!(resolve_value(&input, &ctx()).is_err());
    }

    #[test]
    fn lenient_keeps_source_and_collects_diagnostics() {
        let input = json!({"ok": "{{apiKey}}", "bad": "note: {{missing}}"});
        let (resolved, diags) = resolve_lenient(&input, &ctx());
        assert_eq!(resolved["ok"], json!("sk-123"));
        assert_eq!(resolved["bad"], json!("note: {{missing}}"));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].expression.contains("missing"));
    }

    #[test]
    fn lenient_with_nothing_to_do_is_clean() {
        let (resolved, diags) = resolve_lenient(&json!("static"), &ctx());
        assert_eq!(resolved, json!("static"));
        assert!(diags.is_empty());
    }

    #[test]
    fn lenient_keeps_text_leaves_textual() {
        // Whole-template leaves stay strings in lenient mode.
        let (resolved, diags) = resolve_lenient(&json!("{{max}}"), &ctx());
        assert_eq!(resolved, json!("3"));
        assert!(diags.is_empty());
    }
}
