//! Compact data rendering for LLM contexts.
//!
//! `get_workflow_data` hands slices of the store to the Director, whose
//! context window is a budget. The rendering is indented, stable, and
//! truncated: long strings get an ellipsis, long arrays a tail count,
//! and deep nesting a depth cap. The raw structured slice travels
//! alongside for programmatic use.

use serde_json::Value;
use webpilot_store::Record;

/// Longest string rendered before truncation.
const MAX_STRING: usize = 160;
/// Most array items rendered before the tail count.
const MAX_ITEMS: usize = 20;
/// Deepest nesting rendered.
const MAX_DEPTH: usize = 6;

/// Render a globals map (key path → value), one entry per line.
#[must_use]
pub fn render_globals(globals: &serde_json::Map<String, Value>) -> String {
    if globals.is_empty() {
        return "(no variables)".to_owned();
    }
    let mut out = String::new();
    for (key, value) in globals {
        out.push_str(key);
        out.push_str(": ");
        render_value(value, 1, 0, &mut out);
        out.push('\n');
    }
    out
}

/// Render one record with its per-node namespaces.
#[must_use]
pub fn render_record(record: &Record) -> String {
    let mut out = format!(
        "{} [{}] status={}",
        record.record_id, record.record_type, record.status
    );
    if let Some(error) = &record.error_message {
        out.push_str(" error=");
        out.push_str(&truncate(error));
    }
    out.push('\n');
    for (alias, fields) in &record.data {
        out.push_str("  ");
        out.push_str(alias);
        out.push_str(": ");
        render_value(fields, 2, 0, &mut out);
        out.push('\n');
    }
    out
}

/// Render a list of records.
#[must_use]
pub fn render_records(records: &[Record]) -> String {
    if records.is_empty() {
        return "(no records)".to_owned();
    }
    records.iter().map(render_record).collect()
}

fn render_value(value: &Value, indent: usize, depth: usize, out: &mut String) {
    if depth >= MAX_DEPTH {
        out.push('…');
        return;
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            out.push('"');
            out.push_str(&truncate(s));
            out.push('"');
        }
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push('[');
            for (i, item) in items.iter().take(MAX_ITEMS).enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render_value(item, indent, depth + 1, out);
            }
            if items.len() > MAX_ITEMS {
                out.push_str(&format!(", … (+{} more)", items.len() - MAX_ITEMS));
            }
            out.push(']');
        }
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push('{');
            let pad = "  ".repeat(indent + 1);
            for (key, item) in map {
                out.push('\n');
                out.push_str(&pad);
                out.push_str(key);
                out.push_str(": ");
                render_value(item, indent + 1, depth + 1, out);
            }
            out.push('\n');
            out.push_str(&"  ".repeat(indent));
            out.push('}');
        }
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() <= MAX_STRING {
        return s.to_owned();
    }
    let kept: String = s.chars().take(MAX_STRING).collect();
    format!("{kept}… (+{} chars)", s.chars().count() - MAX_STRING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn globals_render_one_line_per_key() {
        let mut globals = serde_json::Map::new();
        globals.insert("apiKey".into(), json!("sk-123"));
        globals.insert("extract.count".into(), json!(2));

        let rendered = render_globals(&globals);
        assert!(rendered.contains("apiKey: \"sk-123\""));
        assert!(rendered.contains("extract.count: 2"));
    }

    #[test]
    fn empty_globals_say_so() {
        assert_eq!(render_globals(&serde_json::Map::new()), "(no variables)");
    }

    #[test]
    fn long_strings_are_truncated_with_a_count() {
        let long = "x".repeat(300);
        let mut out = String::new();
        render_value(&json!(long), 0, 0, &mut out);
        assert!(out.contains("… (+140 chars)"));
    }

    #[test]
    fn long_arrays_get_a_tail_count() {
        let items: Vec<u32> = (0..30).collect();
        let mut out = String::new();
        render_value(&json!(items), 0, 0, &mut out);
        assert!(out.contains("… (+10 more)"));
    }

    #[test]
    fn record_rendering_shows_namespaces_and_status() {
        let mut record = Record::new("email_001", "email");
        record.merge_data(
            "extract",
            json!({"subject": "Hello"}).as_object().unwrap().clone(),
        );
        let rendered = render_record(&record);
        assert!(rendered.starts_with("email_001 [email] status=discovered"));
        assert!(rendered.contains("extract:"));
        assert!(rendered.contains("subject: \"Hello\""));
    }

    #[test]
    fn depth_cap_elides() {
        let deep = json!({"a": {"b": {"c": {"d": {"e": {"f": {"g": 1}}}}}}});
        let mut out = String::new();
        render_value(&deep, 0, 0, &mut out);
        assert!(out.contains('…'));
    }
}
