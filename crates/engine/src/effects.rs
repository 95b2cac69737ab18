//! Post-execution effects: intentional store mapping and record creation.
//!
//! The store is intentional: only what `config.store` names gets
//! written. A `store` mapping is `{ sourcePath: targetKey }` -- source
//! paths address the node's *result envelope*, target keys become
//! `global[alias][targetKey]` (or `record.data[alias][targetKey]` when
//! the write is attributed to a record). `true` expands to
//! `{ "result": "result" }`; `"*"` expands to the top-level scalar and
//! array fields of the result at expansion time.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use webpilot_core::record_id;
use webpilot_expression::{ResolveContext, resolve_string};
use webpilot_store::{Record, RecordPatch, RecordStatus, StoreBackend};
use webpilot_workflow::{CreateRecordsSpec, StoreSpec};

use crate::error::NodeFailure;
use crate::report::EffectsSummary;

/// The addressable view of a node's result.
///
/// - an object result exposes exactly its own top-level fields
/// - an array result exposes itself as `result` plus `count`/`length`
/// - a scalar result exposes itself as `result`
/// - a null result exposes nothing (so `store: true` on a node whose
///   result lacks a `result` field writes nothing at all)
#[must_use]
pub fn result_envelope(result: &Value) -> Map<String, Value> {
    let mut envelope = Map::new();
    match result {
        Value::Null => {}
        Value::Object(fields) => {
            for (key, value) in fields {
                envelope.insert(key.clone(), value.clone());
            }
        }
        Value::Array(items) => {
            envelope.insert("count".into(), json!(items.len()));
            envelope.insert("length".into(), json!(items.len()));
            envelope.insert("result".into(), result.clone());
        }
        other => {
            envelope.insert("result".into(), other.clone());
        }
    }
    envelope
}

/// Expand a store spec into `(sourcePath, targetKey)` pairs against the
/// result at expansion time.
#[must_use]
pub fn expand_store_spec(spec: &StoreSpec, result: &Value) -> IndexMap<String, String> {
    match spec {
        StoreSpec::Result => IndexMap::from([("result".to_owned(), "result".to_owned())]),
        StoreSpec::Map(map) => map.clone(),
        StoreSpec::All => match result {
            Value::Object(fields) => fields
                .iter()
                .filter(|(_, value)| !value.is_object())
                .map(|(key, _)| (key.clone(), key.clone()))
                .collect(),
            _ => IndexMap::from([("result".to_owned(), "result".to_owned())]),
        },
    }
}

/// Resolve a source path against the result envelope.
///
/// Dotted segments descend into objects; numeric segments index arrays.
/// An absent source yields `None` -- and an absent source means the
/// target key is simply not written.
#[must_use]
pub fn resolve_source(envelope: &Map<String, Value>, path: &str) -> Option<Value> {
    let mut segments = path.split('.');
    let mut cursor = envelope.get(segments.next()?)?;
    for segment in segments {
        cursor = match cursor {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(cursor.clone())
}

/// Select the `(targetKey, value)` pairs a store spec yields for a result.
#[must_use]
pub fn select_stored_fields(spec: &StoreSpec, result: &Value) -> Map<String, Value> {
    let envelope = result_envelope(result);
    let mut selected = Map::new();
    for (source, target) in expand_store_spec(spec, result) {
        if let Some(value) = resolve_source(&envelope, &source) {
            selected.insert(target, value);
        }
    }
    selected
}

/// Write a node's selected fields to the store.
///
/// Inside record iteration (`store_to_record`, or any `store` while a
/// current record exists), writes go to `record.data[alias]`; otherwise
/// each target key lands at the global key path `<alias>.<targetKey>`.
pub async fn apply_store(
    store: &dyn StoreBackend,
    workflow_id: webpilot_core::WorkflowId,
    alias: &str,
    spec: &StoreSpec,
    result: &Value,
    current_record: Option<&str>,
) -> Result<EffectsSummary, NodeFailure> {
    let selected = select_stored_fields(spec, result);
    let mut effects = EffectsSummary::default();
    if selected.is_empty() {
        return Ok(effects);
    }

    match current_record {
        Some(record_id) => {
            store
                .update_record(workflow_id, record_id, RecordPatch::merge(alias, selected))
                .await?;
            effects.records_updated.push(record_id.to_owned());
        }
        None => {
            for (target, value) in selected {
                let key = format!("{alias}.{target}");
                store.set_global(workflow_id, &key, value).await?;
                effects.variables_written.push(key);
            }
        }
    }
    Ok(effects)
}

/// Create (or merge into) one record per element of an array result.
pub async fn apply_create_records(
    store: &dyn StoreBackend,
    workflow_id: webpilot_core::WorkflowId,
    alias: &str,
    spec: &CreateRecordsSpec,
    store_spec: Option<&StoreSpec>,
    result: &Value,
) -> Result<EffectsSummary, NodeFailure> {
    let Value::Array(elements) = result else {
        return Err(NodeFailure::new(
            "invalid_result",
            format!(
                "create_records needs an array result, got {}",
                type_of(result)
            ),
        ));
    };

    let mut effects = EffectsSummary::default();
    for (i, element) in elements.iter().enumerate() {
        let index = record_id::format_index(i + 1);
        let id = record_identifier(spec, element, &index)?;
        let fields = record_fields(element, store_spec);

        let mut record = Record::new(id.clone(), spec.record_type.clone());
        record.merge_data(alias, fields.clone());
        match store.create_record(workflow_id, record).await {
            Ok(()) => effects.records_created.push(id),
            Err(webpilot_store::StoreError::DuplicateRecord { .. }) => {
                // Upsert: re-running an extraction refreshes its namespace.
                store
                    .update_record(workflow_id, &id, RecordPatch::merge(alias, fields))
                    .await?;
                effects.records_updated.push(id);
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(effects)
}

/// Resolve a record id from the spec's pattern (default
/// `<type>_<index>` with the index zero-padded to width 3).
fn record_identifier(
    spec: &CreateRecordsSpec,
    element: &Value,
    index: &str,
) -> Result<String, NodeFailure> {
    match &spec.id_pattern {
        None => Ok(format!("{}_{index}", spec.record_type)),
        Some(pattern) => {
            let mut ctx = ResolveContext::new();
            ctx.push_scope();
            ctx.bind("index", json!(index));
            if let Value::Object(fields) = element {
                for (key, value) in fields {
                    ctx.bind(key.clone(), value.clone());
                }
            }
            let id = resolve_string(pattern, &ctx).map_err(NodeFailure::from)?;
            match id {
                Value::String(id) => Ok(id),
                other => Ok(other.to_string()),
            }
        }
    }
}

/// The fields stored on a created record: the element, filtered to the
/// store spec's source paths when they actually name element fields.
fn record_fields(element: &Value, store_spec: Option<&StoreSpec>) -> Map<String, Value> {
    let full: Map<String, Value> = match element {
        Value::Object(fields) => fields.clone(),
        other => Map::from_iter([("value".to_owned(), other.clone())]),
    };

    if let Some(StoreSpec::Map(mapping)) = store_spec {
        let filtered: Map<String, Value> = mapping
            .keys()
            .filter_map(|source| full.get(source).map(|v| (source.clone(), v.clone())))
            .collect();
        if !filtered.is_empty() {
            return filtered;
        }
    }
    full
}

/// Mark a record's lifecycle transition during record iteration.
pub async fn mark_record_status(
    store: &dyn StoreBackend,
    workflow_id: webpilot_core::WorkflowId,
    record_id: &str,
    status: RecordStatus,
    error_message: Option<String>,
) -> Result<(), NodeFailure> {
    let mut patch = RecordPatch::status(status);
    match error_message {
        Some(message) => patch.error_message = Some(message),
        None => patch.clear_error = true,
    }
    store.update_record(workflow_id, record_id, patch).await?;
    Ok(())
}

fn type_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use webpilot_core::WorkflowId;
    use webpilot_store::MemoryStore;

    #[test]
    fn envelope_of_array_exposes_count_and_length() {
        let envelope = result_envelope(&json!([1, 2]));
        assert_eq!(envelope["count"], json!(2));
        assert_eq!(envelope["length"], json!(2));
        assert_eq!(envelope["result"], json!([1, 2]));
    }

    #[test]
    fn envelope_of_object_exposes_exactly_its_fields() {
        let envelope = result_envelope(&json!({"emails": [1], "total": 3}));
        assert_eq!(envelope["emails"], json!([1]));
        assert_eq!(envelope["total"], json!(3));
        assert!(!envelope.contains_key("result"));
    }

    #[test]
    fn store_true_on_object_without_result_field_writes_nothing() {
        let selected = select_stored_fields(&StoreSpec::Result, &json!({"other": 1}));
        assert!(selected.is_empty());
    }

    #[test]
    fn envelope_of_null_is_empty() {
        assert!(result_envelope(&Value::Null).is_empty());
    }

    #[test]
    fn store_true_selects_the_result() {
        let selected = select_stored_fields(&StoreSpec::Result, &json!("investor"));
        assert_eq!(selected.get("result"), Some(&json!("investor")));
    }

    #[test]
    fn store_true_on_null_result_writes_nothing() {
        let selected = select_stored_fields(&StoreSpec::Result, &Value::Null);
        assert!(selected.is_empty());
    }

    #[test]
    fn store_star_takes_scalar_and_array_fields_only() {
        let result = json!({"count": 2, "rows": [1], "nested": {"x": 1}});
        let selected = select_stored_fields(&StoreSpec::All, &result);
        assert_eq!(selected.len(), 2);
        assert!(selected.contains_key("count"));
        assert!(selected.contains_key("rows"));
    }

    #[test]
    fn mapping_resolves_sources_into_target_keys() {
        let spec = StoreSpec::Map(
            [("count".to_owned(), "length".to_owned())]
                .into_iter()
                .collect(),
        );
        let selected = select_stored_fields(&spec, &json!(["a", "b"]));
        assert_eq!(selected, Map::from_iter([("length".into(), json!(2))]));
    }

    #[test]
    fn absent_source_means_absent_target() {
        let spec = StoreSpec::Map(
            [("missing".to_owned(), "out".to_owned())]
                .into_iter()
                .collect(),
        );
        let selected = select_stored_fields(&spec, &json!({"present": 1}));
        assert!(selected.is_empty());
    }

    #[test]
    fn dotted_source_paths_descend() {
        let spec = StoreSpec::Map(
            [("user.name".to_owned(), "who".to_owned())]
                .into_iter()
                .collect(),
        );
        let selected = select_stored_fields(&spec, &json!({"user": {"name": "ada"}}));
        assert_eq!(selected["who"], json!("ada"));
    }

    #[tokio::test]
    async fn apply_store_writes_namespaced_globals() {
        let store = MemoryStore::new();
        let wf = WorkflowId::v4();
        let spec = StoreSpec::Map(
            [("count".to_owned(), "length".to_owned())]
                .into_iter()
                .collect(),
        );

        let effects = apply_store(&store, wf, "extract_emails", &spec, &json!(["a", "b"]), None)
            .await
            .unwrap();

        assert_eq!(effects.variables_written, vec!["extract_emails.length"]);
        assert_eq!(
            store
                .get_global(wf, "extract_emails.length")
                .await
                .unwrap(),
            Some(json!(2))
        );
    }

    #[tokio::test]
    async fn apply_store_attributes_to_current_record() {
        let store = MemoryStore::new();
        let wf = WorkflowId::v4();
        store
            .create_record(wf, Record::new("email_001", "email"))
            .await
            .unwrap();
        let spec = StoreSpec::Map(
            [("result".to_owned(), "type".to_owned())]
                .into_iter()
                .collect(),
        );

        let effects = apply_store(
            &store,
            wf,
            "classify",
            &spec,
            &json!("investor"),
            Some("email_001"),
        )
        .await
        .unwrap();

        assert_eq!(effects.records_updated, vec!["email_001"]);
        assert!(effects.variables_written.is_empty());
        let record = store.get_record(wf, "email_001").await.unwrap().unwrap();
        assert_eq!(record.data["classify"], json!({"type": "investor"}));
    }

    #[tokio::test]
    async fn create_records_assigns_padded_ids_and_namespaces_data() {
        let store = MemoryStore::new();
        let wf = WorkflowId::v4();
        let spec = CreateRecordsSpec {
            record_type: "email".into(),
            id_pattern: None,
        };
        let result = json!([
            {"subject": "A", "sender": "x@y"},
            {"subject": "B", "sender": "z@w"}
        ]);

        let effects = apply_create_records(&store, wf, "extract", &spec, None, &result)
            .await
            .unwrap();

        assert_eq!(effects.records_created, vec!["email_001", "email_002"]);
        let record = store.get_record(wf, "email_001").await.unwrap().unwrap();
        assert_eq!(record.record_type, "email");
        assert_eq!(record.data["extract"], json!({"subject": "A", "sender": "x@y"}));
    }

    #[tokio::test]
    async fn create_records_with_custom_pattern() {
        let store = MemoryStore::new();
        let wf = WorkflowId::v4();
        let spec = CreateRecordsSpec {
            record_type: "order".into(),
            id_pattern: Some("order_{{region}}_{{index}}".into()),
        };
        let result = json!([{"region": "eu"}]);

        let effects = apply_create_records(&store, wf, "scan", &spec, None, &result)
            .await
            .unwrap();
        assert_eq!(effects.records_created, vec!["order_eu_001"]);
    }

    #[tokio::test]
    async fn create_records_upserts_on_rerun() {
        let store = MemoryStore::new();
        let wf = WorkflowId::v4();
        let spec = CreateRecordsSpec {
            record_type: "email".into(),
            id_pattern: None,
        };
        let result = json!([{"subject": "A"}]);

        apply_create_records(&store, wf, "extract", &spec, None, &result)
            .await
            .unwrap();
        let effects = apply_create_records(&store, wf, "extract", &spec, None, &result)
            .await
            .unwrap();

        assert!(effects.records_created.is_empty());
        assert_eq!(effects.records_updated, vec!["email_001"]);
    }

    #[tokio::test]
    async fn create_records_rejects_non_array_results() {
        let store = MemoryStore::new();
        let spec = CreateRecordsSpec {
            record_type: "email".into(),
            id_pattern: None,
        };
        let err =
            apply_create_records(&store, WorkflowId::v4(), "x", &spec, None, &json!("nope"))
                .await
                .unwrap_err();
        assert_eq!(err.code, "invalid_result");
    }

    #[test]
    fn scalar_elements_are_wrapped_as_value() {
        let fields = record_fields(&json!("hello"), None);
        assert_eq!(fields["value"], json!("hello"));
    }

    #[test]
    fn record_fields_filter_by_matching_sources() {
        let spec = StoreSpec::Map(
            [("subject".to_owned(), "subject".to_owned())]
                .into_iter()
                .collect(),
        );
        let fields = record_fields(&json!({"subject": "A", "body": "..."}), Some(&spec));
        assert_eq!(fields.len(), 1);
        assert!(fields.contains_key("subject"));
    }

    #[test]
    fn record_fields_keep_everything_when_no_source_matches() {
        let spec = StoreSpec::Map(
            [("count".to_owned(), "length".to_owned())]
                .into_iter()
                .collect(),
        );
        let fields = record_fields(&json!({"subject": "A", "sender": "x@y"}), Some(&spec));
        assert_eq!(fields.len(), 2);
    }
}
