//! In-memory store backend.
//!
//! Workflows shard into independent entries of a [`DashMap`]; every
//! operation locks exactly one shard, which gives the per-key atomicity
//! the port requires without a global lock.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::debug;
use webpilot_core::{WorkflowId, record_id};
use webpilot_workflow::{DescriptionVersion, Plan, PlanVersion};

use crate::backend::{RecordPatch, StoreBackend};
use crate::error::StoreError;
use crate::record::Record;

/// Per-workflow storage shard.
#[derive(Debug, Default)]
struct Shard {
    globals: serde_json::Map<String, Value>,
    records: IndexMap<String, Record>,
    descriptions: Vec<DescriptionVersion>,
    plans: Vec<PlanVersion>,
    browser_state: Option<Value>,
}

/// The in-process [`StoreBackend`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    shards: DashMap<WorkflowId, Shard>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_shard<T>(&self, workflow: WorkflowId, f: impl FnOnce(&mut Shard) -> T) -> T {
        let mut shard = self.shards.entry(workflow).or_default();
        f(&mut shard)
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn get_global(
        &self,
        workflow: WorkflowId,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.with_shard(workflow, |shard| shard.globals.get(key).cloned()))
    }

    async fn set_global(
        &self,
        workflow: WorkflowId,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        debug!(workflow = %workflow, key, "set global");
        self.with_shard(workflow, |shard| {
            shard.globals.insert(key.to_owned(), value);
        });
        Ok(())
    }

    async fn delete_global(&self, workflow: WorkflowId, key: &str) -> Result<(), StoreError> {
        self.with_shard(workflow, |shard| {
            shard.globals.remove(key);
        });
        Ok(())
    }

    async fn clear_globals(&self, workflow: WorkflowId) -> Result<(), StoreError> {
        self.with_shard(workflow, |shard| shard.globals.clear());
        Ok(())
    }

    async fn scan_globals(
        &self,
        workflow: WorkflowId,
        prefix: Option<&str>,
    ) -> Result<serde_json::Map<String, Value>, StoreError> {
        Ok(self.with_shard(workflow, |shard| match prefix {
            None => shard.globals.clone(),
            Some(prefix) => shard
                .globals
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }))
    }

    async fn create_record(&self, workflow: WorkflowId, record: Record) -> Result<(), StoreError> {
        debug!(workflow = %workflow, record_id = %record.record_id, "create record");
        self.with_shard(workflow, |shard| {
            if shard.records.contains_key(&record.record_id) {
                return Err(StoreError::DuplicateRecord {
                    record_id: record.record_id.clone(),
                });
            }
            shard.records.insert(record.record_id.clone(), record);
            Ok(())
        })
    }

    async fn get_record(
        &self,
        workflow: WorkflowId,
        id: &str,
    ) -> Result<Option<Record>, StoreError> {
        Ok(self.with_shard(workflow, |shard| shard.records.get(id).cloned()))
    }

    async fn update_record(
        &self,
        workflow: WorkflowId,
        id: &str,
        patch: RecordPatch,
    ) -> Result<Record, StoreError> {
        self.with_shard(workflow, |shard| {
            let record = shard
                .records
                .get_mut(id)
                .ok_or_else(|| StoreError::RecordNotFound {
                    record_id: id.to_owned(),
                })?;
            if let Some((alias, fields)) = patch.merge_data {
                record.merge_data(&alias, fields);
            }
            if let Some(status) = patch.status {
                record.status = status;
            }
            if patch.clear_error {
                record.error_message = None;
            }
            if let Some(message) = patch.error_message {
                record.error_message = Some(message);
            }
            record.updated_at = Utc::now();
            Ok(record.clone())
        })
    }

    async fn delete_record(&self, workflow: WorkflowId, id: &str) -> Result<(), StoreError> {
        self.with_shard(workflow, |shard| {
            shard
                .records
                .shift_remove(id)
                .map(|_| ())
                .ok_or_else(|| StoreError::RecordNotFound {
                    record_id: id.to_owned(),
                })
        })
    }

    async fn list_records(
        &self,
        workflow: WorkflowId,
        pattern: &str,
    ) -> Result<Vec<Record>, StoreError> {
        Ok(self.with_shard(workflow, |shard| {
            shard
                .records
                .values()
                .filter(|record| record_id::matches_pattern(&record.record_id, pattern))
                .cloned()
                .collect()
        }))
    }

    async fn clear_records(&self, workflow: WorkflowId) -> Result<(), StoreError> {
        self.with_shard(workflow, |shard| shard.records.clear());
        Ok(())
    }

    async fn description(
        &self,
        workflow: WorkflowId,
    ) -> Result<Option<DescriptionVersion>, StoreError> {
        Ok(self.with_shard(workflow, |shard| shard.descriptions.last().cloned()))
    }

    async fn append_description(
        &self,
        workflow: WorkflowId,
        text: String,
        reason: Option<String>,
    ) -> Result<DescriptionVersion, StoreError> {
        Ok(self.with_shard(workflow, |shard| {
            let version = DescriptionVersion {
                version: shard.descriptions.len() as u32 + 1,
                text,
                reason,
                updated_at: Utc::now(),
            };
            shard.descriptions.push(version.clone());
            version
        }))
    }

    async fn plan(&self, workflow: WorkflowId) -> Result<Option<PlanVersion>, StoreError> {
        Ok(self.with_shard(workflow, |shard| shard.plans.last().cloned()))
    }

    async fn append_plan(
        &self,
        workflow: WorkflowId,
        plan: Plan,
        reason: Option<String>,
    ) -> Result<PlanVersion, StoreError> {
        Ok(self.with_shard(workflow, |shard| {
            let version = PlanVersion {
                version: shard.plans.len() as u32 + 1,
                plan,
                reason,
                updated_at: Utc::now(),
            };
            shard.plans.push(version.clone());
            version
        }))
    }

    async fn browser_state(&self, workflow: WorkflowId) -> Result<Option<Value>, StoreError> {
        Ok(self.with_shard(workflow, |shard| shard.browser_state.clone()))
    }

    async fn set_browser_state(
        &self,
        workflow: WorkflowId,
        state: Value,
    ) -> Result<(), StoreError> {
        self.with_shard(workflow, |shard| shard.browser_state = Some(state));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordStatus;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn wf() -> WorkflowId {
        WorkflowId::v4()
    }

    fn fields(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn globals_roundtrip() {
        let store = MemoryStore::new();
        let id = wf();
        store.set_global(id, "apiKey", json!("sk-123")).await.unwrap();
        assert_eq!(
            store.get_global(id, "apiKey").await.unwrap(),
            Some(json!("sk-123"))
        );

        store.delete_global(id, "apiKey").await.unwrap();
        assert_eq!(store.get_global(id, "apiKey").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_global_is_an_upsert() {
        let store = MemoryStore::new();
        let id = wf();
        store.set_global(id, "n", json!(1)).await.unwrap();
        store.set_global(id, "n", json!(2)).await.unwrap();
        assert_eq!(store.get_global(id, "n").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn scan_globals_filters_by_prefix() {
        let store = MemoryStore::new();
        let id = wf();
        store.set_global(id, "apiKey", json!("k")).await.unwrap();
        store
            .set_global(id, "extract.count", json!(2))
            .await
            .unwrap();
        store
            .set_global(id, "extract.emails", json!([]))
            .await
            .unwrap();

        let scanned = store.scan_globals(id, Some("extract.")).await.unwrap();
        assert_eq!(scanned.len(), 2);
        assert!(scanned.contains_key("extract.count"));

        let all = store.scan_globals(id, None).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn clearing_globals_leaves_records_alone() {
        let store = MemoryStore::new();
        let id = wf();
        store.set_global(id, "apiKey", json!("k")).await.unwrap();
        store
            .create_record(id, Record::new("email_001", "email"))
            .await
            .unwrap();

        store.clear_globals(id).await.unwrap();
        assert!(store.scan_globals(id, None).await.unwrap().is_empty());
        assert!(store.get_record(id, "email_001").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn duplicate_record_rejected() {
        let store = MemoryStore::new();
        let id = wf();
        store
            .create_record(id, Record::new("email_001", "email"))
            .await
            .unwrap();
        let err = store
            .create_record(id, Record::new("email_001", "email"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateRecord { .. }));
    }

    #[tokio::test]
    async fn update_record_merges_under_alias() {
        let store = MemoryStore::new();
        let id = wf();
        store
            .create_record(id, Record::new("email_001", "email"))
            .await
            .unwrap();

        store
            .update_record(
                id,
                "email_001",
                RecordPatch::merge("extract", fields(json!({"subject": "A"}))),
            )
            .await
            .unwrap();
        let updated = store
            .update_record(
                id,
                "email_001",
                RecordPatch::merge("classify", fields(json!({"type": "investor"})))
                    .with_status(RecordStatus::Completed),
            )
            .await
            .unwrap();

        assert_eq!(updated.data["extract"], json!({"subject": "A"}));
        assert_eq!(updated.data["classify"], json!({"type": "investor"}));
        assert_eq!(updated.status, RecordStatus::Completed);
    }

    #[tokio::test]
    async fn update_missing_record_fails() {
        let store = MemoryStore::new();
        let err = store
            .update_record(wf(), "ghost_001", RecordPatch::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn list_records_by_pattern_in_creation_order() {
        let store = MemoryStore::new();
        let id = wf();
        for record_id in ["email_001", "email_002", "order_001"] {
            let record_type = record_id.rsplit_once('_').unwrap().0;
            store
                .create_record(id, Record::new(record_id, record_type))
                .await
                .unwrap();
        }

        let emails = store.list_records(id, "email_*").await.unwrap();
        assert_eq!(
            emails.iter().map(|r| r.record_id.as_str()).collect::<Vec<_>>(),
            vec!["email_001", "email_002"]
        );
        assert_eq!(store.list_records(id, "*").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn workflows_are_isolated() {
        let store = MemoryStore::new();
        let a = wf();
        let b = wf();
        store.set_global(a, "k", json!(1)).await.unwrap();
        assert_eq!(store.get_global(b, "k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn plan_and_description_versions_increment() {
        let store = MemoryStore::new();
        let id = wf();

        let v1 = store
            .append_description(id, "goal v1".into(), None)
            .await
            .unwrap();
        let v2 = store
            .append_description(id, "goal v2".into(), Some("clarified".into()))
            .await
            .unwrap();
        assert_eq!((v1.version, v2.version), (1, 2));
        assert_eq!(
            store.description(id).await.unwrap().unwrap().text,
            "goal v2"
        );

        let plan = Plan { phases: vec![] };
        let p1 = store.append_plan(id, plan.clone(), None).await.unwrap();
        assert_eq!(p1.version, 1);
        assert_eq!(store.plan(id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn browser_state_snapshot_roundtrip() {
        let store = MemoryStore::new();
        let id = wf();
        assert_eq!(store.browser_state(id).await.unwrap(), None);
        store
            .set_browser_state(id, json!({"activeTabName": "main"}))
            .await
            .unwrap();
        assert_eq!(
            store.browser_state(id).await.unwrap().unwrap()["activeTabName"],
            json!("main")
        );
    }
}
