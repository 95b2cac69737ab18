//! The record model.
//!
//! A record is a persistent per-entity namespace (`email_001`) that
//! accumulates fields progressively: every node that writes to it does
//! so under its own alias, so `data` maps source-node alias → the
//! fields that node stored. Later nodes never overwrite other nodes'
//! namespaces.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Record lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Created by an extraction, not yet worked.
    Discovered,
    /// Currently being processed.
    Processing,
    /// Fully processed.
    Completed,
    /// Processing failed; see `error_message`.
    Failed,
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discovered => "discovered",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A persistent per-entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identifier (`email_001`), unique per workflow.
    pub record_id: String,
    /// The record's type (`email`).
    pub record_type: String,
    /// Source-node alias → fields that node stored.
    pub data: IndexMap<String, Value>,
    /// Lifecycle status.
    pub status: RecordStatus,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
    /// Failure detail when `status` is `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Record {
    /// Create a freshly discovered record.
    #[must_use]
    pub fn new(record_id: impl Into<String>, record_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            record_id: record_id.into(),
            record_type: record_type.into(),
            data: IndexMap::new(),
            status: RecordStatus::Discovered,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    /// Merge `fields` into this record's data under `alias`.
    ///
    /// Existing fields under the same alias are overwritten key-by-key;
    /// other aliases' namespaces are untouched.
    pub fn merge_data(&mut self, alias: &str, fields: serde_json::Map<String, Value>) {
        let namespace = self
            .data
            .entry(alias.to_owned())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        if let Value::Object(existing) = namespace {
            for (key, value) in fields {
                existing.insert(key, value);
            }
        } else {
            *namespace = Value::Object(fields);
        }
        self.updated_at = Utc::now();
    }

    /// The merged view templates resolve against: `record_id`,
    /// `record_type`, and `status` at the top level, plus every data
    /// namespace keyed by its alias.
    #[must_use]
    pub fn merged_view(&self) -> Value {
        let mut view = serde_json::Map::with_capacity(self.data.len() + 3);
        view.insert("record_id".into(), Value::String(self.record_id.clone()));
        view.insert("record_type".into(), Value::String(self.record_type.clone()));
        view.insert("status".into(), Value::String(self.status.to_string()));
        for (alias, fields) in &self.data {
            view.insert(alias.clone(), fields.clone());
        }
        Value::Object(view)
    }
}
