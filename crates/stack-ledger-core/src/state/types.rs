//! Persisted document types

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stack_ledger_common::ResourceStatus;

use crate::command::CleanupCommand;

/// The whole state file
///
/// ```json
/// {"stack_name": "...", "created_at": "...", "region": "...",
///  "resources": {"instance": [{"id": "i-1", "created_at": "...", "metadata": {}}]}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    pub stack_name: String,
    pub created_at: DateTime<Utc>,
    pub region: String,
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<StoredResource>>,
}

/// One resource summary inside a type bucket
///
/// Only `id`, `created_at` and `metadata` are guaranteed. The rest is written
/// when known so a crashed session can be recovered, and omitted when empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ResourceStatus>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub dependencies: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_command: Option<CleanupCommand>,
}

impl StoreDocument {
    pub fn new(stack_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            created_at: Utc::now(),
            region: region.into(),
            resources: BTreeMap::new(),
        }
    }

    /// Total number of stored entries across all buckets
    pub fn resource_count(&self) -> usize {
        self.resources.values().map(Vec::len).sum()
    }
}
