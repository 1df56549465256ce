//! Core types for resource tracking

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stack_ledger_common::{ResourceKind, ResourceStatus, cleanup_priority_for};
use thiserror::Error;

use crate::command::CleanupCommand;
use crate::error::ErrorCode;
use crate::state::{StoreError, StoredResource};

/// A tracked resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub resource_type: String,
    pub metadata: serde_json::Value,
    pub status: ResourceStatus,
    pub dependencies: BTreeSet<String>,
    pub cleanup_command: Option<CleanupCommand>,
    pub tags: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl Resource {
    /// Known kind of this resource, if its type name is one
    pub fn kind(&self) -> Option<ResourceKind> {
        ResourceKind::parse(&self.resource_type)
    }

    /// Get cleanup priority (lower = cleanup first, unknown types last)
    pub fn cleanup_priority(&self) -> u8 {
        cleanup_priority_for(&self.resource_type)
    }

    /// Entry written to the state store
    pub(crate) fn to_stored(&self) -> StoredResource {
        StoredResource {
            id: self.id.clone(),
            created_at: self.created_at,
            metadata: self.metadata.clone(),
            status: Some(self.status),
            dependencies: self.dependencies.clone(),
            tags: self.tags.clone(),
            cleanup_command: self.cleanup_command.clone(),
        }
    }
}

/// Arguments for [`super::ResourceRegistry::register`]
///
/// # Example
///
/// ```
/// use stack_ledger::command::CleanupCommand;
/// use stack_ledger::registry::Registration;
///
/// let volume = Registration::new("volume", "vol-0abc")
///     .metadata(serde_json::json!({"size_gb": 100}))
///     .depends_on("i-0abc")
///     .cleanup_command(CleanupCommand::new(
///         "aws",
///         ["ec2", "delete-volume", "--volume-id", "vol-0abc"],
///     ));
/// assert_eq!(volume.id, "vol-0abc");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub resource_type: String,
    pub id: String,
    pub metadata: serde_json::Value,
    pub cleanup_command: Option<CleanupCommand>,
    pub dependencies: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl Registration {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            metadata: serde_json::Value::Object(Default::default()),
            cleanup_command: None,
            dependencies: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn cleanup_command(mut self, command: CleanupCommand) -> Self {
        self.cleanup_command = Some(command);
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    pub fn dependencies<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }
}

/// Result ordering for [`super::ResourceRegistry::query`]
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortBy {
    /// Oldest first, ties in registration order
    #[default]
    Timestamp,
    /// Lexicographic by id
    Id,
    /// Lifecycle order, then id
    Status,
}

/// What to do with a status change the transition table does not allow
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum TransitionPolicy {
    /// Log a warning and apply the change anyway
    #[default]
    Lenient,
    /// Refuse the change
    Strict,
}

/// Registry failures
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Resource '{0}' is not registered")]
    NotRegistered(String),

    #[error("Resource '{id}' still has live dependents: {}", .blockers.join(", "))]
    DependencyConflict { id: String, blockers: Vec<String> },

    #[error("Resource '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: ResourceStatus,
        to: ResourceStatus,
    },

    #[error("No resources of type '{0}' are registered")]
    TypeNotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// Taxonomy code for this failure
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotRegistered(_) => ErrorCode::RESOURCE_NOT_REGISTERED,
            Self::DependencyConflict { .. } => ErrorCode::DEPENDENCY_CONFLICT,
            Self::InvalidTransition { .. } => ErrorCode::INVALID_TRANSITION,
            Self::TypeNotFound(_) => ErrorCode::TYPE_NOT_FOUND,
            Self::Store(_) => ErrorCode::STATE_STORE_FAILED,
        }
    }
}
