//! Running stored cleanup commands against registered resources

use serde::Serialize;
use stack_ledger_common::ResourceStatus;
use tracing::{info, warn};

use crate::command::CommandRunner;
use crate::registry::{RegistryError, ResourceRegistry};

/// Result of a single resource cleanup operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CleanupResult {
    /// Cleanup command succeeded, status is now `deleted`
    Deleted,
    /// Status was already `deleted`, nothing ran
    AlreadyDeleted,
    /// Cleanup failed, status is now `failed`
    Failed,
    /// No cleanup command stored, nothing ran
    Skipped,
}

/// One resource's teardown
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeardownStep {
    pub id: String,
    pub resource_type: String,
    pub result: CleanupResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of tearing down a list of resources
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TeardownReport {
    pub steps: Vec<TeardownStep>,
}

impl TeardownReport {
    pub fn count(&self, result: CleanupResult) -> usize {
        self.steps.iter().filter(|s| s.result == result).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &TeardownStep> {
        self.steps.iter().filter(|s| s.result == CleanupResult::Failed)
    }

    /// True when nothing failed
    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none()
    }

    pub fn extend(&mut self, other: TeardownReport) {
        self.steps.extend(other.steps);
    }
}

/// Tear down one resource: `deleting`, run its command, then `deleted`
///
/// A resource whose current status cannot move to `deleting` is marked
/// `failed` first, which the transition table allows from every live
/// state. Any failure leaves the resource `failed`.
pub fn teardown_resource(
    registry: &mut ResourceRegistry,
    id: &str,
    runner: &dyn CommandRunner,
) -> TeardownStep {
    let Some(resource) = registry.get(id) else {
        warn!(resource_id = %id, "Not registered, nothing to tear down");
        return TeardownStep {
            id: id.to_string(),
            resource_type: String::new(),
            result: CleanupResult::Failed,
            error: Some(RegistryError::NotRegistered(id.to_string()).to_string()),
        };
    };

    let resource_type = resource.resource_type.clone();
    let status = resource.status;
    let command = resource.cleanup_command.clone();
    let step = |result, error: Option<String>| TeardownStep {
        id: id.to_string(),
        resource_type: resource_type.clone(),
        result,
        error,
    };

    if status == ResourceStatus::Deleted {
        return step(CleanupResult::AlreadyDeleted, None);
    }

    let Some(command) = command else {
        info!(resource_id = %id, resource_type = %resource_type, "No cleanup command, skipping");
        return step(CleanupResult::Skipped, None);
    };

    if let Err(e) = mark_deleting(registry, id, status) {
        warn!(resource_id = %id, error = %e, "Could not mark resource as deleting");
        return step(CleanupResult::Failed, Some(e.to_string()));
    }

    let failure = match runner.run(&command) {
        Ok(true) => None,
        Ok(false) => Some(format!("cleanup command exited non-zero: {command}")),
        Err(e) => Some(format!("{e:#}")),
    };

    match failure {
        None => match registry.update_status(id, ResourceStatus::Deleted, Some("cleanup command succeeded")) {
            Ok(()) => {
                info!(resource_id = %id, resource_type = %resource_type, "Deleted");
                step(CleanupResult::Deleted, None)
            }
            Err(e) => {
                warn!(resource_id = %id, error = %e, "Deleted but could not record it");
                step(CleanupResult::Failed, Some(e.to_string()))
            }
        },
        Some(reason) => {
            warn!(resource_id = %id, resource_type = %resource_type, error = %reason, "Cleanup failed");
            if let Err(e) = registry.update_status(id, ResourceStatus::Failed, Some(&reason)) {
                warn!(resource_id = %id, error = %e, "Could not mark resource as failed");
            }
            step(CleanupResult::Failed, Some(reason))
        }
    }
}

/// Tear down `ids` in the given order, continuing past failures
pub fn teardown_all(
    registry: &mut ResourceRegistry,
    ids: &[String],
    runner: &dyn CommandRunner,
) -> TeardownReport {
    let steps = ids
        .iter()
        .map(|id| teardown_resource(registry, id, runner))
        .collect();
    TeardownReport { steps }
}

fn mark_deleting(
    registry: &mut ResourceRegistry,
    id: &str,
    status: ResourceStatus,
) -> Result<(), RegistryError> {
    if status == ResourceStatus::Deleting {
        return Ok(());
    }
    if !status.can_transition_to(ResourceStatus::Deleting) {
        registry.update_status(id, ResourceStatus::Failed, Some("teardown requested"))?;
    }
    registry.update_status(id, ResourceStatus::Deleting, Some("teardown requested"))
}
