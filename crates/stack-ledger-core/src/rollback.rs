//! Phase-indexed rollback
//!
//! A deployment walks the phases in declaration order. Rolling back from a
//! phase tears down that phase and every earlier one, latest first, so
//! application pieces go before storage, storage before load balancers,
//! and so on down to the network.

use serde::Serialize;
use stack_ledger_common::ResourceKind;
use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::command::CommandRunner;
use crate::registry::ResourceRegistry;
use crate::teardown::{TeardownReport, teardown_all};

/// Deployment phases in the order they are provisioned
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum DeploymentPhase {
    Network,
    Security,
    Compute,
    LoadBalancer,
    Storage,
    Application,
}

impl DeploymentPhase {
    /// Phase a resource type is provisioned in; unknown types are application
    pub fn of_type(resource_type: &str) -> Self {
        match ResourceKind::parse(resource_type) {
            Some(ResourceKind::Vpc | ResourceKind::Subnet) => Self::Network,
            Some(
                ResourceKind::SecurityGroup
                | ResourceKind::KeyPair
                | ResourceKind::InstanceProfile
                | ResourceKind::IamRole,
            ) => Self::Security,
            Some(ResourceKind::SpotRequest | ResourceKind::Instance) => Self::Compute,
            Some(ResourceKind::LoadBalancer | ResourceKind::TargetGroup) => Self::LoadBalancer,
            Some(ResourceKind::Volume | ResourceKind::MountTarget | ResourceKind::Filesystem) => {
                Self::Storage
            }
            None => Self::Application,
        }
    }
}

/// Phases to undo after reaching `reached`, latest first
pub fn rollback_sequence(reached: DeploymentPhase) -> Vec<DeploymentPhase> {
    let mut phases: Vec<_> = DeploymentPhase::iter()
        .filter(|phase| *phase <= reached)
        .collect();
    phases.reverse();
    phases
}

/// Teardown of one phase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseRollback {
    pub phase: DeploymentPhase,
    pub teardown: TeardownReport,
}

/// Everything a rollback did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackReport {
    pub reached: DeploymentPhase,
    pub phases: Vec<PhaseRollback>,
}

impl RollbackReport {
    /// All steps across phases, in execution order
    pub fn combined(&self) -> TeardownReport {
        let mut all = TeardownReport::default();
        for phase in &self.phases {
            all.extend(phase.teardown.clone());
        }
        all
    }

    pub fn is_clean(&self) -> bool {
        self.phases.iter().all(|p| p.teardown.is_clean())
    }
}

/// Roll back every phase up to and including `reached`
///
/// Best effort: a failing cleanup is recorded and the remaining resources
/// and phases are still processed.
pub fn rollback(
    registry: &mut ResourceRegistry,
    reached: DeploymentPhase,
    runner: &dyn CommandRunner,
) -> RollbackReport {
    info!(phase = %reached, "Rolling back deployment");

    let mut phases = Vec::new();
    for phase in rollback_sequence(reached) {
        let ids: Vec<String> = registry
            .generate_topological_plan()
            .into_iter()
            .filter(|id| {
                registry
                    .get(id)
                    .is_some_and(|r| DeploymentPhase::of_type(&r.resource_type) == phase)
            })
            .collect();

        if ids.is_empty() {
            continue;
        }

        info!(phase = %phase, resources = ids.len(), "Rolling back phase");
        let teardown = teardown_all(registry, &ids, runner);
        for step in teardown.failed() {
            warn!(
                phase = %phase,
                resource_id = %step.id,
                error = step.error.as_deref().unwrap_or("unknown"),
                "Rollback step failed, continuing"
            );
        }
        phases.push(PhaseRollback { phase, teardown });
    }

    let report = RollbackReport { reached, phases };
    info!(
        phase = %reached,
        clean = report.is_clean(),
        "Rollback finished"
    );
    report
}
