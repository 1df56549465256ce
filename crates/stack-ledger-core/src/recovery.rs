//! Turning a classified error into what the driver does next

use stack_ledger_common::defaults::DEFAULT_MAX_RETRIES_PER_CODE;
use tracing::{info, warn};

use crate::command::CommandRunner;
use crate::error::{DeploymentError, ErrorState, RecoveryStrategy};
use crate::registry::ResourceRegistry;
use crate::retry::{RetryPolicy, Sleeper};
use crate::rollback::{DeploymentPhase, RollbackReport, rollback};

/// What the driver should do about a failure
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryAction {
    /// Run the same step again
    Retry,
    /// Try the alternate resource or path
    Fallback,
    /// Treat the step as done
    Skip,
    /// Stop and hand over to an operator; nothing was rolled back
    Escalate,
    /// Stop; no phase was in progress so nothing was rolled back
    Abort,
    /// Stop; the deployment was rolled back
    RolledBack(RollbackReport),
}

impl RecoveryAction {
    /// Check if the deployment cannot continue
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Escalate | Self::Abort | Self::RolledBack(_))
    }
}

/// Decides recovery for thrown errors and drives rollback
pub struct RecoveryEngine<R> {
    runner: R,
    max_retries_per_code: u32,
}

impl<R: CommandRunner> RecoveryEngine<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            max_retries_per_code: DEFAULT_MAX_RETRIES_PER_CODE,
        }
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries_per_code = max;
        self
    }

    /// Decide what to do about `error`
    ///
    /// Retryable codes that already hit their per-code limit are handled as
    /// aborts. Abort and manual strategies roll back when `phase` says how
    /// far the deployment got.
    pub fn handle(
        &self,
        errors: &ErrorState,
        registry: &mut ResourceRegistry,
        error: &DeploymentError,
        phase: Option<DeploymentPhase>,
    ) -> RecoveryAction {
        let code = error.code();

        // strategy as thrown, which may override the code default
        let strategy = match error.recovery() {
            RecoveryStrategy::Retry if errors.occurrences(code) < self.max_retries_per_code => {
                info!(code = code.value(), "Retrying");
                return RecoveryAction::Retry;
            }
            RecoveryStrategy::Retry => {
                warn!(
                    code = code.value(),
                    occurrences = errors.occurrences(code),
                    max = self.max_retries_per_code,
                    "Retry limit reached, aborting"
                );
                RecoveryStrategy::Abort
            }
            other => other,
        };

        match (strategy, phase) {
            (RecoveryStrategy::Fallback, _) => RecoveryAction::Fallback,
            (RecoveryStrategy::Skip, _) => RecoveryAction::Skip,
            (
                RecoveryStrategy::Abort | RecoveryStrategy::Manual | RecoveryStrategy::Retry,
                Some(phase),
            ) => RecoveryAction::RolledBack(rollback(registry, phase, &self.runner)),
            (RecoveryStrategy::Manual, None) => {
                warn!(code = code.value(), "Manual intervention required");
                RecoveryAction::Escalate
            }
            (RecoveryStrategy::Abort | RecoveryStrategy::Retry, None) => RecoveryAction::Abort,
        }
    }
}

/// Retry `op` while its errors classify as retryable
///
/// Each attempt runs inside a context frame named `description`, so errors
/// thrown by `op` are attributed to it. Errors with any other strategy are
/// returned immediately.
pub fn retry_classified<T>(
    errors: &mut ErrorState,
    policy: &RetryPolicy,
    description: &str,
    sleeper: &dyn Sleeper,
    mut op: impl FnMut(&mut ErrorState, u32) -> Result<T, DeploymentError>,
) -> Result<T, DeploymentError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut delays = policy.delays();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let result = errors.with_context(description, |errors| op(errors, attempt));

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.recovery() != RecoveryStrategy::Retry || attempt >= max_attempts => {
                return Err(e);
            }
            Err(e) => {
                let delay = delays.next().unwrap_or(policy.max_delay);
                warn!(
                    operation = %description,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retryable failure, backing off"
                );
                sleeper.sleep(delay);
            }
        }
    }
}
