//! Everything one invocation works with, opened from a [`StackConfig`]

use anyhow::Result;
use tracing::{debug, info};
use uuid::Uuid;

use crate::command::ProcessRunner;
use crate::config::StackConfig;
use crate::error::{DeploymentError, ErrorLog, ErrorState, ThrowSpec};
use crate::recovery::RecoveryEngine;
use crate::registry::ResourceRegistry;
use crate::report::ReportEnvironment;
use crate::state::StateStore;

pub struct Session {
    pub id: Uuid,
    pub config: StackConfig,
    pub registry: ResourceRegistry,
    pub errors: ErrorState,
}

impl Session {
    /// Open (or create) the stack's state file and recover its registry
    ///
    /// Config, state file and recovery failures come back as a
    /// [`DeploymentError`], already counted and logged.
    pub fn open(config: StackConfig) -> Result<Self> {
        config.validate().map_err(|e| ErrorState::new().throw(&e))?;

        let log_path = config.error_log_file()?;
        debug!(path = %log_path.display(), "Error log");
        let mut errors = ErrorState::with_log(ErrorLog::new(log_path));

        let state_path = config.state_file()?;
        let registry = errors.with_context("open_state", |errors| {
            let store = StateStore::open(&state_path, &config.stack_name, &config.region)
                .map_err(|e| errors.throw(&e))?;
            ResourceRegistry::recover(store, config.transition_policy)
                .map_err(|e| errors.throw(&e))
        })?;

        let id = Uuid::now_v7();
        info!(
            session = %id,
            stack = %config.stack_name,
            region = %config.region,
            resources = registry.len(),
            "Session opened"
        );

        Ok(Self {
            id,
            config,
            registry,
            errors,
        })
    }

    /// Record a failure through the error engine
    pub fn throw(&mut self, spec: impl Into<ThrowSpec>) -> DeploymentError {
        self.errors.throw(spec)
    }

    pub fn error_log(&self) -> Result<ErrorLog> {
        Ok(ErrorLog::new(self.config.error_log_file()?))
    }

    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::with_timeout(self.config.command_timeout())
    }

    pub fn recovery_engine(&self) -> RecoveryEngine<ProcessRunner> {
        RecoveryEngine::new(self.runner()).with_max_retries(self.config.retry.max_retries_per_code)
    }

    pub fn environment(&self) -> ReportEnvironment {
        ReportEnvironment {
            stack_name: self.config.stack_name.clone(),
            region: self.config.region.clone(),
            account: self.config.account.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::registry::Registration;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> StackConfig {
        StackConfig {
            stack_name: "session-test".into(),
            state_path: Some(dir.path().join("state.json")),
            error_log_path: Some(dir.path().join("errors.jsonl")),
            ..StackConfig::default()
        }
    }

    #[test]
    fn test_reopen_recovers_registry() {
        let dir = TempDir::new().unwrap();

        let mut session = Session::open(config(&dir)).unwrap();
        session
            .registry
            .register(Registration::new("instance", "i-1"))
            .unwrap();
        drop(session);

        let session = Session::open(config(&dir)).unwrap();
        assert!(session.registry.contains("i-1"));
    }

    #[test]
    fn test_throw_goes_to_configured_log() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::open(config(&dir)).unwrap();

        session.throw(ErrorCode::TIMEOUT);
        let records = session.error_log().unwrap().read_all().unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.region.clear();
        let err = Session::open(config).err().unwrap();
        assert_eq!(
            err.downcast_ref::<DeploymentError>().map(DeploymentError::code),
            Some(ErrorCode::INVALID_PARAMETER)
        );
    }

    #[test]
    fn test_corrupt_state_is_a_classified_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("state.json"), "not json").unwrap();

        let err = Session::open(config(&dir)).err().unwrap();
        let err = err.downcast_ref::<DeploymentError>().unwrap();
        assert_eq!(err.code(), ErrorCode::STATE_STORE_FAILED);
        assert_eq!(err.context(), "open_state");

        let logged = ErrorLog::new(dir.path().join("errors.jsonl")).read_all().unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].code, ErrorCode::STATE_STORE_FAILED);
    }
}
