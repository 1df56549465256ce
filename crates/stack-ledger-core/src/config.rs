//! Stack configuration
//!
//! Layered lowest to highest: built-in defaults, an optional JSON file,
//! environment variables, then command-line flags (applied by the binary).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stack_ledger_common::StackIdentity;
use stack_ledger_common::defaults::{
    DEFAULT_BASE_DELAY_SECS, DEFAULT_ENVIRONMENT, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_SECS,
    DEFAULT_MAX_RETRIES_PER_CODE, DEFAULT_REGION, DEFAULT_STACK_NAME,
};
use thiserror::Error;

use crate::command::DEFAULT_COMMAND_TIMEOUT;
use crate::error::ErrorCode;
use crate::registry::TransitionPolicy;
use crate::retry::RetryPolicy;
use crate::state::{default_error_log_path, default_state_path};

pub const ENV_STACK: &str = "STACK_LEDGER_STACK";
pub const ENV_REGION: &str = "STACK_LEDGER_REGION";
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_ACCOUNT: &str = "STACK_LEDGER_ACCOUNT";

/// Configuration validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("stack_name cannot be empty")]
    EmptyStackName,

    #[error("stack_name may only contain letters, digits, '-' and '_', got: {0}")]
    InvalidStackName(String),

    #[error("region cannot be empty")]
    EmptyRegion,

    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("max_delay_secs ({max}) must not be below base_delay_secs ({base})")]
    InvalidDelays { base: u64, max: u64 },

    #[error("command_timeout_secs must be greater than 0")]
    InvalidCommandTimeout,

    /// Failed to parse JSON configuration
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to read configuration file
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create an IO error with path context
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Io { .. } => ErrorCode::CONFIG_MISSING,
            Self::Parse(_) => ErrorCode::CONFIG_INVALID,
            _ => ErrorCode::INVALID_PARAMETER,
        }
    }
}

/// Retry limits as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
    /// Throws of one code after which retryable errors abort instead
    pub max_retries_per_code: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: DEFAULT_BASE_DELAY_SECS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
            max_retries_per_code: DEFAULT_MAX_RETRIES_PER_CODE,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.base_delay_secs),
            Duration::from_secs(self.max_delay_secs),
        )
    }
}

/// Everything needed to open a stack's registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub stack_name: String,
    pub region: String,
    pub environment: String,
    /// Cloud account, reported in incident reports
    pub account: Option<String>,
    /// Overrides the per-stack data directory location
    pub state_path: Option<PathBuf>,
    pub error_log_path: Option<PathBuf>,
    pub transition_policy: TransitionPolicy,
    pub retry: RetrySettings,
    pub command_timeout_secs: u64,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: DEFAULT_STACK_NAME.to_string(),
            region: DEFAULT_REGION.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            account: None,
            state_path: None,
            error_log_path: None,
            transition_policy: TransitionPolicy::default(),
            retry: RetrySettings::default(),
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT.as_secs(),
        }
    }
}

impl StackConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|e| ConfigError::io(path.display().to_string(), e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Load `path` if given, otherwise start from defaults, then apply the
    /// process environment
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override fields from environment variables looked up through `var`
    ///
    /// `STACK_LEDGER_REGION` wins over `AWS_REGION`. Empty values are ignored.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        if let Some(stack) = var(ENV_STACK) {
            self.stack_name = stack;
        }
        if let Some(region) = var(ENV_REGION).or_else(|| var(ENV_AWS_REGION)) {
            self.region = region;
        }
        if let Some(account) = var(ENV_ACCOUNT) {
            self.account = Some(account);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stack_name.is_empty() {
            return Err(ConfigError::EmptyStackName);
        }
        // the stack name becomes a directory name
        if !self
            .stack_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::InvalidStackName(self.stack_name.clone()));
        }
        if self.region.is_empty() {
            return Err(ConfigError::EmptyRegion);
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(self.retry.max_attempts));
        }
        if self.retry.max_delay_secs < self.retry.base_delay_secs {
            return Err(ConfigError::InvalidDelays {
                base: self.retry.base_delay_secs,
                max: self.retry.max_delay_secs,
            });
        }
        if self.command_timeout_secs == 0 {
            return Err(ConfigError::InvalidCommandTimeout);
        }
        Ok(())
    }

    pub fn identity(&self) -> StackIdentity {
        StackIdentity::new(&self.stack_name, &self.region, &self.environment)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// Configured state file, or the per-stack default
    pub fn state_file(&self) -> anyhow::Result<PathBuf> {
        match &self.state_path {
            Some(path) => Ok(path.clone()),
            None => default_state_path(&self.stack_name),
        }
    }

    /// Configured error log, or the per-stack default
    pub fn error_log_file(&self) -> anyhow::Result<PathBuf> {
        match &self.error_log_path {
            Some(path) => Ok(path.clone()),
            None => default_error_log_path(&self.stack_name),
        }
    }
}
