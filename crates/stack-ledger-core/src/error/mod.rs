//! Error classification and the error engine
//!
//! Every failure the core reports is an [`ErrorCode`] from a banded code
//! space. The band decides the [`ErrorCategory`]; lookup tables give the
//! default message, [`Severity`] and [`RecoveryStrategy`]. [`ErrorState`]
//! turns a code into a counted, logged [`DeploymentError`] attributed to the
//! operation on top of its context stack.

mod codes;
mod engine;
mod record;
mod taxonomy;

pub use codes::{ErrorCode, known_codes};
pub use engine::{ContextGuard, ErrorState, ROOT_CONTEXT, ThrowSpec};
pub use record::{DeploymentError, ErrorLog, ErrorRecord};
pub use taxonomy::{ErrorCategory, RecoveryStrategy, Severity, category_of};

use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::state::StoreError;

impl From<&StoreError> for ThrowSpec {
    fn from(err: &StoreError) -> Self {
        ThrowSpec::new(ErrorCode::STATE_STORE_FAILED).message(err.to_string())
    }
}

impl From<&RegistryError> for ThrowSpec {
    fn from(err: &RegistryError) -> Self {
        ThrowSpec::new(err.error_code()).message(err.to_string())
    }
}

impl From<&ConfigError> for ThrowSpec {
    fn from(err: &ConfigError) -> Self {
        ThrowSpec::new(err.error_code()).message(err.to_string())
    }
}
