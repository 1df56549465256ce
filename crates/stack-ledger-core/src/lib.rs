//! stack-ledger - resource lifecycle registry and error recovery engine
//!
//! Tracks the cloud resources a stack provisions, persists them to a JSON
//! state file, and tears them down in a safe order when a deployment fails.
//! Failures are classified into a banded error taxonomy that decides whether
//! to retry, fall back, skip, or roll back.

pub mod cleanup_script;
pub mod command;
pub mod config;
pub mod error;
pub mod recovery;
pub mod registry;
pub mod report;
pub mod retry;
pub mod rollback;
pub mod session;
pub mod state;
pub mod teardown;

pub use error::{DeploymentError, ErrorCode, ErrorState};
pub use registry::{Registration, RegistryError, ResourceRegistry};
