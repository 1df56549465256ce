//! Temporary on-disk locations for stores, logs and scripts

use std::path::{Path, PathBuf};

use stack_ledger_common::StackIdentity;
use stack_ledger_common::defaults::{ERROR_LOG_FILE_NAME, STATE_FILE_NAME};
use tempfile::TempDir;

use crate::ids::test_identity;

/// A temp directory plus a unique stack identity
///
/// Everything under [`Self::root`] is removed when the workspace drops.
pub struct TestWorkspace {
    dir: TempDir,
    pub identity: StackIdentity,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            identity: test_identity(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join(STATE_FILE_NAME)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.dir.path().join(ERROR_LOG_FILE_NAME)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn stack_name(&self) -> &str {
        &self.identity.stack_name
    }

    pub fn region(&self) -> &str {
        &self.identity.region
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}
