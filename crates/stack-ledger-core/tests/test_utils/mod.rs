//! Shared fixtures for integration tests
//!
//! Fakes for the core's injectable seams. Generic fixtures (temp
//! workspaces, unique ids) are in stack-ledger-test-utils.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashSet;
use std::time::Duration;

use stack_ledger::command::{CleanupCommand, CommandRunner};
use stack_ledger::registry::{Registration, ResourceRegistry, TransitionPolicy};
use stack_ledger::retry::Sleeper;
use stack_ledger::state::StateStore;
use stack_ledger_test_utils::TestWorkspace;

/// Records requested delays instead of sleeping
#[derive(Default)]
pub struct RecordingSleeper {
    delays: RefCell<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}

/// Succeeds for every command except those targeting a failing id
///
/// Commands built with [`cleanup_for`] carry the resource id as their last
/// argument, which is what gets recorded and matched.
#[derive(Default)]
pub struct ScriptedRunner {
    failing: HashSet<String>,
    ran: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ran: RefCell::default(),
        }
    }

    /// Targets in the order their commands ran
    pub fn ran(&self) -> Vec<String> {
        self.ran.borrow().clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &CleanupCommand) -> anyhow::Result<bool> {
        let target = command.args.last().cloned().unwrap_or_default();
        self.ran.borrow_mut().push(target.clone());
        Ok(!self.failing.contains(&target))
    }
}

/// Cleanup command whose last argument is the resource id
pub fn cleanup_for(id: &str) -> CleanupCommand {
    CleanupCommand::new("delete-resource", [id])
}

/// Registration with a cleanup command attached
pub fn tracked(resource_type: &str, id: &str) -> Registration {
    Registration::new(resource_type, id).cleanup_command(cleanup_for(id))
}

/// Registry backed by a state file in `ws`
pub fn file_registry(ws: &TestWorkspace, policy: TransitionPolicy) -> ResourceRegistry {
    let store = StateStore::open(ws.state_path(), ws.stack_name(), ws.region())
        .expect("Failed to open state store");
    ResourceRegistry::recover(store, policy).expect("Failed to recover registry")
}
