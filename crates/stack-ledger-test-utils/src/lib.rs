//! Shared test utilities for stack-ledger
//!
//! Fixtures that only need the common crate live here so any crate can use
//! them as a dev-dependency. Fakes for core traits live next to the core
//! integration tests.
//!
//! ## Modules
//!
//! - [`ids`]: Unique stack names and resource ids
//! - [`workspace`]: Temporary directories for state files and error logs

pub mod ids;
pub mod workspace;

// Re-export commonly used items
pub use ids::{test_identity, test_resource_id, test_stack_name};
pub use workspace::TestWorkspace;
