//! stack-ledger-common - Shared types and utilities
//!
//! Types shared by the core engine, the CLI and the test utilities. Nothing
//! in here touches the filesystem.
//!
//! ## Modules
//!
//! - [`defaults`]: Default configuration values
//! - [`resource_kind`]: Known resource kinds and static cleanup ordering
//! - [`status`]: Resource lifecycle status and transition table
//! - [`tags`]: Base tag set and caller tag merging

pub mod defaults;
pub mod resource_kind;
pub mod status;
pub mod tags;

// Re-export commonly used types
pub use resource_kind::{ResourceKind, cleanup_priority_for};
pub use status::ResourceStatus;
pub use tags::{StackIdentity, generate_tags};
