//! Unique names for test stacks and resources

use chrono::Utc;
use stack_ledger_common::StackIdentity;
use stack_ledger_common::defaults::DEFAULT_REGION;
use uuid::Uuid;

/// Generate a unique stack name for a test.
///
/// Format: `test-{timestamp_ms}-{counter}`. The counter keeps names distinct
/// when tests start in the same millisecond.
///
/// # Example
///
/// ```
/// use stack_ledger_test_utils::ids::test_stack_name;
///
/// let name = test_stack_name();
/// assert!(name.starts_with("test-"));
/// ```
pub fn test_stack_name() -> String {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let ts = Utc::now().timestamp_millis();
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("test-{}-{}", ts, counter)
}

/// Provider-style resource id, e.g. `i-0190f...`
pub fn test_resource_id(prefix: &str) -> String {
    let simple = Uuid::now_v7().simple().to_string();
    format!("{prefix}-{}", &simple[simple.len() - 12..])
}

/// Identity for a fresh test stack in the default region
pub fn test_identity() -> StackIdentity {
    StackIdentity::new(test_stack_name(), DEFAULT_REGION, "test")
}
