//! Resource lifecycle status and its transition table
//!
//! The table is advisory in the default registry policy: an invalid move is
//! reported but still applied. Callers that want enforcement check
//! [`ResourceStatus::can_transition_to`] before moving.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a tracked resource
///
/// String forms are stable; they are persisted in the state store.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResourceStatus {
    /// Requested, nothing created yet
    Pending,
    /// Provider call in flight
    #[default]
    Creating,
    /// Exists and is usable
    Created,
    /// Being modified in place
    Updating,
    /// Teardown in flight
    Deleting,
    /// Gone
    Deleted,
    /// Last operation on the resource failed
    Failed,
}

impl ResourceStatus {
    /// Statuses reachable from this one
    pub fn allowed_transitions(self) -> &'static [ResourceStatus] {
        use ResourceStatus::*;

        match self {
            Pending => &[Creating, Failed],
            Creating => &[Created, Failed],
            Created => &[Updating, Deleting, Failed],
            Updating => &[Created, Failed],
            Deleting => &[Deleted, Failed],
            Failed => &[Creating, Deleting],
            Deleted => &[Deleted],
        }
    }

    /// Check whether moving to `next` is allowed by the transition table
    pub fn can_transition_to(self, next: ResourceStatus) -> bool {
        self.allowed_transitions().contains(&next)
    }

    /// Check if the status is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Deleted)
    }

    /// Check if the resource still exists at the provider (or might)
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Deleted)
    }

    /// Position in the lifecycle, used for status sorting
    pub fn lifecycle_rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Creating => 1,
            Self::Created => 2,
            Self::Updating => 3,
            Self::Deleting => 4,
            Self::Deleted => 5,
            Self::Failed => 6,
        }
    }

    /// Parse from string, returning None for unknown values
    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_happy_path_transitions() {
        use ResourceStatus::*;

        assert!(Pending.can_transition_to(Creating));
        assert!(Creating.can_transition_to(Created));
        assert!(Created.can_transition_to(Updating));
        assert!(Updating.can_transition_to(Created));
        assert!(Created.can_transition_to(Deleting));
        assert!(Deleting.can_transition_to(Deleted));
    }

    #[test]
    fn test_failed_can_be_retried_or_torn_down() {
        use ResourceStatus::*;

        assert!(Failed.can_transition_to(Creating));
        assert!(Failed.can_transition_to(Deleting));
        assert!(!Failed.can_transition_to(Created));
    }

    #[test]
    fn test_deleted_only_moves_to_itself() {
        for status in ResourceStatus::iter() {
            let allowed = ResourceStatus::Deleted.can_transition_to(status);
            assert_eq!(allowed, status == ResourceStatus::Deleted, "{status}");
        }
        assert!(ResourceStatus::Deleted.is_terminal());
    }

    #[test]
    fn test_every_live_status_can_fail() {
        for status in ResourceStatus::iter() {
            if matches!(status, ResourceStatus::Deleted | ResourceStatus::Failed) {
                continue;
            }
            assert!(status.can_transition_to(ResourceStatus::Failed), "{status}");
        }
    }

    #[test]
    fn test_string_forms() {
        assert_eq!(ResourceStatus::Creating.to_string(), "creating");
        assert_eq!(ResourceStatus::parse("DELETED"), Some(ResourceStatus::Deleted));
        assert_eq!(ResourceStatus::parse("gone"), None);
        assert_eq!(
            serde_json::to_string(&ResourceStatus::Updating).unwrap(),
            "\"updating\""
        );
    }
}
