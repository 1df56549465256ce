//! Provisioned resource kinds and static cleanup ordering
//!
//! Resource types are free-form strings in the registry. The kinds listed
//! here are the ones the teardown ordering knows about; any other type sorts
//! after all of them.

/// Kinds of infrastructure resources with a known teardown position
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ResourceKind {
    /// Spot instance request (cancel before the instance it spawned)
    SpotRequest,
    /// Compute instance (on-demand or spot)
    Instance,
    /// Block storage volume
    Volume,
    /// Filesystem mount target (must go before its filesystem)
    MountTarget,
    /// Shared filesystem
    #[strum(to_string = "filesystem", serialize = "file_system")]
    Filesystem,
    /// Load balancer
    LoadBalancer,
    /// Load balancer target group
    TargetGroup,
    /// Security group (depends on instances and load balancers being gone)
    SecurityGroup,
    /// Subnet
    Subnet,
    /// Virtual private network
    Vpc,
    /// SSH key pair
    KeyPair,
    /// Instance profile
    InstanceProfile,
    /// IAM role (instance profiles reference it)
    IamRole,
}

/// Priority assigned to resource types that no [`ResourceKind`] matches
pub const UNKNOWN_PRIORITY: u8 = u8::MAX;

impl ResourceKind {
    /// Get cleanup priority (lower number = cleanup first)
    ///
    /// Tiers, in teardown order:
    /// - 0-1: ephemeral compute (spot requests, instances)
    /// - 2-4: persistent storage (volumes, mount targets, filesystems)
    /// - 5-6: load balancing
    /// - 7-9: network security and foundation (security groups, subnets, VPC)
    /// - 10-11: identity (key pairs, instance profiles, roles)
    pub fn cleanup_priority(self) -> u8 {
        match self {
            ResourceKind::SpotRequest => 0,
            ResourceKind::Instance => 1,
            ResourceKind::Volume => 2,
            ResourceKind::MountTarget => 3,
            ResourceKind::Filesystem => 4,
            ResourceKind::LoadBalancer => 5,
            ResourceKind::TargetGroup => 6,
            ResourceKind::SecurityGroup => 7,
            ResourceKind::Subnet => 8,
            ResourceKind::Vpc => 9,
            ResourceKind::KeyPair => 10,
            ResourceKind::InstanceProfile => 10,
            ResourceKind::IamRole => 11,
        }
    }

    /// Canonical string form used as the registry type name
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Parse from a registry type name, returning None for unknown types
    pub fn parse(s: &str) -> Option<Self> {
        s.parse().ok()
    }

    /// All known kinds in teardown order
    pub fn cleanup_order() -> Vec<ResourceKind> {
        use strum::IntoEnumIterator;

        let mut kinds: Vec<_> = ResourceKind::iter().collect();
        kinds.sort_by_key(|k| k.cleanup_priority());
        kinds
    }
}

/// Cleanup priority for an arbitrary registry type name
pub fn cleanup_priority_for(type_name: &str) -> u8 {
    ResourceKind::parse(type_name)
        .map(ResourceKind::cleanup_priority)
        .unwrap_or(UNKNOWN_PRIORITY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instances_before_security_groups() {
        assert!(
            ResourceKind::Instance.cleanup_priority()
                < ResourceKind::SecurityGroup.cleanup_priority(),
            "Instances must be cleaned before security groups"
        );
    }

    #[test]
    fn test_tiers_follow_teardown_order() {
        let ephemeral = ResourceKind::Instance.cleanup_priority();
        let storage = ResourceKind::Volume.cleanup_priority();
        let balancing = ResourceKind::LoadBalancer.cleanup_priority();
        let security = ResourceKind::SecurityGroup.cleanup_priority();
        let identity = ResourceKind::IamRole.cleanup_priority();

        assert!(ResourceKind::SpotRequest.cleanup_priority() < ephemeral);
        assert!(ephemeral < storage);
        assert!(storage < balancing);
        assert!(balancing < security);
        assert!(security < identity);
    }

    #[test]
    fn test_mount_targets_before_filesystem() {
        assert!(
            ResourceKind::MountTarget.cleanup_priority()
                < ResourceKind::Filesystem.cleanup_priority()
        );
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(ResourceKind::parse("instance"), Some(ResourceKind::Instance));
        assert_eq!(
            ResourceKind::parse("load_balancer"),
            Some(ResourceKind::LoadBalancer)
        );
        assert_eq!(
            ResourceKind::parse("file_system"),
            Some(ResourceKind::Filesystem)
        );
        assert_eq!(ResourceKind::parse("Volume"), Some(ResourceKind::Volume));
        assert_eq!(ResourceKind::parse("dns_record"), None);
        assert_eq!(ResourceKind::SpotRequest.as_str(), "spot_request");
    }

    #[test]
    fn test_unknown_types_sort_last() {
        assert_eq!(cleanup_priority_for("dns_record"), UNKNOWN_PRIORITY);
        assert!(cleanup_priority_for("iam_role") < cleanup_priority_for("dns_record"));
    }

    #[test]
    fn test_cleanup_order_is_sorted() {
        let order = ResourceKind::cleanup_order();
        assert_eq!(order.first(), Some(&ResourceKind::SpotRequest));
        assert_eq!(order.last(), Some(&ResourceKind::IamRole));
        assert!(
            order
                .windows(2)
                .all(|w| w[0].cleanup_priority() <= w[1].cleanup_priority())
        );
    }
}
