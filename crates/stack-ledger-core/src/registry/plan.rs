//! Teardown ordering

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use stack_ledger_common::cleanup_priority_for;
use tracing::{debug, warn};

use super::ResourceRegistry;

impl ResourceRegistry {
    /// Type names in static cleanup order, unknown types last
    pub fn types_in_cleanup_order(&self) -> Vec<&str> {
        let mut types = self.types();
        types.sort_by_key(|t| (cleanup_priority_for(t), *t));
        types
    }

    /// Every registered id in static type-priority order
    ///
    /// Ephemeral compute goes first, then storage, load balancing, network
    /// and identity. Within a type, ids keep registration order.
    pub fn generate_cleanup_plan(&self) -> Vec<String> {
        let plan: Vec<String> = self
            .types_in_cleanup_order()
            .into_iter()
            .flat_map(|t| self.by_type.get(t).into_iter().flatten().cloned())
            .collect();

        debug!(resources = plan.len(), "Generated cleanup plan");
        plan
    }

    /// Every registered id, dependents before the resources they depend on
    ///
    /// Each prefix of the plan can be unregistered without `force`. Among
    /// resources that are free to go, static priority decides, then type
    /// name, then id. Anything caught in a cycle is appended in static
    /// order.
    pub fn generate_topological_plan(&self) -> Vec<String> {
        let mut remaining: HashMap<&str, usize> = self
            .by_id
            .keys()
            .map(|id| (id.as_str(), self.graph.dependent_count(id)))
            .collect();

        let mut ready: BinaryHeap<Reverse<(u8, &str, &str)>> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .filter_map(|(id, _)| self.plan_key(id))
            .map(Reverse)
            .collect();

        let mut plan = Vec::with_capacity(self.by_id.len());
        while let Some(Reverse((_, _, id))) = ready.pop() {
            remaining.remove(id);
            plan.push(id.to_string());

            let Some(resource) = self.by_id.get(id) else {
                continue;
            };
            for dependency in &resource.dependencies {
                if let Some(count) = remaining.get_mut(dependency.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        if let Some(key) = self.plan_key(dependency) {
                            ready.push(Reverse(key));
                        }
                    }
                }
            }
        }

        if !remaining.is_empty() {
            let mut stuck: Vec<(u8, &str, &str)> = remaining
                .keys()
                .filter_map(|id| self.plan_key(id))
                .collect();
            stuck.sort_unstable();
            warn!(
                resources = ?stuck.iter().map(|(_, _, id)| *id).collect::<Vec<_>>(),
                "Dependency cycle detected, appending in static order"
            );
            plan.extend(stuck.into_iter().map(|(_, _, id)| id.to_string()));
        }

        debug!(resources = plan.len(), "Generated topological cleanup plan");
        plan
    }

    fn plan_key<'a>(&'a self, id: &str) -> Option<(u8, &'a str, &'a str)> {
        self.by_id
            .get(id)
            .map(|r| (r.cleanup_priority(), r.resource_type.as_str(), r.id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use crate::registry::{Registration, ResourceRegistry};
    use stack_ledger_common::ResourceKind;

    fn position(plan: &[String], id: &str) -> usize {
        plan.iter().position(|p| p == id).unwrap()
    }

    #[test]
    fn test_cleanup_plan_follows_static_order() {
        let mut reg = ResourceRegistry::in_memory("demo", "us-east-1");
        reg.register(Registration::new("vpc", "vpc-1")).unwrap();
        reg.register(Registration::new("dns_record", "rec-1")).unwrap();
        reg.register(Registration::new("security_group", "sg-1")).unwrap();
        reg.register(Registration::new("instance", "i-2")).unwrap();
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.register(Registration::new("volume", "v-1")).unwrap();
        reg.register(Registration::new("spot_request", "sir-1")).unwrap();

        assert_eq!(
            reg.generate_cleanup_plan(),
            ["sir-1", "i-2", "i-1", "v-1", "sg-1", "vpc-1", "rec-1"]
        );
    }

    #[test]
    fn test_cleanup_plan_never_inverts_known_pairs() {
        let kinds = ResourceKind::cleanup_order();
        let mut reg = ResourceRegistry::in_memory("demo", "us-east-1");
        for kind in kinds.iter().rev() {
            reg.register(Registration::new(kind.as_str(), format!("{kind}-id")))
                .unwrap();
        }

        let plan = reg.generate_cleanup_plan();
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                if a.cleanup_priority() < b.cleanup_priority() {
                    assert!(
                        position(&plan, &format!("{a}-id")) < position(&plan, &format!("{b}-id")),
                        "{a} should be cleaned before {b}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_topological_plan_puts_dependents_first() {
        let mut reg = ResourceRegistry::in_memory("demo", "us-east-1");
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.register(Registration::new("volume", "v-1").depends_on("i-1"))
            .unwrap();
        reg.register(Registration::new("vpc", "vpc-1")).unwrap();
        reg.register(Registration::new("subnet", "sub-1").depends_on("vpc-1"))
            .unwrap();
        reg.register(Registration::new("security_group", "sg-1").depends_on("vpc-1"))
            .unwrap();

        let plan = reg.generate_topological_plan();
        assert_eq!(plan, ["v-1", "i-1", "sg-1", "sub-1", "vpc-1"]);

        for id in plan {
            reg.unregister(&id, false).unwrap();
        }
        assert!(reg.is_empty());
    }

    #[test]
    fn test_topological_plan_without_edges_matches_static() {
        let mut reg = ResourceRegistry::in_memory("demo", "us-east-1");
        reg.register(Registration::new("iam_role", "role-1")).unwrap();
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.register(Registration::new("load_balancer", "lb-1")).unwrap();

        assert_eq!(reg.generate_topological_plan(), reg.generate_cleanup_plan());
    }

    #[test]
    fn test_topological_plan_survives_cycles() {
        let mut reg = ResourceRegistry::in_memory("demo", "us-east-1");
        reg.register(Registration::new("instance", "a")).unwrap();
        reg.register(Registration::new("instance", "b").depends_on("a"))
            .unwrap();
        // re-register a so it depends on b, closing the loop
        reg.register(Registration::new("instance", "a").depends_on("b"))
            .unwrap();
        reg.register(Registration::new("vpc", "vpc-1")).unwrap();

        let plan = reg.generate_topological_plan();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan[0], "vpc-1");
    }
}
