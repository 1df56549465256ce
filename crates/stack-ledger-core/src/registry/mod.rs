//! Resource lifecycle registry
//!
//! Tracks every provisioned resource with its status and dependencies, and
//! computes a safe teardown order. The registry is an explicit object owned
//! by the driver. Each mutation is persisted to the [`StateStore`] first and
//! only applied in memory once the write succeeded.
//!
//! Dependency validation is soft: an id that is not registered is dropped
//! from the dependency list with a warning and the registration proceeds.

mod graph;
mod plan;
mod types;

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use stack_ledger_common::ResourceStatus;
use tracing::{debug, info, warn};

pub use graph::DependencyGraph;
pub use types::{Registration, RegistryError, Resource, SortBy, TransitionPolicy};

use crate::state::StateStore;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug)]
pub struct ResourceRegistry {
    by_id: HashMap<String, Resource>,
    /// Ids per type, in registration order
    by_type: HashMap<String, Vec<String>>,
    graph: DependencyGraph,
    store: StateStore,
    policy: TransitionPolicy,
}

impl ResourceRegistry {
    /// Empty registry writing through to `store`
    ///
    /// Anything already in the store is ignored; use [`Self::recover`] to
    /// pick up a previous session.
    pub fn new(store: StateStore, policy: TransitionPolicy) -> Self {
        Self {
            by_id: HashMap::new(),
            by_type: HashMap::new(),
            graph: DependencyGraph::new(),
            store,
            policy,
        }
    }

    /// Registry with an in-memory store and the lenient policy
    pub fn in_memory(stack_name: &str, region: &str) -> Self {
        Self::new(
            StateStore::in_memory(stack_name, region),
            TransitionPolicy::default(),
        )
    }

    /// Rebuild the registry from a persisted store
    ///
    /// Entries written without a status are taken to be `created`. Edges to
    /// ids missing from the store are dropped, in memory and on disk.
    pub fn recover(store: StateStore, policy: TransitionPolicy) -> Result<Self> {
        let mut registry = Self::new(store, policy);

        let known: BTreeSet<String> = registry
            .store
            .document()
            .resources
            .values()
            .flatten()
            .map(|entry| entry.id.clone())
            .collect();

        let mut dangling = Vec::new();
        for (resource_type, bucket) in &registry.store.document().resources {
            for entry in bucket {
                let mut dependencies = entry.dependencies.clone();
                dependencies.retain(|dep| {
                    let keep = known.contains(dep) && dep != &entry.id;
                    if !keep {
                        warn!(
                            resource_id = %entry.id,
                            dependency = %dep,
                            "Dropping dependency on unknown resource"
                        );
                        dangling.push((entry.id.clone(), dep.clone()));
                    }
                    keep
                });

                let resource = Resource {
                    id: entry.id.clone(),
                    resource_type: resource_type.clone(),
                    metadata: entry.metadata.clone(),
                    status: entry.status.unwrap_or(ResourceStatus::Created),
                    dependencies,
                    cleanup_command: entry.cleanup_command.clone(),
                    tags: entry.tags.clone(),
                    created_at: entry.created_at,
                };

                registry.graph.link(&resource.id, &resource.dependencies);
                registry
                    .by_type
                    .entry(resource_type.clone())
                    .or_default()
                    .push(resource.id.clone());
                registry.by_id.insert(resource.id.clone(), resource);
            }
        }

        if !dangling.is_empty() {
            registry.store.apply(|doc| {
                for (id, dep) in &dangling {
                    doc.remove_dependency(id, dep);
                }
            })?;
        }

        info!(
            resources = registry.by_id.len(),
            types = registry.by_type.len(),
            "Recovered registry from state"
        );
        Ok(registry)
    }

    pub fn policy(&self) -> TransitionPolicy {
        self.policy
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Register a resource, or overwrite the one with the same id
    pub fn register(&mut self, registration: Registration) -> Result<()> {
        let Registration {
            resource_type,
            id,
            metadata,
            cleanup_command,
            dependencies: requested,
            tags,
        } = registration;

        let mut dependencies = BTreeSet::new();
        for dep in requested {
            if dep == id {
                warn!(resource_id = %id, "Ignoring self-dependency");
            } else if !self.by_id.contains_key(&dep) {
                warn!(
                    resource_id = %id,
                    dependency = %dep,
                    "Dependency is not registered, dropping it"
                );
            } else {
                dependencies.insert(dep);
            }
        }

        let resource = Resource {
            id: id.clone(),
            resource_type: resource_type.clone(),
            metadata,
            status: ResourceStatus::Creating,
            dependencies,
            cleanup_command,
            tags,
            created_at: Utc::now(),
        };

        let stored = resource.to_stored();
        self.store
            .apply(|doc| doc.upsert_resource(&resource_type, stored))?;

        if let Some(previous) = self.by_id.remove(&id) {
            warn!(
                resource_id = %id,
                previous_type = %previous.resource_type,
                "Resource already registered, overwriting"
            );
            self.graph.unlink(&id, &previous.dependencies);
            if previous.resource_type != resource_type {
                self.remove_from_bucket(&previous.resource_type, &id);
            }
        }

        self.graph.link(&id, &resource.dependencies);
        let bucket = self.by_type.entry(resource_type.clone()).or_default();
        if !bucket.contains(&id) {
            bucket.push(id.clone());
        }

        info!(
            resource_type = %resource_type,
            resource_id = %id,
            dependencies = resource.dependencies.len(),
            "Registered resource"
        );
        self.by_id.insert(id, resource);
        Ok(())
    }

    /// Move a resource to `status`
    ///
    /// Transitions outside the table are applied with a warning under the
    /// lenient policy and rejected under the strict one.
    pub fn update_status(
        &mut self,
        id: &str,
        status: ResourceStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let current = self
            .by_id
            .get(id)
            .map(|r| r.status)
            .ok_or_else(|| RegistryError::NotRegistered(id.to_string()))?;

        if !current.can_transition_to(status) {
            match self.policy {
                TransitionPolicy::Strict => {
                    return Err(RegistryError::InvalidTransition {
                        id: id.to_string(),
                        from: current,
                        to: status,
                    });
                }
                TransitionPolicy::Lenient => warn!(
                    resource_id = %id,
                    from = %current,
                    to = %status,
                    "Invalid status transition, applying anyway"
                ),
            }
        }

        self.store.apply(|doc| doc.set_status(id, status))?;

        if let Some(resource) = self.by_id.get_mut(id) {
            resource.status = status;
        }

        info!(
            resource_id = %id,
            from = %current,
            to = %status,
            reason = reason.unwrap_or(""),
            "Status updated"
        );
        Ok(())
    }

    /// Remove a resource
    ///
    /// Refused while other live resources depend on it, unless `force` is
    /// set. Removal also strips the id from every dependent's dependencies.
    pub fn unregister(&mut self, id: &str, force: bool) -> Result<()> {
        let resource = self
            .by_id
            .get(id)
            .ok_or_else(|| RegistryError::NotRegistered(id.to_string()))?;

        let blockers = self.live_dependents(id);
        if !blockers.is_empty() {
            if !force {
                return Err(RegistryError::DependencyConflict {
                    id: id.to_string(),
                    blockers,
                });
            }
            warn!(resource_id = %id, blockers = ?blockers, "Force-removing resource with live dependents");
        }

        let resource_type = resource.resource_type.clone();
        let dependents: Vec<String> = self.graph.dependents_of(id).map(str::to_string).collect();

        self.store.apply(|doc| {
            doc.remove_resource(id);
            for dependent in &dependents {
                doc.remove_dependency(dependent, id);
            }
        })?;

        if let Some(resource) = self.by_id.remove(id) {
            self.graph.unlink(id, &resource.dependencies);
        }
        for dependent in self.graph.detach(id) {
            if let Some(resource) = self.by_id.get_mut(&dependent) {
                resource.dependencies.remove(id);
            }
        }
        self.remove_from_bucket(&resource_type, id);

        info!(resource_type = %resource_type, resource_id = %id, "Unregistered resource");
        Ok(())
    }

    /// Ids of one type, optionally filtered by status, sorted and truncated
    pub fn query(
        &self,
        resource_type: &str,
        status: Option<ResourceStatus>,
        sort_by: SortBy,
        limit: Option<usize>,
    ) -> Result<Vec<String>> {
        let bucket = self
            .by_type
            .get(resource_type)
            .filter(|bucket| !bucket.is_empty())
            .ok_or_else(|| RegistryError::TypeNotFound(resource_type.to_string()))?;

        let mut matches: Vec<&Resource> = bucket
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .filter(|r| status.is_none_or(|s| r.status == s))
            .collect();

        match sort_by {
            // stable, so equal timestamps keep registration order
            SortBy::Timestamp => matches.sort_by_key(|r| r.created_at),
            SortBy::Id => matches.sort_by(|a, b| a.id.cmp(&b.id)),
            SortBy::Status => matches.sort_by(|a, b| {
                a.status
                    .lifecycle_rank()
                    .cmp(&b.status.lifecycle_rank())
                    .then_with(|| a.id.cmp(&b.id))
            }),
        }

        let ids: Vec<String> = matches
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|r| r.id.clone())
            .collect();

        debug!(
            resource_type = %resource_type,
            status = ?status,
            sort_by = %sort_by,
            count = ids.len(),
            "Queried resources"
        );
        Ok(ids)
    }

    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Resources that depend on `id`, sorted
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.graph.dependents_of(id).collect()
    }

    /// Resources of one type in registration order
    pub fn resources_of_type(&self, resource_type: &str) -> Vec<&Resource> {
        self.by_type
            .get(resource_type)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id))
            .collect()
    }

    /// Every resource, grouped by type name then registration order
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.types()
            .into_iter()
            .flat_map(move |t| self.resources_of_type(t))
    }

    fn live_dependents(&self, id: &str) -> Vec<String> {
        self.graph
            .dependents_of(id)
            .filter(|dep| self.by_id.get(*dep).is_some_and(|r| r.status.is_live()))
            .map(str::to_string)
            .collect()
    }

    fn remove_from_bucket(&mut self, resource_type: &str, id: &str) {
        if let Some(bucket) = self.by_type.get_mut(resource_type) {
            bucket.retain(|existing| existing != id);
            if bucket.is_empty() {
                self.by_type.remove(resource_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CleanupCommand;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry() -> ResourceRegistry {
        ResourceRegistry::in_memory("demo", "us-east-1")
    }

    #[test]
    fn test_register_sets_creating() {
        let mut reg = registry();
        reg.register(Registration::new("instance", "i-1").metadata(json!({"type": "t3.micro"})))
            .unwrap();

        let resource = reg.get("i-1").unwrap();
        assert_eq!(resource.status, ResourceStatus::Creating);
        assert_eq!(resource.metadata["type"], "t3.micro");
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_register_twice_overwrites() {
        let mut reg = registry();
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.register(Registration::new("instance", "i-2")).unwrap();
        reg.register(Registration::new("instance", "i-1").metadata(json!({"v": 2})))
            .unwrap();

        let ids = reg.query("instance", None, SortBy::Id, None).unwrap();
        assert_eq!(ids, ["i-1", "i-2"]);
        assert_eq!(reg.get("i-1").unwrap().metadata["v"], 2);
        assert_eq!(reg.store().document().resources["instance"].len(), 2);
    }

    #[test]
    fn test_reregister_under_new_type_moves_bucket() {
        let mut reg = registry();
        reg.register(Registration::new("instance", "x-1")).unwrap();
        reg.register(Registration::new("volume", "x-1")).unwrap();

        assert_eq!(reg.types(), ["volume"]);
        assert!(matches!(
            reg.query("instance", None, SortBy::Id, None),
            Err(RegistryError::TypeNotFound(_))
        ));
    }

    #[test]
    fn test_reregister_replaces_edges() {
        let mut reg = registry();
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.register(Registration::new("instance", "i-2")).unwrap();
        reg.register(Registration::new("volume", "v-1").depends_on("i-1"))
            .unwrap();
        reg.register(Registration::new("volume", "v-1").depends_on("i-2"))
            .unwrap();

        assert!(reg.dependents_of("i-1").is_empty());
        assert_eq!(reg.dependents_of("i-2"), ["v-1"]);
    }

    #[test]
    fn test_unknown_dependencies_are_dropped() {
        let mut reg = registry();
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.register(
            Registration::new("volume", "v-1")
                .dependencies(["i-1", "i-missing", "v-1"]),
        )
        .unwrap();

        let deps: Vec<_> = reg.get("v-1").unwrap().dependencies.iter().cloned().collect();
        assert_eq!(deps, ["i-1"]);
    }

    #[test]
    fn test_update_status_unknown_id() {
        let mut reg = registry();
        let err = reg
            .update_status("nope", ResourceStatus::Created, None)
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotRegistered(id) if id == "nope"));
    }

    #[test]
    fn test_lenient_applies_invalid_transition() {
        let mut reg = registry();
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.update_status("i-1", ResourceStatus::Deleting, Some("skip ahead"))
            .unwrap();
        assert_eq!(reg.get("i-1").unwrap().status, ResourceStatus::Deleting);
    }

    #[test]
    fn test_strict_rejects_invalid_transition() {
        let mut reg = ResourceRegistry::new(
            StateStore::in_memory("demo", "us-east-1"),
            TransitionPolicy::Strict,
        );
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.update_status("i-1", ResourceStatus::Created, None).unwrap();

        let err = reg
            .update_status("i-1", ResourceStatus::Pending, None)
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::InvalidTransition {
                from: ResourceStatus::Created,
                to: ResourceStatus::Pending,
                ..
            }
        ));
        assert_eq!(reg.get("i-1").unwrap().status, ResourceStatus::Created);
    }

    #[test]
    fn test_deleted_dependents_do_not_block() {
        let mut reg = registry();
        reg.register(Registration::new("instance", "i-1")).unwrap();
        reg.register(Registration::new("volume", "v-1").depends_on("i-1"))
            .unwrap();
        reg.update_status("v-1", ResourceStatus::Failed, None).unwrap();
        reg.update_status("v-1", ResourceStatus::Deleting, None).unwrap();
        reg.update_status("v-1", ResourceStatus::Deleted, None).unwrap();

        reg.unregister("i-1", false).unwrap();
        assert!(reg.get("v-1").unwrap().dependencies.is_empty());
    }

    #[test]
    fn test_unregister_unknown() {
        let mut reg = registry();
        assert!(matches!(
            reg.unregister("ghost", true),
            Err(RegistryError::NotRegistered(_))
        ));
    }

    #[test]
    fn test_query_filters_sorts_and_limits() {
        let mut reg = registry();
        for id in ["i-c", "i-a", "i-b"] {
            reg.register(Registration::new("instance", id)).unwrap();
        }
        reg.update_status("i-c", ResourceStatus::Created, None).unwrap();
        reg.update_status("i-b", ResourceStatus::Failed, None).unwrap();

        assert_eq!(
            reg.query("instance", None, SortBy::Timestamp, None).unwrap(),
            ["i-c", "i-a", "i-b"]
        );
        assert_eq!(
            reg.query("instance", None, SortBy::Id, Some(2)).unwrap(),
            ["i-a", "i-b"]
        );
        assert_eq!(
            reg.query("instance", None, SortBy::Status, None).unwrap(),
            ["i-a", "i-c", "i-b"]
        );
        assert_eq!(
            reg.query("instance", Some(ResourceStatus::Created), SortBy::Id, None)
                .unwrap(),
            ["i-c"]
        );
        assert!(
            reg.query("instance", Some(ResourceStatus::Deleted), SortBy::Id, None)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_query_unknown_type() {
        let reg = registry();
        assert!(matches!(
            reg.query("vpc", None, SortBy::Id, None),
            Err(RegistryError::TypeNotFound(t)) if t == "vpc"
        ));
    }

    #[test]
    fn test_recover_round_trips_registry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        {
            let store = StateStore::open(&path, "demo", "us-east-1").unwrap();
            let mut reg = ResourceRegistry::new(store, TransitionPolicy::Lenient);
            reg.register(
                Registration::new("instance", "i-1")
                    .cleanup_command(CleanupCommand::shell("echo bye")),
            )
            .unwrap();
            reg.register(Registration::new("volume", "v-1").depends_on("i-1"))
                .unwrap();
            reg.update_status("i-1", ResourceStatus::Created, None).unwrap();
        }

        let store = StateStore::open(&path, "demo", "us-east-1").unwrap();
        let reg = ResourceRegistry::recover(store, TransitionPolicy::Lenient).unwrap();

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.get("i-1").unwrap().status, ResourceStatus::Created);
        assert_eq!(reg.get("v-1").unwrap().status, ResourceStatus::Creating);
        assert_eq!(reg.dependents_of("i-1"), ["v-1"]);
        assert!(reg.get("i-1").unwrap().cleanup_command.is_some());
    }

    #[test]
    fn test_recover_three_field_entries_and_dangling_edges() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{
                "stack_name": "legacy",
                "created_at": "2024-01-01T00:00:00Z",
                "region": "us-west-2",
                "resources": {
                    "instance": [{"id": "i-1", "created_at": "2024-01-01T00:00:00Z", "metadata": {}}],
                    "volume": [{"id": "v-1", "created_at": "2024-01-01T00:00:00Z", "metadata": {},
                                "dependencies": ["i-1", "i-gone"]}]
                }
            }"#,
        )
        .unwrap();

        let store = StateStore::open(&path, "demo", "us-east-1").unwrap();
        let reg = ResourceRegistry::recover(store, TransitionPolicy::Lenient).unwrap();

        assert_eq!(reg.get("i-1").unwrap().status, ResourceStatus::Created);
        let deps: Vec<_> = reg.get("v-1").unwrap().dependencies.iter().cloned().collect();
        assert_eq!(deps, ["i-1"]);

        let (_, stored) = reg.store().document().find("v-1").unwrap();
        assert!(!stored.dependencies.contains("i-gone"));
    }
}
