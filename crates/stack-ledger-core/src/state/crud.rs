//! Mutations on the store document
//!
//! These only touch the in-memory document; [`super::StateStore::apply`]
//! decides when the result reaches disk.

use stack_ledger_common::ResourceStatus;

use super::types::{StoreDocument, StoredResource};

impl StoreDocument {
    /// Insert or replace a resource under its type bucket
    ///
    /// An entry with the same id in any bucket is replaced. When the type is
    /// unchanged the entry keeps its position in the bucket.
    pub fn upsert_resource(&mut self, resource_type: &str, entry: StoredResource) {
        if let Some(bucket) = self.resources.get_mut(resource_type) {
            if let Some(slot) = bucket.iter_mut().find(|r| r.id == entry.id) {
                *slot = entry;
                return;
            }
        }

        self.remove_resource(&entry.id);
        self.resources
            .entry(resource_type.to_string())
            .or_default()
            .push(entry);
    }

    /// Remove a resource from every bucket, dropping buckets left empty
    ///
    /// Returns true if anything was removed.
    pub fn remove_resource(&mut self, id: &str) -> bool {
        let mut removed = false;
        for bucket in self.resources.values_mut() {
            let before = bucket.len();
            bucket.retain(|r| r.id != id);
            removed |= bucket.len() != before;
        }
        self.resources.retain(|_, bucket| !bucket.is_empty());
        removed
    }

    /// Record a status change; returns false if the id is not stored
    pub fn set_status(&mut self, id: &str, status: ResourceStatus) -> bool {
        match self.find_mut(id) {
            Some(entry) => {
                entry.status = Some(status);
                true
            }
            None => false,
        }
    }

    /// Drop `dependency` from the dependency set of `id`
    pub fn remove_dependency(&mut self, id: &str, dependency: &str) -> bool {
        self.find_mut(id)
            .map(|entry| entry.dependencies.remove(dependency))
            .unwrap_or(false)
    }

    /// Look up a stored entry by id
    pub fn find(&self, id: &str) -> Option<(&str, &StoredResource)> {
        self.resources.iter().find_map(|(resource_type, bucket)| {
            bucket
                .iter()
                .find(|r| r.id == id)
                .map(|r| (resource_type.as_str(), r))
        })
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut StoredResource> {
        self.resources
            .values_mut()
            .flat_map(|bucket| bucket.iter_mut())
            .find(|r| r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(id: &str) -> StoredResource {
        StoredResource {
            id: id.to_string(),
            created_at: Utc::now(),
            metadata: serde_json::json!({}),
            status: None,
            dependencies: Default::default(),
            tags: Default::default(),
            cleanup_command: None,
        }
    }

    #[test]
    fn test_upsert_appends_under_type() {
        let mut doc = StoreDocument::new("demo", "us-east-1");
        doc.upsert_resource("instance", entry("i-1"));
        doc.upsert_resource("instance", entry("i-2"));
        doc.upsert_resource("volume", entry("v-1"));

        assert_eq!(doc.resources["instance"].len(), 2);
        assert_eq!(doc.resources["volume"][0].id, "v-1");
        assert_eq!(doc.resource_count(), 3);
    }

    #[test]
    fn test_upsert_same_id_replaces_in_place() {
        let mut doc = StoreDocument::new("demo", "us-east-1");
        doc.upsert_resource("instance", entry("i-1"));
        doc.upsert_resource("instance", entry("i-2"));

        let mut replacement = entry("i-1");
        replacement.metadata = serde_json::json!({"size": "large"});
        doc.upsert_resource("instance", replacement);

        let bucket = &doc.resources["instance"];
        assert_eq!(bucket.len(), 2);
        assert_eq!(bucket[0].id, "i-1");
        assert_eq!(bucket[0].metadata["size"], "large");
    }

    #[test]
    fn test_upsert_moves_between_types() {
        let mut doc = StoreDocument::new("demo", "us-east-1");
        doc.upsert_resource("instance", entry("x-1"));
        doc.upsert_resource("volume", entry("x-1"));

        assert!(!doc.resources.contains_key("instance"));
        assert_eq!(doc.find("x-1").map(|(t, _)| t), Some("volume"));
    }

    #[test]
    fn test_remove_and_status() {
        let mut doc = StoreDocument::new("demo", "us-east-1");
        let mut volume = entry("v-1");
        volume.dependencies.insert("i-1".to_string());
        doc.upsert_resource("instance", entry("i-1"));
        doc.upsert_resource("volume", volume);

        assert!(doc.set_status("v-1", ResourceStatus::Created));
        assert!(!doc.set_status("missing", ResourceStatus::Created));
        assert!(doc.remove_dependency("v-1", "i-1"));
        assert!(doc.remove_resource("i-1"));
        assert!(!doc.remove_resource("i-1"));

        let (_, stored) = doc.find("v-1").unwrap();
        assert_eq!(stored.status, Some(ResourceStatus::Created));
        assert!(stored.dependencies.is_empty());
        assert!(!doc.resources.contains_key("instance"));
    }
}
