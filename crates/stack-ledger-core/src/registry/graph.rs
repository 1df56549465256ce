//! Reverse dependency index
//!
//! Forward edges live on each [`super::Resource`] as its `dependencies`
//! set. This keeps the inverse, `dependency -> dependents`, so removal
//! checks and teardown ordering don't have to scan every resource.

use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    dependents: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `dependent` depends on each of `dependencies`
    pub fn link<'a>(&mut self, dependent: &str, dependencies: impl IntoIterator<Item = &'a String>) {
        for dependency in dependencies {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(dependent.to_string());
        }
    }

    /// Forget that `dependent` depends on each of `dependencies`
    pub fn unlink<'a>(
        &mut self,
        dependent: &str,
        dependencies: impl IntoIterator<Item = &'a String>,
    ) {
        for dependency in dependencies {
            if let Some(set) = self.dependents.get_mut(dependency.as_str()) {
                set.remove(dependent);
                if set.is_empty() {
                    self.dependents.remove(dependency.as_str());
                }
            }
        }
    }

    /// Drop every edge pointing at `id`, returning who depended on it
    pub fn detach(&mut self, id: &str) -> BTreeSet<String> {
        self.dependents.remove(id).unwrap_or_default()
    }

    /// Resources that depend on `id`, sorted
    pub fn dependents_of(&self, id: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(id)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    pub fn dependent_count(&self, id: &str) -> usize {
        self.dependents.get(id).map_or(0, BTreeSet::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_link_and_unlink() {
        let mut graph = DependencyGraph::new();
        graph.link("v-1", &deps(&["i-1"]));
        graph.link("v-2", &deps(&["i-1", "sg-1"]));

        assert_eq!(graph.dependents_of("i-1").collect::<Vec<_>>(), ["v-1", "v-2"]);
        assert_eq!(graph.dependent_count("sg-1"), 1);

        graph.unlink("v-2", &deps(&["i-1", "sg-1"]));
        assert_eq!(graph.dependents_of("i-1").collect::<Vec<_>>(), ["v-1"]);
        assert_eq!(graph.dependent_count("sg-1"), 0);
    }

    #[test]
    fn test_detach_returns_dependents() {
        let mut graph = DependencyGraph::new();
        graph.link("v-1", &deps(&["i-1"]));

        let detached = graph.detach("i-1");
        assert!(detached.contains("v-1"));
        assert_eq!(graph.dependent_count("i-1"), 0);
        assert!(graph.detach("i-1").is_empty());
    }
}
