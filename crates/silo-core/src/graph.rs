//! The artifact-keyed dependency graph.
//!
//! Edges are computed pairwise from [`Artifact::depends_on`]; the scan is
//! O(N²) over the artifact count, dominated by normalized-text containment
//! checks.

use std::collections::{BTreeMap, BTreeSet};

use crate::artifact::Artifact;

/// All artifacts of a run plus their dependency edges.
#[derive(Debug)]
pub struct ArtifactGraph {
    artifacts: BTreeMap<String, Artifact>,
    deps: BTreeMap<String, BTreeSet<String>>,
}

impl ArtifactGraph {
    /// Builds the graph, deriving every edge from the artifact set.
    pub fn new(artifacts: BTreeMap<String, Artifact>) -> Self {
        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for key in artifacts.keys() {
            deps.insert(key.clone(), BTreeSet::new());
        }
        for (key, artifact) in &artifacts {
            for (other_key, other) in &artifacts {
                if artifact.depends_on(other) {
                    deps.get_mut(key).expect("key present").insert(other_key.clone());
                }
            }
        }
        Self { artifacts, deps }
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.artifacts.keys()
    }

    pub fn get(&self, key: &str) -> Option<&Artifact> {
        self.artifacts.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Artifact> {
        self.artifacts.get_mut(key)
    }

    /// The dependency edges: key to the set of keys it depends on.
    pub fn deps(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.deps
    }

    /// A fresh mutable pending map for one scheduler run.
    pub fn pending_map(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.deps.clone()
    }
}
