//! Folder walking and graph construction.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use silo_core::ArtifactGraph;
use silo_core::artifact::{Artifact, Dataset};

use crate::loaders::DelegatingLoader;
use crate::{LoadError, Result};

/// Loads every handled file under the given folders and derives the
/// dependency graph.
pub struct DependencyBuilder {
    loader: DelegatingLoader,
}

impl DependencyBuilder {
    pub fn new(loader: DelegatingLoader) -> Self {
        Self { loader }
    }

    pub fn build(&mut self, folders: &[PathBuf]) -> Result<ArtifactGraph> {
        let mut artifacts: BTreeMap<String, Artifact> = BTreeMap::new();

        for folder in folders {
            for file in sorted_files(folder)? {
                if !self.loader.handles(&file) {
                    continue;
                }
                debug!(file = %file.display(), "loading");
                for artifact in self.loader.load(&file)? {
                    insert(&mut artifacts, artifact, &file)?;
                }
            }
        }

        synthesize_datasets(&mut artifacts);
        info!(artifacts = artifacts.len(), "loaded artifact set");
        Ok(ArtifactGraph::new(artifacts))
    }
}

fn sorted_files(folder: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(folder).map_err(|e| LoadError::io(folder, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| LoadError::io(folder, e))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn insert(artifacts: &mut BTreeMap<String, Artifact>, artifact: Artifact, file: &Path) -> Result<()> {
    let key = artifact.key();
    match artifacts.entry(key.clone()) {
        Entry::Occupied(mut existing) => {
            existing
                .get_mut()
                .merge_union(artifact)
                .map_err(|_| LoadError::DuplicateKey {
                    key,
                    path: file.into(),
                })
        }
        Entry::Vacant(slot) => {
            slot.insert(artifact);
            Ok(())
        }
    }
}

/// One dataset artifact per distinct dataset of the table-like artifacts.
/// Datasets are derived, never loaded from files.
fn synthesize_datasets(artifacts: &mut BTreeMap<String, Artifact>) {
    let needed: Vec<(String, Option<String>)> = artifacts
        .values()
        .filter(|a| !matches!(a, Artifact::Dataset(_)))
        .map(|a| {
            let project = a.table_id().and_then(|t| t.project.clone());
            (a.dataset_name().to_string(), project)
        })
        .collect();

    for (name, project) in needed {
        artifacts
            .entry(name.clone())
            .or_insert_with(|| Artifact::Dataset(Dataset { project, name }));
    }
}
