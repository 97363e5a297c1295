//! Read-only graph modes: `show`, `dotml` and `dump`.
//!
//! All three share the execute mode's graph walk but never call `create`;
//! they drain the pending map purely by edge retirement.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use tracing::info;

use silo_core::ArtifactGraph;

use crate::{EngineError, Result, cycle_report};

/// Writes the `K depends on ...` listing for every artifact.
fn write_dependencies<W: Write>(graph: &ArtifactGraph, w: &mut W) -> std::io::Result<()> {
    for (key, deps) in graph.deps() {
        let msg = if deps.is_empty() {
            "nothing".to_string()
        } else {
            deps.iter().cloned().collect::<Vec<_>>().join(" ")
        };
        writeln!(w, "{key} depends on {msg}")?;
    }
    Ok(())
}

/// Drains the graph in dependency order, invoking `visit` for each key as
/// it becomes ready. Reports a cycle if draining stalls.
fn drain_in_order(
    graph: &ArtifactGraph,
    mut visit: impl FnMut(&str) -> Result<()>,
) -> Result<()> {
    let mut pending: BTreeMap<String, BTreeSet<String>> = graph.pending_map();
    while !pending.is_empty() {
        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(key, _)| key.clone())
            .collect();
        if ready.is_empty() {
            return Err(EngineError::DependencyCycle {
                report: cycle_report(&pending),
            });
        }
        for key in &ready {
            visit(key)?;
            pending.remove(key);
        }
        for deps in pending.values_mut() {
            deps.retain(|dep| !ready.contains(dep));
        }
    }
    Ok(())
}

/// Prints the dependency listing, then the execution order.
pub fn show<W: Write>(graph: &ArtifactGraph, w: &mut W) -> Result<()> {
    write_dependencies(graph, w)?;
    drain_in_order(graph, |key| {
        writeln!(w, "would execute {key}")?;
        Ok(())
    })
}

/// Emits the dependency edges as a Graphviz digraph; arrows point from a
/// dependency to its dependents, following execution order.
pub fn dotml<W: Write>(graph: &ArtifactGraph, w: &mut W) -> Result<()> {
    writeln!(w, "digraph silo {{")?;
    writeln!(w, "  rankdir=TB;")?;
    writeln!(w, "  node [shape=box];")?;
    for key in graph.keys() {
        writeln!(w, "  \"{key}\";")?;
    }
    for (key, deps) in graph.deps() {
        for dep in deps {
            writeln!(w, "  \"{dep}\" -> \"{key}\";")?;
        }
    }
    writeln!(w, "}}")?;
    Ok(())
}

/// Writes each artifact's rendered definition to
/// `<folder>/<escaped-key>.debug`, in dependency order.
pub fn dump(graph: &ArtifactGraph, folder: &Path) -> Result<()> {
    std::fs::create_dir_all(folder)?;
    drain_in_order(graph, |key| {
        let artifact = graph.get(key).expect("drained key is in graph");
        let escaped = key.replace('/', "_");
        let path = folder.join(format!("{escaped}.debug"));
        std::fs::write(&path, artifact.dump())?;
        info!(file = %path.display(), "dumped");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use silo_backend::types::TableId;
    use silo_core::artifact::{Artifact, Dataset, View};

    fn graph() -> ArtifactGraph {
        let artifacts = [
            Artifact::View(View::new(
                TableId::new(None, "ds", "a"),
                "select * from ds.b".into(),
                false,
            )),
            Artifact::View(View::new(
                TableId::new(None, "ds", "b"),
                "select 1".into(),
                false,
            )),
            Artifact::Dataset(Dataset {
                project: None,
                name: "ds".into(),
            }),
        ];
        ArtifactGraph::new(artifacts.into_iter().map(|a| (a.key(), a)).collect())
    }

    #[test]
    fn show_lists_dependencies_then_execution_order() {
        let mut out = Vec::new();
        show(&graph(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let expected = "\
ds depends on nothing
ds.a depends on ds ds.b
ds.b depends on ds
would execute ds
would execute ds.b
would execute ds.a
";
        assert_eq!(text, expected);
    }

    #[test]
    fn dotml_emits_every_edge() {
        let mut out = Vec::new();
        dotml(&graph(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("digraph silo {"));
        assert!(text.contains("  \"ds\" -> \"ds.a\";"));
        assert!(text.contains("  \"ds.b\" -> \"ds.a\";"));
        assert!(text.contains("  \"ds\" -> \"ds.b\";"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn dump_writes_definitions_to_debug_files() {
        let dir = tempfile::tempdir().unwrap();
        dump(&graph(), dir.path()).unwrap();

        let a = std::fs::read_to_string(dir.path().join("ds.a.debug")).unwrap();
        assert_eq!(a, "select * from ds.b");
        assert!(dir.path().join("ds.debug").exists());
        assert!(dir.path().join("ds.b.debug").exists());
    }

    #[test]
    fn show_reports_cycles() {
        let artifacts = [
            Artifact::View(View::new(
                TableId::new(None, "ds", "a"),
                "select * from ds.b".into(),
                false,
            )),
            Artifact::View(View::new(
                TableId::new(None, "ds", "b"),
                "select * from ds.a".into(),
                false,
            )),
        ];
        let graph = ArtifactGraph::new(artifacts.into_iter().map(|a| (a.key(), a)).collect());

        let mut out = Vec::new();
        let err = show(&graph, &mut out).unwrap_err();
        assert!(matches!(err, EngineError::DependencyCycle { .. }));
    }
}
