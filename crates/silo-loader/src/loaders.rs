//! One loader per recognized file suffix.
//!
//! Seven of the eight suffixes share the templating pipeline
//! ([`TemplatingLoader`], parameterized by [`TemplateKind`]); `localdata`
//! derives its identity from the filename instead ([`LocalDataLoader`]).
//! [`DelegatingLoader`] dispatches on the final suffix.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use silo_backend::jobs::JobRegistry;
use silo_backend::types::TableId;
use silo_core::artifact::{
    Artifact, Extract, ExternalTable, LocalDataLoad, ObjectStoreLoad, QueryTable, ScriptTable, View,
};
use silo_core::options::{ResolvedVars, expiration_days, load_options_from_vars, require_exists};
use silo_core::schema::parse_schema;
use silo_template::{VarMap, VarValue, keys_of_template, render};

use crate::expand::expand_vars_array;
use crate::filename::{folder_of, parse_dataset_table, stem_of, suffix_of};
use crate::sidecar::SidecarCache;
use crate::{LoadError, Result};

/// Loads the artifacts one file describes.
pub trait FileLoader {
    fn load(&mut self, path: &Path) -> Result<Vec<Artifact>>;
}

// ---------------------------------------------------------------------------
// Templating loader
// ---------------------------------------------------------------------------

/// Which artifact variant a templated suffix produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// `querytemplate`
    QueryTable,
    /// `view`
    View,
    /// `uniontable`
    UnionTable,
    /// `unionview`
    UnionView,
    /// `gcsdata`
    StoreLoad,
    /// `bashtemplate`
    ScriptTable,
    /// `externaltable`
    ExternalTable,
}

impl TemplateKind {
    fn unionable(self) -> bool {
        matches!(self, Self::UnionTable | Self::UnionView)
    }

    /// Only plain query templates insist on an explicit `.vars` sidecar.
    fn requires_vars_file(self) -> bool {
        matches!(self, Self::QueryTable)
    }
}

/// Loader for all template-driven suffixes.
pub struct TemplatingLoader {
    kind: TemplateKind,
    defaults: VarMap,
    now: NaiveDateTime,
    jobs: Arc<JobRegistry>,
    sidecars: SidecarCache,
}

impl TemplatingLoader {
    pub fn new(kind: TemplateKind, defaults: VarMap, now: NaiveDateTime, jobs: Arc<JobRegistry>) -> Self {
        Self {
            kind,
            defaults,
            now,
            jobs,
            sidecars: SidecarCache::new(),
        }
    }

    /// Builds the artifact(s) for one resolved expansion and merges them
    /// into `out`, unioning where the kind allows it.
    fn process(
        &mut self,
        vars: &ResolvedVars,
        template: &str,
        path: &Path,
        out: &mut BTreeMap<String, Artifact>,
    ) -> Result<()> {
        let Some(dataset) = vars.get("dataset") else {
            return Err(LoadError::MissingDataset { path: path.into() });
        };

        // Fail fast on placeholders with no binding.
        let needed = keys_of_template(template);
        let missing: Vec<String> = needed
            .iter()
            .filter(|k| !vars.contains_key(*k))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingTemplateVars {
                missing: missing.join(", "),
                path: path.into(),
            });
        }
        let rendered = render(template, vars)?;

        let table_name = vars
            .get("table")
            .map(|t| t.replace('-', "_"))
            .unwrap_or_default();
        let table = TableId::new(vars.get("project").cloned(), dataset.clone(), table_name);
        let recovered = self.jobs.job_for(&table).map(|j| j.id.clone());
        let expiration = expiration_days(vars);

        let artifact = match self.kind {
            TemplateKind::QueryTable | TemplateKind::UnionTable => {
                if self.kind == TemplateKind::QueryTable {
                    if let Some(extract) = vars.get("extract") {
                        let patterns = extract.split_whitespace().map(str::to_string).collect();
                        let extract = Extract::new(table.clone(), patterns)
                            .map_err(|e| LoadError::model(path, e))?;
                        insert_artifact(out, Artifact::Extract(extract), path)?;
                    }
                }
                Artifact::QueryTable(QueryTable::new(
                    table,
                    rendered,
                    expiration,
                    self.kind.unionable(),
                    recovered,
                ))
            }
            TemplateKind::View | TemplateKind::UnionView => {
                Artifact::View(View::new(table, rendered, self.kind.unionable()))
            }
            TemplateKind::StoreLoad => {
                let options =
                    load_options_from_vars(vars).map_err(|e| LoadError::model(path, e))?;
                let Some(format) = options.source_format else {
                    return Err(LoadError::MissingSourceFormat { path: path.into() });
                };
                let schema = if format.is_self_describing() {
                    None
                } else {
                    let raw = self.sidecars.schema(path)?;
                    Some(parse_schema(&raw).map_err(|e| LoadError::model(path, e))?)
                };
                Artifact::ObjectStoreLoad(ObjectStoreLoad::new(
                    table,
                    rendered,
                    schema,
                    options,
                    require_exists(vars),
                    expiration,
                    recovered,
                ))
            }
            TemplateKind::ScriptTable => {
                let raw = self.sidecars.schema(path)?;
                let schema = parse_schema(&raw).map_err(|e| LoadError::model(path, e))?;
                Artifact::ScriptTable(ScriptTable::new(table, rendered, schema, recovered))
            }
            TemplateKind::ExternalTable => {
                let config: serde_json::Value =
                    serde_json::from_str(&rendered).map_err(|e| LoadError::ExternalConfig {
                        path: path.into(),
                        source: e,
                    })?;
                let autodetect = config
                    .get("autodetect")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let schema = if autodetect {
                    None
                } else {
                    let raw = self.sidecars.schema(path)?;
                    Some(parse_schema(&raw).map_err(|e| LoadError::model(path, e))?)
                };
                Artifact::ExternalTable(ExternalTable::new(table, config, schema))
            }
        };
        insert_artifact(out, artifact, path)
    }
}

impl FileLoader for TemplatingLoader {
    fn load(&mut self, path: &Path) -> Result<Vec<Artifact>> {
        let template = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let filename = stem_of(path)?;
        let folder = folder_of(path);
        let raw = self.sidecars.vars(path, self.kind.requires_vars_file())?;
        let expanded = expand_vars_array(&raw, &folder, &filename, &self.defaults, self.now)?;
        debug!(file = %path.display(), expansions = expanded.len(), "expanding template");

        let mut out = BTreeMap::new();
        for vars in &expanded {
            self.process(vars, &template, path, &mut out)?;
        }
        Ok(out.into_values().collect())
    }
}

/// Inserts an artifact into a key-indexed map, merging unionable
/// duplicates and rejecting the rest.
fn insert_artifact(
    out: &mut BTreeMap<String, Artifact>,
    artifact: Artifact,
    path: &Path,
) -> Result<()> {
    let key = artifact.key();
    match out.entry(key.clone()) {
        Entry::Occupied(mut existing) => {
            existing
                .get_mut()
                .merge_union(artifact)
                .map_err(|_| LoadError::DuplicateKey {
                    key,
                    path: path.into(),
                })
        }
        Entry::Vacant(slot) => {
            slot.insert(artifact);
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Local data loader
// ---------------------------------------------------------------------------

/// Loader for `localdata` files: a local payload plus schema sidecar,
/// identity taken from the filename.
pub struct LocalDataLoader {
    default_dataset: Option<String>,
    default_project: Option<String>,
    jobs: Arc<JobRegistry>,
    sidecars: SidecarCache,
}

impl LocalDataLoader {
    pub fn new(
        default_dataset: Option<String>,
        default_project: Option<String>,
        jobs: Arc<JobRegistry>,
    ) -> Self {
        Self {
            default_dataset,
            default_project,
            jobs,
            sidecars: SidecarCache::new(),
        }
    }
}

impl FileLoader for LocalDataLoader {
    fn load(&mut self, path: &Path) -> Result<Vec<Artifact>> {
        let (dataset, table_name) = parse_dataset_table(path, self.default_dataset.as_deref())?;
        let schema_raw = self.sidecars.schema(path)?;
        let schema = parse_schema(&schema_raw).map_err(|e| LoadError::model(path, e))?;
        let data = std::fs::read(path).map_err(|e| LoadError::io(path, e))?;

        let table = TableId::new(
            self.default_project.clone(),
            dataset,
            table_name.replace('-', "_"),
        );
        let recovered = self.jobs.job_for(&table).map(|j| j.id.clone());
        Ok(vec![Artifact::LocalDataLoad(LocalDataLoad::new(
            table,
            path.to_path_buf(),
            schema,
            &data,
            schema_raw.as_bytes(),
            recovered,
        ))])
    }
}

// ---------------------------------------------------------------------------
// Delegating loader
// ---------------------------------------------------------------------------

/// Dispatches files to the loader registered for their final suffix.
pub struct DelegatingLoader {
    loaders: BTreeMap<String, Box<dyn FileLoader>>,
}

impl DelegatingLoader {
    pub fn new() -> Self {
        Self {
            loaders: BTreeMap::new(),
        }
    }

    pub fn register(mut self, suffix: impl Into<String>, loader: Box<dyn FileLoader>) -> Self {
        self.loaders.insert(suffix.into(), loader);
        self
    }

    /// The full standard suffix set, sharing one defaults map. The
    /// `dataset` and `project` defaults double as the local-data loader's
    /// default identity.
    pub fn standard(defaults: VarMap, now: NaiveDateTime, jobs: Arc<JobRegistry>) -> Self {
        let default_str = |key: &str| match defaults.get(key) {
            Some(VarValue::Str(s)) => Some(s.clone()),
            _ => None,
        };
        let local = Box::new(LocalDataLoader::new(
            default_str("dataset"),
            default_str("project"),
            jobs.clone(),
        ));
        let templating = |kind| {
            Box::new(TemplatingLoader::new(kind, defaults.clone(), now, jobs.clone()))
                as Box<dyn FileLoader>
        };
        Self::new()
            .register("querytemplate", templating(TemplateKind::QueryTable))
            .register("view", templating(TemplateKind::View))
            .register("uniontable", templating(TemplateKind::UnionTable))
            .register("unionview", templating(TemplateKind::UnionView))
            .register("gcsdata", templating(TemplateKind::StoreLoad))
            .register("bashtemplate", templating(TemplateKind::ScriptTable))
            .register("externaltable", templating(TemplateKind::ExternalTable))
            .register("localdata", local)
    }

    /// Whether some registered loader handles this file.
    pub fn handles(&self, path: &Path) -> bool {
        suffix_of(path).is_ok_and(|s| self.loaders.contains_key(&s))
    }

    pub fn load(&mut self, path: &Path) -> Result<Vec<Artifact>> {
        let suffix = suffix_of(path)?;
        let loader = self
            .loaders
            .get_mut(&suffix)
            .ok_or(LoadError::UnknownSuffix { suffix })?;
        loader.load(path)
    }
}

impl Default for DelegatingLoader {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn defaults(dataset: &str) -> VarMap {
        VarMap::from([("dataset".to_string(), VarValue::from(dataset))])
    }

    fn registry() -> Arc<JobRegistry> {
        Arc::new(JobRegistry::empty())
    }

    #[test]
    fn query_template_renders_and_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atable.querytemplate");
        fs::write(&path, "select * from {foo}").unwrap();
        fs::write(
            dir.path().join("atable.querytemplate.vars"),
            r#"[{"dataset": "adataset", "foo": "bar"}]"#,
        )
        .unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::QueryTable, VarMap::new(), now(), registry());
        let artifacts = loader.load(&path).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].key(), "adataset.atable");
        match &artifacts[0] {
            Artifact::QueryTable(q) => assert_eq!(q.final_query(), "select * from bar"),
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn query_template_requires_vars_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.querytemplate");
        fs::write(&path, "select 1").unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::QueryTable, defaults("ds"), now(), registry());
        assert!(matches!(
            loader.load(&path),
            Err(LoadError::MissingVarsFile { .. })
        ));
    }

    #[test]
    fn view_without_sidecar_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("v.view");
        fs::write(&path, "select 1").unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::View, defaults("ds"), now(), registry());
        let artifacts = loader.load(&path).unwrap();
        assert_eq!(artifacts[0].key(), "ds.v");
    }

    #[test]
    fn missing_placeholder_binding_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.view");
        fs::write(&path, "select * from {nowhere}").unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::View, defaults("ds"), now(), registry());
        let err = loader.load(&path).unwrap_err();
        match err {
            LoadError::MissingTemplateVars { missing, .. } => assert_eq!(missing, "nowhere"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_dataset_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.view");
        fs::write(&path, "select 1").unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::View, VarMap::new(), now(), registry());
        assert!(matches!(
            loader.load(&path),
            Err(LoadError::MissingDataset { .. })
        ));
    }

    #[test]
    fn dashes_in_expanded_table_names_become_underscores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.view");
        fs::write(&path, "select 1").unwrap();
        fs::write(
            dir.path().join("t.view.vars"),
            r#"[{"dataset": "ds", "table": "my-table"}]"#,
        )
        .unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::View, VarMap::new(), now(), registry());
        let artifacts = loader.load(&path).unwrap();
        assert_eq!(artifacts[0].key(), "ds.my_table");
    }

    #[test]
    fn duplicate_expansion_of_plain_table_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.querytemplate");
        fs::write(&path, "select {x}").unwrap();
        // Both objects expand to the same key.
        fs::write(
            dir.path().join("t.querytemplate.vars"),
            r#"[{"dataset": "ds", "x": "1"}, {"dataset": "ds", "x": "2"}]"#,
        )
        .unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::QueryTable, VarMap::new(), now(), registry());
        assert!(matches!(
            loader.load(&path),
            Err(LoadError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn union_table_merges_expansions_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.uniontable");
        fs::write(&path, "select {x}").unwrap();
        fs::write(
            dir.path().join("t.uniontable.vars"),
            r#"[{"dataset": "ds", "x": "1"}, {"dataset": "ds", "x": "2"}]"#,
        )
        .unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::UnionTable, VarMap::new(), now(), registry());
        let artifacts = loader.load(&path).unwrap();
        assert_eq!(artifacts.len(), 1);
        match &artifacts[0] {
            Artifact::QueryTable(q) => {
                assert_eq!(q.final_query(), "select 1\nunion all\nselect 2");
            }
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn extract_var_emits_companion_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.querytemplate");
        fs::write(&path, "select 1").unwrap();
        fs::write(
            dir.path().join("t.querytemplate.vars"),
            r#"[{"dataset": "ds", "extract": "gs://b/out/part-*"}]"#,
        )
        .unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::QueryTable, VarMap::new(), now(), registry());
        let artifacts = loader.load(&path).unwrap();
        let keys: Vec<String> = artifacts.iter().map(Artifact::key).collect();
        assert_eq!(keys, vec!["ds.t".to_string(), "extract.ds.t".to_string()]);
    }

    #[test]
    fn extract_with_two_wildcards_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.querytemplate");
        fs::write(&path, "select 1").unwrap();
        fs::write(
            dir.path().join("t.querytemplate.vars"),
            r#"[{"dataset": "ds", "extract": "gs://b/*/part-*"}]"#,
        )
        .unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::QueryTable, VarMap::new(), now(), registry());
        assert!(matches!(loader.load(&path), Err(LoadError::Model { .. })));
    }

    #[test]
    fn gcsdata_requires_source_format_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.gcsdata");
        fs::write(&path, "gs://b/data/part-*\n").unwrap();
        fs::write(
            dir.path().join("t.gcsdata.vars"),
            r#"[{"dataset": "ds"}]"#,
        )
        .unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::StoreLoad, VarMap::new(), now(), registry());
        assert!(matches!(
            loader.load(&path),
            Err(LoadError::MissingSourceFormat { .. })
        ));

        // With a format but no schema sidecar: schema error.
        fs::write(
            dir.path().join("t.gcsdata.vars"),
            r#"[{"dataset": "ds", "source_format": "CSV"}]"#,
        )
        .unwrap();
        let mut loader =
            TemplatingLoader::new(TemplateKind::StoreLoad, VarMap::new(), now(), registry());
        assert!(matches!(
            loader.load(&path),
            Err(LoadError::MissingSchemaFile { .. })
        ));

        // Self-describing formats skip the sidecar entirely.
        fs::write(
            dir.path().join("t.gcsdata.vars"),
            r#"[{"dataset": "ds", "source_format": "PARQUET"}]"#,
        )
        .unwrap();
        let mut loader =
            TemplatingLoader::new(TemplateKind::StoreLoad, VarMap::new(), now(), registry());
        let artifacts = loader.load(&path).unwrap();
        match &artifacts[0] {
            Artifact::ObjectStoreLoad(l) => {
                assert_eq!(l.uris(), vec!["gs://b/data/part-*".to_string()]);
                assert!(l.schema.is_none());
            }
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn external_table_autodetect_skips_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.externaltable");
        fs::write(
            &path,
            r#"{"autodetect": true, "sourceUris": ["gs://b/x"], "sourceFormat": "CSV"}"#,
        )
        .unwrap();
        fs::write(dir.path().join("t.externaltable.vars"), r#"[{"dataset": "ds"}]"#).unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::ExternalTable, VarMap::new(), now(), registry());
        let artifacts = loader.load(&path).unwrap();
        match &artifacts[0] {
            Artifact::ExternalTable(e) => assert!(e.schema.is_none()),
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn bash_template_reads_script_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.bashtemplate");
        fs::write(&path, "#!/bin/sh\necho {greeting}\n").unwrap();
        fs::write(
            dir.path().join("t.bashtemplate.vars"),
            r#"[{"dataset": "ds", "greeting": "hi"}]"#,
        )
        .unwrap();
        fs::write(dir.path().join("t.bashtemplate.schema"), "a:string").unwrap();

        let mut loader =
            TemplatingLoader::new(TemplateKind::ScriptTable, VarMap::new(), now(), registry());
        let artifacts = loader.load(&path).unwrap();
        match &artifacts[0] {
            Artifact::ScriptTable(s) => {
                assert_eq!(s.script, "#!/bin/sh\necho hi\n");
                assert_eq!(s.schema.len(), 1);
            }
            other => panic!("unexpected variant: {other}"),
        }
    }

    #[test]
    fn local_data_loader_parses_identity_from_filename() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ds.t.localdata");
        fs::write(&path, "[1,2]\n").unwrap();
        fs::write(dir.path().join("ds.t.localdata.schema"), "a:int").unwrap();

        let mut loader = LocalDataLoader::new(None, None, registry());
        let artifacts = loader.load(&path).unwrap();
        assert_eq!(artifacts[0].key(), "ds.t");
    }

    #[test]
    fn delegating_loader_dispatches_and_rejects() {
        let dir = tempfile::tempdir().unwrap();
        let view = dir.path().join("v.view");
        fs::write(&view, "select 1").unwrap();

        let mut loader = DelegatingLoader::standard(defaults("ds"), now(), registry());
        assert!(loader.handles(&view));
        assert!(!loader.handles(&dir.path().join("readme.txt")));
        assert!(!loader.handles(&dir.path().join("nosuffix")));
        // Sidecars are not loadable payloads themselves.
        assert!(!loader.handles(&dir.path().join("v.view.vars")));

        let artifacts = loader.load(&view).unwrap();
        assert_eq!(artifacts[0].key(), "ds.v");
    }
}
