//! Runtime context for command execution.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use chrono::NaiveDateTime;

use silo_engine::ScheduleOptions;
use silo_loader::vars_file::load_vars_file;
use silo_template::{VarMap, VarValue};

use crate::cli::Cli;

/// Resolved configuration shared by every command.
#[derive(Debug)]
pub struct RuntimeContext {
    /// Default template variables (vars file plus identity flags).
    pub defaults: VarMap,
    /// Folders to load, in argument order.
    pub folders: Vec<PathBuf>,
    /// Project passed to the warehouse client.
    pub default_project: Option<String>,
    /// Warehouse location for jobs and new datasets.
    pub location: String,
    /// Scheduler tunables.
    pub schedule: ScheduleOptions,
    /// The wall-clock instant date macros expand against.
    pub now: NaiveDateTime,
}

impl RuntimeContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut defaults = match &cli.vars_file {
            Some(path) => load_vars_file(path)
                .with_context(|| format!("loading vars file {}", path.display()))?,
            None => VarMap::new(),
        };
        if let Some(dataset) = &cli.default_dataset {
            defaults.insert("dataset".to_string(), VarValue::from(dataset.clone()));
        }
        if let Some(project) = &cli.default_project {
            defaults.insert("project".to_string(), VarValue::from(project.clone()));
        }

        Ok(Self {
            defaults,
            folders: cli.folders.clone(),
            default_project: cli.default_project.clone(),
            location: cli.location.clone(),
            schedule: ScheduleOptions {
                max_concurrent: cli.max_concurrent,
                check_frequency: Duration::from_secs(cli.check_frequency),
                max_retry: cli.max_retry,
            },
            now: chrono::Local::now().naive_local(),
        })
    }

    /// Folder modes need at least one folder argument.
    pub fn require_folders(&self) -> Result<()> {
        if self.folders.is_empty() {
            bail!("specify one or more folders of definition files");
        }
        Ok(())
    }
}
