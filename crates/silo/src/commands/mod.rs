//! Command handlers, one per mode.

pub mod dotml;
pub mod dump;
pub mod execute;
pub mod show;
pub mod show_jobs;

use std::sync::Arc;

use anyhow::{Context as _, Result};

use silo_backend::jobs::JobRegistry;
use silo_core::ArtifactGraph;
use silo_loader::{DelegatingLoader, DependencyBuilder};

use crate::context::RuntimeContext;

/// Loads the folders into a graph. Offline modes pass an empty registry;
/// execute passes the jobs recovered from the warehouse.
pub(crate) fn build_graph(ctx: &RuntimeContext, jobs: Arc<JobRegistry>) -> Result<ArtifactGraph> {
    ctx.require_folders()?;
    let loader = DelegatingLoader::standard(ctx.defaults.clone(), ctx.now, jobs);
    DependencyBuilder::new(loader)
        .build(&ctx.folders)
        .context("loading definition folders")
}
