//! `--execute` -- reconcile every artifact against the warehouse.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use tracing::info;

use silo_backend::Session;
use silo_backend::jobs::JobRegistry;
use silo_backend::script::LocalScriptRunner;
use silo_gcp::{BigQueryClient, GcsClient, resolve_project};

use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    ctx.require_folders()?;
    let project = resolve_project(ctx.default_project.as_deref())?;
    info!(project, location = ctx.location, "connecting");

    let warehouse = Arc::new(BigQueryClient::new(project, ctx.location.clone()));
    let session = Session::new(
        warehouse.clone(),
        Arc::new(GcsClient::new()),
        Arc::new(LocalScriptRunner::new()),
    );

    let jobs = Arc::new(JobRegistry::load(warehouse.as_ref()).context("recovering jobs")?);
    let mut graph = super::build_graph(ctx, jobs)?;

    let stats = silo_engine::execute(&mut graph, &session, &ctx.schedule)?;
    info!(
        ticks = stats.ticks,
        creates = stats.creates,
        "all artifacts up to date"
    );
    Ok(())
}
