//! `--show` -- print the dependency tree and the would-be execution order.

use std::sync::Arc;

use anyhow::Result;

use silo_backend::jobs::JobRegistry;

use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let graph = super::build_graph(ctx, Arc::new(JobRegistry::empty()))?;
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    silo_engine::modes::show(&graph, &mut handle)?;
    Ok(())
}
