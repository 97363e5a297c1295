//! `--dump-to-folder` -- write each rendered definition to a debug file.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use silo_backend::jobs::JobRegistry;

use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext, folder: &Path) -> Result<()> {
    let graph = super::build_graph(ctx, Arc::new(JobRegistry::empty()))?;
    silo_engine::modes::dump(&graph, folder)?;
    Ok(())
}
