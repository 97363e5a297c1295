//! `--show-jobs` -- list pending and running warehouse jobs.

use anyhow::Result;

use silo_backend::Warehouse;
use silo_backend::types::JobState;
use silo_gcp::{BigQueryClient, resolve_project};

use crate::context::RuntimeContext;

pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let project = resolve_project(ctx.default_project.as_deref())?;
    let warehouse = BigQueryClient::new(project, ctx.location.clone());

    for state in [JobState::Pending, JobState::Running] {
        let mut page_token: Option<String> = None;
        loop {
            let page = warehouse.list_jobs(Some(state), page_token.as_deref(), 1000)?;
            for job in &page.jobs {
                let destination = job
                    .destination
                    .as_ref()
                    .map(|d| d.key())
                    .unwrap_or_else(|| "-".to_string());
                println!("{} {} {}", job.id, job.state.as_str(), destination);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
    }
    Ok(())
}
