//! `silo` -- declarative warehouse build-and-reconcile CLI.
//!
//! Parses CLI arguments with clap, resolves the runtime context, and
//! dispatches to the selected mode handler.

mod cli;
mod commands;
mod context;

use clap::Parser;

use cli::{Cli, Mode};
use context::RuntimeContext;

fn main() {
    let cli = Cli::parse();

    // Set up logging; `-v` turns on per-crate debug output.
    let filter = if cli.verbose {
        "silo=debug,silo_core=debug,silo_loader=debug,silo_engine=debug,silo_backend=debug,silo_gcp=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = RuntimeContext::from_cli(&cli).and_then(|ctx| match cli.mode() {
        Some(Mode::Execute) => commands::execute::run(&ctx),
        Some(Mode::Show) => commands::show::run(&ctx),
        Some(Mode::Dotml) => commands::dotml::run(&ctx),
        Some(Mode::Dump(folder)) => commands::dump::run(&ctx, &folder),
        Some(Mode::ShowJobs) => commands::show_jobs::run(&ctx),
        None => {
            // No mode -- print help.
            use clap::CommandFactory;
            Cli::command().print_help().ok();
            println!();
            Ok(())
        }
    });

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
