//! Clap CLI definitions for the `silo` command.

use std::path::PathBuf;

use clap::Parser;

/// silo -- declarative build-and-reconcile for a managed data warehouse.
///
/// Folders of definition files describe derived tables, views, loads and
/// extracts; silo infers the dependency graph from the rendered
/// definitions and drives everything to an up-to-date state.
#[derive(Parser, Debug)]
#[command(
    name = "silo",
    about = "Declarative warehouse build and reconcile",
    version
)]
pub struct Cli {
    /// Execute the dependencies found in the folders.
    #[arg(long)]
    pub execute: bool,

    /// Print the dependency tree, then the would-be execution order.
    #[arg(long)]
    pub show: bool,

    /// Emit the dependency graph in Graphviz dot form.
    #[arg(long)]
    pub dotml: bool,

    /// Dump each rendered definition to DIR/<key>.debug.
    #[arg(long, value_name = "DIR")]
    pub dump_to_folder: Option<PathBuf>,

    /// List pending and running warehouse jobs, then exit.
    #[arg(long)]
    pub show_jobs: bool,

    /// Dataset used when file definitions don't specify one.
    #[arg(long)]
    pub default_dataset: Option<String>,

    /// Project used when file definitions don't specify one.
    #[arg(long)]
    pub default_project: Option<String>,

    /// Maximum simultaneously in-flight artifacts.
    #[arg(long, default_value_t = 10)]
    pub max_concurrent: usize,

    /// Seconds between dependency evaluation ticks.
    #[arg(long, default_value_t = 10)]
    pub check_frequency: u64,

    /// Retry budget per artifact beyond the first dispatch.
    #[arg(long, default_value_t = 2)]
    pub max_retry: i64,

    /// JSON object of default template variables.
    #[arg(long, value_name = "PATH")]
    pub vars_file: Option<PathBuf>,

    /// Warehouse location for jobs and new datasets.
    #[arg(long, default_value = "US")]
    pub location: String,

    /// Enable verbose/debug output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Folders containing artifact definition files.
    #[arg(value_name = "FOLDER")]
    pub folders: Vec<PathBuf>,
}

/// What one invocation does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Execute,
    Show,
    Dotml,
    Dump(PathBuf),
    ShowJobs,
}

impl Cli {
    /// The selected mode; flags are checked in a fixed priority order.
    pub fn mode(&self) -> Option<Mode> {
        if self.execute {
            Some(Mode::Execute)
        } else if self.show {
            Some(Mode::Show)
        } else if self.dotml {
            Some(Mode::Dotml)
        } else if let Some(dir) = &self.dump_to_folder {
            Some(Mode::Dump(dir.clone()))
        } else if self.show_jobs {
            Some(Mode::ShowJobs)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_priority() {
        let cli = Cli::parse_from(["silo", "--execute", "--show", "folder"]);
        assert_eq!(cli.mode(), Some(Mode::Execute));

        let cli = Cli::parse_from(["silo", "--dump-to-folder", "/tmp/x", "folder"]);
        assert_eq!(cli.mode(), Some(Mode::Dump(PathBuf::from("/tmp/x"))));

        let cli = Cli::parse_from(["silo", "folder"]);
        assert_eq!(cli.mode(), None);
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = Cli::parse_from(["silo", "--show", "folder"]);
        assert_eq!(cli.max_concurrent, 10);
        assert_eq!(cli.check_frequency, 10);
        assert_eq!(cli.max_retry, 2);
        assert_eq!(cli.location, "US");
    }
}
