//! File loaders for the silo system.
//!
//! One loader exists per recognized file suffix; a delegating loader
//! dispatches on the final suffix. Loaders expand each file's variables
//! sidecar into one or more artifacts; the [`builder::DependencyBuilder`]
//! walks folders, merges unionable duplicates, synthesizes dataset
//! artifacts, and derives the dependency graph.

use std::path::PathBuf;

use silo_core::ModelError;
use silo_template::TemplateError;

pub mod builder;
pub mod expand;
pub mod filename;
pub mod loaders;
pub mod sidecar;
pub mod vars_file;

pub use builder::DependencyBuilder;
pub use loaders::{DelegatingLoader, FileLoader, LocalDataLoader, TemplateKind, TemplatingLoader};

/// Errors raised while loading artifact definitions. All are fatal for the
/// run; nothing is scheduled from a folder that fails to load.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid filename: {path}. File names must be of form dataset.table.suffix or table.suffix")]
    InvalidFilename { path: PathBuf },

    #[error("{path} must have a suffix to be processed")]
    NoSuffix { path: PathBuf },

    #[error("no loader associated with suffix: {suffix}")]
    UnknownSuffix { suffix: String },

    #[error("must specify a default dataset")]
    MissingDefaultDataset,

    #[error("please define template vars in a file called {path}")]
    MissingVarsFile { path: PathBuf },

    #[error("must be a json list of objects in {path}")]
    InvalidVarsFile { path: PathBuf },

    #[error("problem reading json var list from file {path}: {source}")]
    VarsJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing dataset in template vars for {path}")]
    MissingDataset { path: PathBuf },

    #[error("please define values for {missing} in a file {path}.vars")]
    MissingTemplateVars { missing: String, path: PathBuf },

    #[error("please provide a schema file for {path}")]
    MissingSchemaFile { path: PathBuf },

    #[error("source_format not found in template vars for {path}")]
    MissingSourceFormat { path: PathBuf },

    #[error("templating generated duplicate outputs for key {key} in {path}")]
    DuplicateKey { key: String, path: PathBuf },

    #[error("invalid external table config in {path}: {source}")]
    ExternalConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid default vars file {path}: must be a json object of scalars")]
    InvalidDefaultVars { path: PathBuf },

    #[error("{path}: {source}")]
    Model {
        path: PathBuf,
        #[source]
        source: ModelError,
    },

    #[error(transparent)]
    Template(#[from] TemplateError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, LoadError>;

impl LoadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn model(path: impl Into<PathBuf>, source: ModelError) -> Self {
        Self::Model {
            path: path.into(),
            source,
        }
    }
}
