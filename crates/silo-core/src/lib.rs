//! Artifact model for the silo system.
//!
//! An [`artifact::Artifact`] is one managed warehouse entity: a dataset, a
//! table materialized from queries, a view, a load from local or
//! object-store data, an externally-configured table, a script-produced
//! table, or an extract. Artifacts expose a common capability set (key,
//! exists, mtime, should-update, is-running, create, depends-on, dump) that
//! the scheduler drives against the backend contracts.

pub mod artifact;
pub mod error;
pub mod format;
pub mod graph;
pub mod hashtag;
pub mod options;
pub mod schema;
pub mod text;

pub use artifact::Artifact;
pub use error::ModelError;
pub use graph::ArtifactGraph;
