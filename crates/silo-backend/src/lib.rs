//! Adapter contracts for the silo system.
//!
//! The reconcile engine never talks to a warehouse or object store directly;
//! it goes through the [`Warehouse`], [`ObjectStore`] and [`ScriptRunner`]
//! traits defined here. Wire types shared by all implementations live in
//! [`types`]; an in-memory implementation used by the test suites (and for
//! dry runs) lives in [`memory`].

pub mod error;
pub mod jobs;
pub mod memory;
pub mod script;
pub mod traits;
pub mod types;

pub use error::{BackendError, Result};
pub use traits::{ObjectStore, ScriptRunner, Session, Warehouse};
pub use types::TableId;
