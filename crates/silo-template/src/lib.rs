//! Template expansion for artifact definition files.
//!
//! A variables file is a JSON list of objects. Each object is overlaid with
//! defaults, date-macro keys are expanded against the current time,
//! list-valued keys are exploded into a cross-product of candidate
//! mappings, and `{name}` placeholders are then resolved recursively until
//! every value is concrete.

pub mod dates;
pub mod engine;
pub mod value;

pub use engine::{eval_tmpl_recurse, explode, keys_of_template, render};
pub use value::{Scalar, VarMap, VarValue};

/// Errors raised during template expansion.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    /// Placeholder resolution made no progress; the vars reference each
    /// other (or a key that does not exist).
    #[error("template vars {vars} contain a circular reference")]
    CircularReference {
        /// Debug rendering of the offending mapping.
        vars: String,
    },

    /// A date-macro key held a value of an unsupported shape.
    #[error("invalid date value for '{key}': must be an int, a 2-element int array, or a string")]
    InvalidDateValue { key: String },

    /// A date-derived key's value could not be parsed at its granularity.
    #[error("unable to format key/value {key}/{value}: {reason}")]
    DateFormat {
        key: String,
        value: String,
        reason: String,
    },

    /// A `{name}` placeholder had no binding at render time.
    #[error("missing template variable: {name}")]
    MissingVar { name: String },

    /// A template had a `{` without a matching `}`.
    #[error("unbalanced braces in template")]
    UnbalancedBraces,
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, TemplateError>;
