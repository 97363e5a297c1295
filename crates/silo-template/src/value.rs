//! Variable value types deserialized from `.vars` sidecars.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single scalar inside a list value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Str(String),
}

impl Scalar {
    /// Renders the scalar the way it will appear in query text.
    pub fn render(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Str(s) => s.clone(),
        }
    }

    /// Integer view of the scalar, accepting numeric strings.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Str(s) => s.trim().parse().ok(),
        }
    }
}

/// One value in a variables object: a scalar, or a list of scalars to
/// cross-product over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Int(i64),
    Str(String),
    List(Vec<Scalar>),
}

impl VarValue {
    pub fn from_str_value(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for VarValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// An unexploded variables object, keyed in sorted order so expansion is
/// deterministic.
pub type VarMap = BTreeMap<String, VarValue>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn untagged_deserialization() {
        let v: VarValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, VarValue::Int(3));

        let v: VarValue = serde_json::from_str(r#""x""#).unwrap();
        assert_eq!(v, VarValue::Str("x".into()));

        let v: VarValue = serde_json::from_str(r#"["a", -1]"#).unwrap();
        assert_eq!(
            v,
            VarValue::List(vec![Scalar::Str("a".into()), Scalar::Int(-1)])
        );
    }

    #[test]
    fn scalar_int_coercion() {
        assert_eq!(Scalar::Str("-3".into()).as_int(), Some(-3));
        assert_eq!(Scalar::Int(7).as_int(), Some(7));
        assert_eq!(Scalar::Str("abc".into()).as_int(), None);
    }
}
