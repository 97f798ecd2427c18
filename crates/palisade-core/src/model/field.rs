use crate::{auth::RuleSet, value::Value};
use serde::{Deserialize, Serialize};

///
/// FieldKind
///
/// Runtime type shape; a lossy projection of whatever the backend
/// natively stores, sufficient for validation and predicate checking.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Int,
    Uint,
    Float,
    Text,
    Id,
    Blob,
    List(Box<FieldKind>),
    Map,
}

impl FieldKind {
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::List(_) | Self::Map)
    }

    /// True when a value conforms to this kind. Null is admitted
    /// everywhere; absence semantics belong to the caller.
    #[must_use]
    pub fn admits(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) | (Self::Uint, Value::Uint(_)) => true,
            // signed literals for unsigned fields are fine when non-negative
            (Self::Uint, Value::Int(v)) => *v >= 0,
            (Self::Int, Value::Uint(v)) => *v <= i64::MAX as u64,
            (Self::Float, Value::Float(_) | Value::Int(_) | Value::Uint(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Id, Value::Id(_)) => true,
            (Self::Blob, Value::Blob(_)) => true,
            (Self::List(inner), Value::List(items)) => items.iter().all(|v| inner.admits(v)),
            (Self::Map, Value::Map(_)) => true,
            _ => false,
        }
    }
}

///
/// ArgSpec
/// Signature of one attribute-read argument.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ArgSpec {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
}

impl ArgSpec {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

///
/// FieldModel
/// Runtime field metadata used by validation and the mediator.
///

#[derive(Clone, Debug)]
pub struct FieldModel {
    pub name: String,
    pub kind: FieldKind,
    pub args: Vec<ArgSpec>,
    pub rules: RuleSet,
}

impl FieldModel {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            args: Vec::new(),
            rules: RuleSet::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<ArgSpec>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }
}
