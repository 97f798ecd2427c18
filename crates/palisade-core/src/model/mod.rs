mod descriptor;
mod document;
mod field;


pub use descriptor::{Cardinality, ModelBuilder, ModelDescriptor, RelationshipModel};
pub use document::ModelDocument;
pub use field::{ArgSpec, FieldKind, FieldModel};

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use thiserror::Error as ThisError;

///
/// ModelError
/// Descriptor construction and document-resolution failures.
///

#[derive(Debug, ThisError)]
pub enum ModelError {
    #[error("model '{model}' declares field '{field}' twice")]
    DuplicateField { model: String, field: String },

    #[error("model '{model}' declares relationship '{relationship}' twice")]
    DuplicateRelationship { model: String, relationship: String },

    #[error("model '{model}' uses '{name}' as both a field and a relationship")]
    FieldRelationshipClash { model: String, name: String },

    #[error("model '{model}' identifier field '{field}' must be scalar")]
    NonScalarIdField { model: String, field: String },

    #[error("model document parse failed: {0}")]
    Parse(String),
}

impl ModelError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Parse(_) => ErrorClass::Validation,
            _ => ErrorClass::InvariantViolation,
        }
    }
}

impl From<ModelError> for InternalError {
    fn from(err: ModelError) -> Self {
        Self::new(err.class(), ErrorOrigin::Registry, err.to_string())
    }
}
