mod predicate;
mod projection;
mod validate;
mod write;


pub use predicate::{CompareOp, ComparePredicate, Predicate};
pub use projection::{AttributeSelection, OrderDirection, OrderKey, Page, Projection};
pub use validate::{validate_args, validate_projection, validate_writes};
pub use write::{RefTarget, RelationshipAssignment, RelationshipTargets, WriteOp, WriteSet};

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use thiserror::Error as ThisError;

///
/// RequestError
/// Request-shape failures; all surface before a transaction opens.
///

#[derive(Debug, ThisError)]
pub enum RequestError {
    #[error("attribute '{model}.{field}' does not take argument '{arg}'")]
    UnknownArgument {
        model: String,
        field: String,
        arg: String,
    },

    #[error("attribute '{model}.{field}' requires argument '{arg}'")]
    MissingArgument {
        model: String,
        field: String,
        arg: String,
    },

    #[error("argument '{arg}' of '{model}.{field}' has the wrong kind")]
    ArgumentKindMismatch {
        model: String,
        field: String,
        arg: String,
    },

    #[error("value for '{model}.{field}' does not match its declared kind")]
    KindMismatch { model: String, field: String },

    #[error("predicate op {op:?} is not supported on '{model}.{field}'")]
    UnsupportedPredicate {
        model: String,
        field: String,
        op: CompareOp,
    },

    #[error("nested projection for '{model}.{relationship}' targets '{found}', expected '{expected}'")]
    RelationshipTargetMismatch {
        model: String,
        relationship: String,
        expected: String,
        found: String,
    },

    #[error("relationship '{model}.{relationship}' cardinality does not match the assignment")]
    CardinalityMismatch { model: String, relationship: String },

    #[error("temporary reference '{0}' declared twice")]
    DuplicateTempRef(String),

    #[error("temporary reference '{0}' does not resolve within this request")]
    UnknownTempRef(String),
}

impl RequestError {
    pub(crate) const fn class(&self) -> ErrorClass {
        ErrorClass::Validation
    }
}

impl From<RequestError> for InternalError {
    fn from(err: RequestError) -> Self {
        Self::new(err.class(), ErrorOrigin::Request, err.to_string())
    }
}

///
/// Request
/// The executor's single entry shape.
///

#[derive(Clone, Debug)]
pub enum Request {
    Read(Projection),
    Write {
        ops: WriteSet,
        /// Optional projection shaping the response; validated like a read.
        projection: Option<Projection>,
    },
}
