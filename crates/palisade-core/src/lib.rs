//! Core runtime for Palisade: model metadata, the request graph, the
//! authorization- and lifecycle-enforcing mediator, and the
//! transactional request executor.
#![warn(unreachable_pub)]

// public exports are one module level down
pub mod auth;
pub mod error;
pub mod executor;
pub mod hook;
pub mod instance;
pub mod mediator;
pub mod model;
pub mod obs;
pub mod registry;
pub mod request;
pub mod response;
pub mod txn;
pub mod types;
pub mod value;

///
/// CONSTANTS
///

/// Maximum hook re-entry depth through the mediator.
///
/// Cascading hooks are legal; unbounded hook-induced mutation cycles
/// are not. Exceeding this depth rolls the request back.
pub const MAX_HOOK_DEPTH: usize = 16;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No errors, executors, stores, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        auth::{DenyPolicy, Principal},
        instance::{Instance, RelationshipValue},
        model::{Cardinality, FieldKind, ModelDescriptor},
        request::{Predicate, Projection, Request, WriteSet},
        types::Id,
        value::Value,
    };
}
