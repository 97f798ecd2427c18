//! Palisade — a model-mediated persistence gateway.
//!
//! ## Crate layout
//! - `core`: model metadata, the request graph, authorization rules,
//!   lifecycle hooks, the mediator, and the transactional executor.
//!
//! The `prelude` module mirrors the surface a host application uses to
//! register models, route stores, and execute requests.

pub use palisade_core as core;

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// the one-stop entry points
pub use palisade_core::{
    executor::RequestExecutor,
    registry::{Registry, RegistryBuilder},
    response::ResponseGraph,
    txn::{MemoryStore, StoreDriver, StoreRouter, StoreTransaction},
};

///
/// Host Prelude
///

pub mod prelude {
    pub use crate::core::prelude::*;
    pub use crate::core::{
        auth::{Check, CheckRegistry},
        hook::{Hook, HookRegistry},
    };
    pub use crate::{Registry, RegistryBuilder, RequestExecutor, ResponseGraph, StoreRouter};
}

#[cfg(test)]
mod tests {
    #[test]
    fn version_matches_the_workspace() {
        assert!(!super::VERSION.is_empty());
    }
}
