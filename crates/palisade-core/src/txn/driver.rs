use crate::{
    error::InternalError, instance::Instance, model::ModelDescriptor, request::Predicate,
    types::Id,
};
use std::{collections::BTreeMap, sync::Arc};

///
/// StoreDriver
///
/// One backend. Drivers are long-lived and shared; all per-request
/// work happens on the transaction they hand out.
///

pub trait StoreDriver: Send + Sync {
    /// Stable backend name, used for routing and partial-commit reports.
    fn name(&self) -> &str;

    /// Open a transaction scoped to one request.
    fn begin(&self) -> Result<Box<dyn StoreTransaction>, InternalError>;
}

///
/// StoreTransaction
///
/// Backend work inside one request. `load` returns rows satisfying the
/// filter in store order; ordering and paging are applied by the
/// transaction context after the write overlay, so a driver never sees
/// them. Staged mutations become durable only at `commit`.
///

pub trait StoreTransaction {
    fn load(
        &mut self,
        model: &ModelDescriptor,
        filter: Option<&Predicate>,
    ) -> Result<Vec<Instance>, InternalError>;

    fn insert(&mut self, instance: &Instance) -> Result<(), InternalError>;

    fn update(&mut self, instance: &Instance) -> Result<(), InternalError>;

    fn delete(&mut self, model: &str, id: Id) -> Result<(), InternalError>;

    fn commit(&mut self) -> Result<(), InternalError>;

    fn rollback(&mut self) -> Result<(), InternalError>;
}

///
/// StoreRouter
///
/// Model-name routing table over the registered drivers. Every model
/// resolves to exactly one driver; unrouted models use the default.
///

#[derive(Clone)]
pub struct StoreRouter {
    default: Arc<dyn StoreDriver>,
    routes: BTreeMap<String, Arc<dyn StoreDriver>>,
}

impl StoreRouter {
    #[must_use]
    pub fn new(default: Arc<dyn StoreDriver>) -> Self {
        Self {
            default,
            routes: BTreeMap::new(),
        }
    }

    /// Route one model to a specific driver.
    #[must_use]
    pub fn route(mut self, model: impl Into<String>, driver: Arc<dyn StoreDriver>) -> Self {
        self.routes.insert(model.into(), driver);
        self
    }

    #[must_use]
    pub fn driver_for(&self, model: &str) -> &Arc<dyn StoreDriver> {
        self.routes.get(model).unwrap_or(&self.default)
    }
}
