mod driver;
mod memory;

#[cfg(test)]
mod tests;

pub use driver::{StoreDriver, StoreRouter, StoreTransaction};
pub use memory::MemoryStore;

use crate::{
    auth::EntityOperation,
    error::{ErrorClass, ErrorOrigin, InternalError},
    instance::{Instance, InstanceKey},
    registry::Registry,
    request::{OrderDirection, OrderKey, Page, Predicate},
    types::Id,
    value::{Value, strict_value_order},
};
use std::{collections::BTreeMap, fmt};
use thiserror::Error as ThisError;

///
/// TransactionError
///

#[derive(Debug, ThisError)]
pub enum TransactionError {
    #[error("cannot {op} a {state} transaction")]
    InvalidState { op: &'static str, state: TxnState },

    #[error("commit applied to [{}] but failed on '{failed}'", .committed.join(", "))]
    PartialCommit {
        committed: Vec<String>,
        failed: String,
    },

    #[error("instance '{model}:{id}' already staged in this transaction")]
    StagingConflict { model: String, id: Id },

    #[error("instance '{model}:{id}' is staged for deletion")]
    StagedDeleted { model: String, id: Id },
}

impl TransactionError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidState { .. } => ErrorClass::InvariantViolation,
            Self::PartialCommit { .. } | Self::StagingConflict { .. } | Self::StagedDeleted { .. } => {
                ErrorClass::Conflict
            }
        }
    }
}

impl From<TransactionError> for InternalError {
    fn from(err: TransactionError) -> Self {
        Self::new(err.class(), ErrorOrigin::Transaction, err.to_string())
    }
}

///
/// StoreError
/// Backend failures, wrapped on their way out of driver code.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("backend '{store}' failed: {message}")]
    Backend { store: String, message: String },

    #[error("row '{model}:{id}' already exists")]
    DuplicateRow { model: String, id: Id },

    #[error("row '{model}:{id}' not found")]
    RowNotFound { model: String, id: Id },

    #[error("row codec failure: {0}")]
    Codec(String),
}

impl StoreError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::Backend { .. } | Self::Codec(_) => ErrorClass::Internal,
            Self::DuplicateRow { .. } => ErrorClass::Conflict,
            Self::RowNotFound { .. } => ErrorClass::NotFound,
        }
    }
}

impl From<StoreError> for InternalError {
    fn from(err: StoreError) -> Self {
        Self::new(err.class(), ErrorOrigin::Store, err.to_string())
    }
}

///
/// TxnState
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TxnState {
    Active,
    Committed,
    RolledBack,
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
        };
        write!(f, "{label}")
    }
}

// Staging status of one tracked row. `was_created` survives deletion so
// a create-then-delete inside one request flushes nothing.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RowStatus {
    Clean,
    Created,
    Dirty,
    Deleted { was_created: bool },
}

#[derive(Debug)]
struct TrackedRow {
    instance: Instance,
    status: RowStatus,
}

///
/// TransactionContext
///
/// Request-scoped atomic boundary. Tracks every touched instance in an
/// identity map (change tracking plus read-your-writes), stages all
/// mutations, and resolves to exactly one of committed or rolled back.
/// Dropping an active context rolls its stores back.
///

pub struct TransactionContext<'r> {
    registry: &'r Registry,
    router: &'r StoreRouter,
    state: TxnState,
    open: Vec<(String, Box<dyn StoreTransaction>)>,
    touched: BTreeMap<InstanceKey, TrackedRow>,
    touch_order: Vec<InstanceKey>,
}

impl<'r> TransactionContext<'r> {
    /// Open the per-request transaction boundary. Store transactions
    /// open lazily on first touch of each backend.
    #[must_use]
    pub fn begin(registry: &'r Registry, router: &'r StoreRouter) -> Self {
        Self {
            registry,
            router,
            state: TxnState::Active,
            open: Vec::new(),
            touched: BTreeMap::new(),
            touch_order: Vec::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> TxnState {
        self.state
    }

    /// Allocate an identifier for an instance created in this request.
    pub fn allocate_id(&self) -> Result<Id, InternalError> {
        Id::generate().map_err(InternalError::from)
    }

    fn ensure_active(&self, op: &'static str) -> Result<(), InternalError> {
        if self.state == TxnState::Active {
            Ok(())
        } else {
            Err(TransactionError::InvalidState {
                op,
                state: self.state,
            }
            .into())
        }
    }

    fn store_for(&mut self, model: &str) -> Result<&mut dyn StoreTransaction, InternalError> {
        let driver = self.router.driver_for(model);
        let name = driver.name().to_string();

        if let Some(pos) = self.open.iter().position(|(n, _)| *n == name) {
            return Ok(self.open[pos].1.as_mut());
        }

        let txn = driver.begin()?;
        self.open.push((name, txn));
        Ok(self
            .open
            .last_mut()
            .expect("store transaction pushed above")
            .1
            .as_mut())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Load instances of one model. The store sees only the filter;
    /// staged writes are overlaid before ordering and paging so the
    /// request observes its own uncommitted mutations.
    pub fn load(
        &mut self,
        model: &str,
        filter: Option<&Predicate>,
        order: &[OrderKey],
        page: Option<Page>,
    ) -> Result<Vec<Instance>, InternalError> {
        self.ensure_active("load on")?;

        let registry = self.registry;
        let descriptor = registry.lookup(model)?;
        let id_field = descriptor.id_field.name.clone();

        let stored = self.store_for(model)?.load(descriptor, filter)?;

        let mut rows: Vec<Instance> = Vec::with_capacity(stored.len());
        for row in stored {
            match self.touched.get(&row.key()) {
                Some(tracked) => match tracked.status {
                    RowStatus::Deleted { .. } => {}
                    // staged version wins, but must still satisfy the filter
                    _ => {
                        let staged = tracked.instance.clone();
                        if filter.is_none_or(|f| f.matches(&staged, &id_field)) {
                            rows.push(staged);
                        }
                    }
                },
                None => rows.push(row),
            }
        }

        // staged creates (and staged updates the store has not seen as
        // matching) join the result set
        for (key, tracked) in &self.touched {
            if key.model != model {
                continue;
            }
            let visible = matches!(tracked.status, RowStatus::Created | RowStatus::Dirty);
            if !visible || rows.iter().any(|r| r.id == key.id) {
                continue;
            }
            if filter.is_none_or(|f| f.matches(&tracked.instance, &id_field)) {
                rows.push(tracked.instance.clone());
            }
        }

        sort_instances(&mut rows, order, &id_field);
        apply_page(&mut rows, page);

        // register loads in the identity map so later reads are stable
        for row in &rows {
            self.track_clean(row.clone());
        }

        Ok(rows)
    }

    /// Fetch one instance by id, honoring staged state.
    pub fn get(&mut self, model: &str, id: Id) -> Result<Option<Instance>, InternalError> {
        self.ensure_active("load on")?;

        let key = InstanceKey::new(model, id);
        if let Some(tracked) = self.touched.get(&key) {
            return Ok(match tracked.status {
                RowStatus::Deleted { .. } => None,
                _ => Some(tracked.instance.clone()),
            });
        }

        let registry = self.registry;
        let descriptor = registry.lookup(model)?;
        let id_field = descriptor.id_field.name.clone();
        let filter = Predicate::eq(id_field, Value::Id(id));

        let mut rows = self.store_for(model)?.load(descriptor, Some(&filter))?;
        let Some(row) = rows.pop() else {
            return Ok(None);
        };

        self.track_clean(row.clone());
        Ok(Some(row))
    }

    fn track_clean(&mut self, instance: Instance) {
        let key = instance.key();
        if !self.touched.contains_key(&key) {
            self.touch_order.push(key.clone());
            self.touched.insert(
                key,
                TrackedRow {
                    instance,
                    status: RowStatus::Clean,
                },
            );
        }
    }

    // ------------------------------------------------------------------
    // Staging
    // ------------------------------------------------------------------

    /// Stage a freshly created instance.
    pub fn stage_create(&mut self, instance: Instance) -> Result<(), InternalError> {
        self.ensure_active("stage on")?;

        let key = instance.key();
        if self.touched.contains_key(&key) {
            return Err(TransactionError::StagingConflict {
                model: key.model,
                id: key.id,
            }
            .into());
        }

        self.touch_order.push(key.clone());
        self.touched.insert(
            key,
            TrackedRow {
                instance,
                status: RowStatus::Created,
            },
        );
        Ok(())
    }

    /// Stage the current state of a mutated instance.
    pub fn stage_update(&mut self, instance: Instance) -> Result<(), InternalError> {
        self.ensure_active("stage on")?;

        let key = instance.key();
        match self.touched.get_mut(&key) {
            Some(tracked) => {
                if let RowStatus::Deleted { .. } = tracked.status {
                    return Err(TransactionError::StagedDeleted {
                        model: key.model,
                        id: key.id,
                    }
                    .into());
                }
                if tracked.status == RowStatus::Clean {
                    tracked.status = RowStatus::Dirty;
                }
                tracked.instance = instance;
            }
            None => {
                // first touch of a row loaded outside this context
                self.touch_order.push(key.clone());
                self.touched.insert(
                    key,
                    TrackedRow {
                        instance,
                        status: RowStatus::Dirty,
                    },
                );
            }
        }
        Ok(())
    }

    /// Stage a deletion.
    pub fn stage_delete(&mut self, key: &InstanceKey) -> Result<(), InternalError> {
        self.ensure_active("stage on")?;

        match self.touched.get_mut(key) {
            Some(tracked) => {
                let was_created = matches!(tracked.status, RowStatus::Created);
                tracked.status = RowStatus::Deleted { was_created };
            }
            None => {
                self.touch_order.push(key.clone());
                self.touched.insert(
                    key.clone(),
                    TrackedRow {
                        instance: Instance::new(key.model.clone(), key.id),
                        status: RowStatus::Deleted { was_created: false },
                    },
                );
            }
        }
        Ok(())
    }

    /// Mutations staged so far, in first-touch order. Drives pre-commit
    /// and post-commit hook fan-out in the executor.
    #[must_use]
    pub fn staged_mutations(&self) -> Vec<(InstanceKey, EntityOperation)> {
        self.touch_order
            .iter()
            .filter_map(|key| {
                let tracked = self.touched.get(key)?;
                let op = match tracked.status {
                    RowStatus::Clean => return None,
                    RowStatus::Created => EntityOperation::Create,
                    RowStatus::Dirty => EntityOperation::Update,
                    RowStatus::Deleted { was_created } => {
                        if was_created {
                            return None;
                        }
                        EntityOperation::Delete
                    }
                };
                Some((key.clone(), op))
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Resolution
    // ------------------------------------------------------------------

    /// Flush staged mutations and commit every touched backend as one
    /// unit. When a later backend fails after an earlier one committed,
    /// the inconsistency is surfaced as `PartialCommit` naming the
    /// committed backends; it is never swallowed.
    pub fn commit(&mut self) -> Result<(), InternalError> {
        self.ensure_active("commit")?;

        if let Err(err) = self.flush() {
            self.rollback_stores();
            self.state = TxnState::RolledBack;
            return Err(err);
        }

        let mut committed: Vec<String> = Vec::new();
        for index in 0..self.open.len() {
            let (name, txn) = &mut self.open[index];
            let name = name.clone();
            if let Err(err) = txn.commit() {
                // roll back whatever has not committed yet
                for (_, rest) in self.open.iter_mut().skip(index + 1) {
                    let _ = rest.rollback();
                }
                self.state = TxnState::RolledBack;

                if committed.is_empty() {
                    return Err(err);
                }
                return Err(TransactionError::PartialCommit {
                    committed,
                    failed: name,
                }
                .into());
            }
            committed.push(name);
        }

        self.state = TxnState::Committed;
        Ok(())
    }

    /// Discard all staged work. Safe with nothing staged; exactly-once
    /// with respect to `commit`.
    pub fn rollback(&mut self) -> Result<(), InternalError> {
        self.ensure_active("rollback")?;

        self.rollback_stores();
        self.touched.clear();
        self.touch_order.clear();
        self.state = TxnState::RolledBack;
        Ok(())
    }

    /// Resolve an active transaction without surfacing exactly-once
    /// errors; the executor's exit path uses this so early returns can
    /// never leak an open transaction.
    pub fn resolve_or_rollback(&mut self) {
        if self.state == TxnState::Active {
            let _ = self.rollback();
        }
    }

    fn flush(&mut self) -> Result<(), InternalError> {
        for key in self.touch_order.clone() {
            let Some(tracked) = self.touched.get(&key) else {
                continue;
            };
            let status = tracked.status;
            let instance = tracked.instance.clone();

            let store = self.store_for(&key.model)?;
            match status {
                RowStatus::Clean | RowStatus::Deleted { was_created: true } => {}
                RowStatus::Created => store.insert(&instance)?,
                RowStatus::Dirty => store.update(&instance)?,
                RowStatus::Deleted { was_created: false } => {
                    store.delete(&key.model, key.id)?;
                }
            }
        }
        Ok(())
    }

    fn rollback_stores(&mut self) {
        for (_, txn) in &mut self.open {
            let _ = txn.rollback();
        }
    }
}

impl Drop for TransactionContext<'_> {
    fn drop(&mut self) {
        // an executor must never leak an unresolved transaction
        if self.state == TxnState::Active {
            self.rollback_stores();
            self.state = TxnState::RolledBack;
        }
    }
}

/// Apply a page window in place.
pub(crate) fn apply_page(rows: &mut Vec<Instance>, page: Option<Page>) {
    let Some(page) = page else {
        return;
    };

    let offset = page.offset as usize;
    if offset >= rows.len() {
        rows.clear();
    } else {
        rows.drain(..offset);
    }
    if let Some(limit) = page.limit {
        rows.truncate(limit as usize);
    }
}

/// Sort rows by the order keys, id as the final tiebreak.
pub(crate) fn sort_instances(rows: &mut [Instance], order: &[OrderKey], id_field: &str) {
    if order.is_empty() {
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        return;
    }

    rows.sort_by(|a, b| {
        for key in order {
            let av = order_value(a, &key.field, id_field);
            let bv = order_value(b, &key.field, id_field);
            let ord = match key.direction {
                OrderDirection::Asc => strict_value_order(&av, &bv),
                OrderDirection::Desc => strict_value_order(&bv, &av),
            };
            if ord != std::cmp::Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    });
}

fn order_value(instance: &Instance, field: &str, id_field: &str) -> Value {
    if field == id_field {
        return Value::Id(instance.id);
    }
    instance.attribute(field).cloned().unwrap_or(Value::Null)
}
