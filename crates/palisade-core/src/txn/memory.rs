use crate::{
    error::InternalError,
    instance::Instance,
    model::ModelDescriptor,
    request::Predicate,
    txn::{
        StoreError,
        driver::{StoreDriver, StoreTransaction},
    },
    types::Id,
};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

type RowMap = BTreeMap<(String, Id), Vec<u8>>;

///
/// MemoryStore
///
/// Reference driver: rows live in a BTreeMap as CBOR-encoded instances.
/// Transactions copy the map on begin and swap it back on commit, so a
/// rollback is simply dropping the working copy. Single-writer
/// semantics; this driver exists for tests and embedding, not for
/// contended production use.
///

pub struct MemoryStore {
    name: String,
    rows: Arc<Mutex<RowMap>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Number of durable rows, across all models.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.lock().expect("memory store mutex poisoned").len()
    }

    /// Decode one durable row outside any transaction, for assertions.
    #[must_use]
    pub fn durable_row(&self, model: &str, id: Id) -> Option<Instance> {
        let rows = self.rows.lock().expect("memory store mutex poisoned");
        rows.get(&(model.to_string(), id))
            .and_then(|bytes| serde_cbor::from_slice(bytes).ok())
    }
}

impl StoreDriver for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction>, InternalError> {
        let working = self
            .rows
            .lock()
            .expect("memory store mutex poisoned")
            .clone();

        Ok(Box::new(MemoryTransaction {
            store: self.name.clone(),
            shared: Arc::clone(&self.rows),
            working,
            done: false,
        }))
    }
}

///
/// MemoryTransaction
///

struct MemoryTransaction {
    store: String,
    shared: Arc<Mutex<RowMap>>,
    working: RowMap,
    done: bool,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> Result<(), InternalError> {
        if self.done {
            Err(StoreError::Backend {
                store: self.store.clone(),
                message: "transaction already resolved".to_string(),
            }
            .into())
        } else {
            Ok(())
        }
    }
}

impl StoreTransaction for MemoryTransaction {
    fn load(
        &mut self,
        model: &ModelDescriptor,
        filter: Option<&Predicate>,
    ) -> Result<Vec<Instance>, InternalError> {
        self.ensure_open()?;

        let mut rows = Vec::new();
        for ((row_model, _), bytes) in &self.working {
            if row_model != &model.name {
                continue;
            }
            let instance: Instance = serde_cbor::from_slice(bytes)
                .map_err(|err| StoreError::Codec(err.to_string()))?;
            if filter.is_none_or(|f| f.matches(&instance, &model.id_field.name)) {
                rows.push(instance);
            }
        }
        Ok(rows)
    }

    fn insert(&mut self, instance: &Instance) -> Result<(), InternalError> {
        self.ensure_open()?;

        let key = (instance.model.clone(), instance.id);
        if self.working.contains_key(&key) {
            return Err(StoreError::DuplicateRow {
                model: instance.model.clone(),
                id: instance.id,
            }
            .into());
        }

        let bytes =
            serde_cbor::to_vec(instance).map_err(|err| StoreError::Codec(err.to_string()))?;
        self.working.insert(key, bytes);
        Ok(())
    }

    fn update(&mut self, instance: &Instance) -> Result<(), InternalError> {
        self.ensure_open()?;

        let key = (instance.model.clone(), instance.id);
        if !self.working.contains_key(&key) {
            return Err(StoreError::RowNotFound {
                model: instance.model.clone(),
                id: instance.id,
            }
            .into());
        }

        let bytes =
            serde_cbor::to_vec(instance).map_err(|err| StoreError::Codec(err.to_string()))?;
        self.working.insert(key, bytes);
        Ok(())
    }

    fn delete(&mut self, model: &str, id: Id) -> Result<(), InternalError> {
        self.ensure_open()?;

        let key = (model.to_string(), id);
        if self.working.remove(&key).is_none() {
            return Err(StoreError::RowNotFound {
                model: model.to_string(),
                id,
            }
            .into());
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<(), InternalError> {
        self.ensure_open()?;

        let mut shared = self
            .shared
            .lock()
            .map_err(|_| StoreError::Backend {
                store: self.store.clone(),
                message: "memory store mutex poisoned".to_string(),
            })?;
        *shared = std::mem::take(&mut self.working);
        self.done = true;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), InternalError> {
        // dropping the working copy is the whole rollback
        self.working.clear();
        self.done = true;
        Ok(())
    }
}
