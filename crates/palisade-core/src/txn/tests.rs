use crate::{
    error::{ErrorClass, InternalError},
    instance::{Instance, InstanceKey},
    model::{Cardinality, FieldKind, ModelDescriptor},
    registry::{Registry, RegistryBuilder},
    request::{OrderKey, Page, Predicate},
    txn::{
        MemoryStore, StoreDriver, StoreRouter, StoreTransaction, TransactionContext, TxnState,
    },
    value::Value,
};
use std::sync::Arc;

fn registry() -> Registry {
    let mut builder = RegistryBuilder::new();
    builder
        .register(
            ModelDescriptor::builder("Author")
                .attribute("name", FieldKind::Text)
                .build()
                .unwrap(),
        )
        .unwrap();
    builder
        .register(
            ModelDescriptor::builder("Article")
                .attribute("title", FieldKind::Text)
                .attribute("views", FieldKind::Uint)
                .relationship("author", "Author", Cardinality::ToOne)
                .build()
                .unwrap(),
        )
        .unwrap();
    builder.seal().unwrap()
}

fn article(title: &str, views: u64) -> Instance {
    let mut instance = Instance::new("Article", crate::types::Id::generate().unwrap());
    instance.set_attribute("title", Value::Text(title.into()));
    instance.set_attribute("views", Value::Uint(views));
    instance
}

#[test]
fn staged_creates_are_visible_before_commit() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(store);

    let mut txn = TransactionContext::begin(&registry, &router);
    let row = article("draft", 0);
    let id = row.id;
    txn.stage_create(row).unwrap();

    // read-your-writes: the uncommitted create is loadable
    let loaded = txn.get("Article", id).unwrap().unwrap();
    assert_eq!(loaded.attribute("title"), Some(&Value::Text("draft".into())));

    let all = txn.load("Article", None, &[], None).unwrap();
    assert_eq!(all.len(), 1);

    txn.commit().unwrap();
}

#[test]
fn commit_makes_rows_durable_and_rollback_does_not() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(Arc::clone(&store) as Arc<dyn StoreDriver>);

    {
        let mut txn = TransactionContext::begin(&registry, &router);
        txn.stage_create(article("kept", 1)).unwrap();
        txn.commit().unwrap();
        assert_eq!(txn.state(), TxnState::Committed);
    }
    assert_eq!(store.row_count(), 1);

    {
        let mut txn = TransactionContext::begin(&registry, &router);
        txn.stage_create(article("discarded", 2)).unwrap();
        txn.rollback().unwrap();
        assert_eq!(txn.state(), TxnState::RolledBack);
    }
    assert_eq!(store.row_count(), 1);
}

#[test]
fn resolution_is_exactly_once() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(store);

    let mut txn = TransactionContext::begin(&registry, &router);
    txn.rollback().unwrap();

    let err = txn.rollback().unwrap_err();
    assert_eq!(err.class, ErrorClass::InvariantViolation);

    let err = txn.commit().unwrap_err();
    assert_eq!(err.class, ErrorClass::InvariantViolation);

    let mut txn = TransactionContext::begin(&registry, &router);
    txn.commit().unwrap();
    assert!(txn.rollback().is_err());
}

#[test]
fn overlay_respects_filter_order_and_page() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(Arc::clone(&store) as Arc<dyn StoreDriver>);

    {
        let mut txn = TransactionContext::begin(&registry, &router);
        for (title, views) in [("a", 10), ("b", 20), ("c", 30)] {
            txn.stage_create(article(title, views)).unwrap();
        }
        txn.commit().unwrap();
    }

    let mut txn = TransactionContext::begin(&registry, &router);

    // stage an update that pulls "c" below the filter threshold and a
    // create that pushes a new row above it
    let c = txn
        .load("Article", Some(&Predicate::eq("title", Value::Text("c".into()))), &[], None)
        .unwrap()
        .pop()
        .unwrap();
    let mut c = c;
    c.set_attribute("views", Value::Uint(5));
    txn.stage_update(c).unwrap();
    txn.stage_create(article("d", 40)).unwrap();

    let filtered = txn
        .load(
            "Article",
            Some(&Predicate::gte("views", Value::Uint(15))),
            &[OrderKey::desc("views")],
            None,
        )
        .unwrap();

    let titles: Vec<_> = filtered
        .iter()
        .map(|r| r.attribute("title").unwrap().clone())
        .collect();
    assert_eq!(
        titles,
        vec![Value::Text("d".into()), Value::Text("b".into())]
    );

    // page window applies after the overlay
    let paged = txn
        .load(
            "Article",
            None,
            &[OrderKey::asc("views")],
            Some(Page::new(Some(2), 1)),
        )
        .unwrap();
    assert_eq!(paged.len(), 2);
    assert_eq!(paged[0].attribute("views"), Some(&Value::Uint(10)));
    assert_eq!(paged[1].attribute("views"), Some(&Value::Uint(20)));

    txn.rollback().unwrap();
}

#[test]
fn create_then_delete_flushes_nothing() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(Arc::clone(&store) as Arc<dyn StoreDriver>);

    let mut txn = TransactionContext::begin(&registry, &router);
    let row = article("ephemeral", 0);
    let key = row.key();
    txn.stage_create(row).unwrap();
    txn.stage_delete(&key).unwrap();
    assert!(txn.staged_mutations().is_empty());
    txn.commit().unwrap();

    assert_eq!(store.row_count(), 0);
}

#[test]
fn update_after_delete_is_a_conflict() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(store);

    let mut txn = TransactionContext::begin(&registry, &router);
    let row = article("gone", 0);
    let key = row.key();
    txn.stage_create(row.clone()).unwrap();
    txn.stage_delete(&key).unwrap();

    let err = txn.stage_update(row).unwrap_err();
    assert_eq!(err.class, ErrorClass::Conflict);
    txn.rollback().unwrap();
}

#[test]
fn dropping_an_active_context_rolls_back() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(Arc::clone(&store) as Arc<dyn StoreDriver>);

    {
        let mut txn = TransactionContext::begin(&registry, &router);
        txn.stage_create(article("leaked", 0)).unwrap();
        // dropped without resolution
    }
    assert_eq!(store.row_count(), 0);
}

///
/// FailingStore
/// Driver whose commit always fails; exercises multi-backend paths.
///

struct FailingStore {
    name: String,
}

struct FailingTransaction {
    name: String,
}

impl StoreDriver for FailingStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self) -> Result<Box<dyn StoreTransaction>, InternalError> {
        Ok(Box::new(FailingTransaction {
            name: self.name.clone(),
        }))
    }
}

impl StoreTransaction for FailingTransaction {
    fn load(
        &mut self,
        _model: &ModelDescriptor,
        _filter: Option<&Predicate>,
    ) -> Result<Vec<Instance>, InternalError> {
        Ok(Vec::new())
    }

    fn insert(&mut self, _instance: &Instance) -> Result<(), InternalError> {
        Ok(())
    }

    fn update(&mut self, _instance: &Instance) -> Result<(), InternalError> {
        Ok(())
    }

    fn delete(&mut self, _model: &str, _id: crate::types::Id) -> Result<(), InternalError> {
        Ok(())
    }

    fn commit(&mut self) -> Result<(), InternalError> {
        Err(crate::txn::StoreError::Backend {
            store: self.name.clone(),
            message: "commit refused".to_string(),
        }
        .into())
    }

    fn rollback(&mut self) -> Result<(), InternalError> {
        Ok(())
    }
}

#[test]
fn partial_commit_names_the_committed_backends() {
    let registry = registry();
    let primary = Arc::new(MemoryStore::new("primary"));
    let failing = Arc::new(FailingStore {
        name: "analytics".to_string(),
    });
    let router = StoreRouter::new(Arc::clone(&primary) as Arc<dyn StoreDriver>)
        .route("Author", failing);

    let mut txn = TransactionContext::begin(&registry, &router);
    txn.stage_create(article("multi", 1)).unwrap();

    let mut author = Instance::new("Author", crate::types::Id::generate().unwrap());
    author.set_attribute("name", Value::Text("X".into()));
    txn.stage_create(author).unwrap();

    let err = txn.commit().unwrap_err();
    assert_eq!(err.class, ErrorClass::Conflict);
    assert!(err.message.contains("primary"));
    assert!(err.message.contains("analytics"));
    assert_eq!(txn.state(), TxnState::RolledBack);
}

#[test]
fn single_backend_commit_failure_is_a_plain_rollback() {
    let registry = registry();
    let failing = Arc::new(FailingStore {
        name: "primary".to_string(),
    });
    let router = StoreRouter::new(failing);

    let mut txn = TransactionContext::begin(&registry, &router);
    let mut author = Instance::new("Author", crate::types::Id::generate().unwrap());
    author.set_attribute("name", Value::Text("X".into()));
    txn.stage_create(author).unwrap();

    let err = txn.commit().unwrap_err();
    assert_eq!(err.class, ErrorClass::Internal);
    assert_eq!(txn.state(), TxnState::RolledBack);
}

#[test]
fn staged_key_tracking_reports_operations() {
    let registry = registry();
    let store = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(Arc::clone(&store) as Arc<dyn StoreDriver>);

    let persisted = {
        let mut txn = TransactionContext::begin(&registry, &router);
        let row = article("steady", 7);
        let id = row.id;
        txn.stage_create(row).unwrap();
        txn.commit().unwrap();
        id
    };

    let mut txn = TransactionContext::begin(&registry, &router);
    let mut row = txn.get("Article", persisted).unwrap().unwrap();
    row.set_attribute("views", Value::Uint(8));
    txn.stage_update(row).unwrap();

    let staged = txn.staged_mutations();
    assert_eq!(staged.len(), 1);
    assert_eq!(staged[0].0, InstanceKey::new("Article", persisted));
    txn.rollback().unwrap();
}
