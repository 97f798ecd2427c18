use crate::{
    auth::{DenyAll, DenyPolicy, Principal, Redact, Redaction, RequireRole, RuleSet},
    error::ErrorClass,
    executor::RequestExecutor,
    hook::{FnHook, Hook, HookBinding, HookPhase, MutationEvent},
    mediator::HookContext,
    model::{Cardinality, FieldKind, FieldModel, ModelDescriptor},
    registry::{Registry, RegistryBuilder},
    request::{
        Predicate, Projection, RefTarget, RelationshipAssignment, Request, WriteOp, WriteSet,
    },
    response::Outcome,
    txn::{MemoryStore, StoreDriver, StoreRouter},
    types::Id,
    value::Value,
};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

fn author_model(name_rules: RuleSet) -> ModelDescriptor {
    ModelDescriptor::builder("Author")
        .attribute_model(FieldModel::new("name", FieldKind::Text).with_rules(name_rules))
        .build()
        .unwrap()
}

fn article_model() -> ModelDescriptor {
    ModelDescriptor::builder("Article")
        .attribute("title", FieldKind::Text)
        .attribute("views", FieldKind::Uint)
        .relationship("author", "Author", Cardinality::ToOne)
        .build()
        .unwrap()
}

fn registry_with(author: ModelDescriptor, article: ModelDescriptor) -> Registry {
    let mut builder = RegistryBuilder::new();
    builder.register(author).unwrap();
    builder.register(article).unwrap();
    builder.seal().unwrap()
}

fn seed(
    registry: &Registry,
    router: &StoreRouter,
) -> (Id, Id) {
    let principal = Principal::new("seed");
    let executor = RequestExecutor::new(registry, router.clone());

    let writes = WriteSet::new()
        .with(WriteOp::Create {
            temp_ref: "A1".into(),
            model: "Author".into(),
            attributes: vec![("name".into(), Value::Text("Ada".into()))],
            relationships: vec![],
        })
        .with(WriteOp::Create {
            temp_ref: "B1".into(),
            model: "Article".into(),
            attributes: vec![
                ("title".into(), Value::Text("Mediation".into())),
                ("views".into(), Value::Uint(7)),
            ],
            relationships: vec![RelationshipAssignment::to_one(
                "author",
                RefTarget::temp("A1"),
            )],
        });

    let response = executor
        .execute(&Request::Write {
            ops: writes,
            projection: None,
        }, &principal)
        .unwrap();

    assert_eq!(response.outcome, Outcome::Committed);
    let author_id = response.root[0].id;
    let article_id = response.root[1].id;
    (author_id, article_id)
}

#[test]
fn read_request_commits_and_mirrors_the_projection() {
    let registry = registry_with(author_model(RuleSet::new()), article_model());
    let router = StoreRouter::new(Arc::new(MemoryStore::new("primary")));
    let (_, article_id) = seed(&registry, &router);

    let executor = RequestExecutor::new(&registry, router.clone());
    let projection = Projection::new("Article")
        .attribute("title")
        .relationship("author", Projection::new("Author").attribute("name"))
        .target(article_id);

    let response = executor
        .execute(&Request::Read(projection), &Principal::new("u1"))
        .unwrap();

    assert_eq!(response.outcome, Outcome::Committed);
    let node = response.root.single().unwrap();
    assert_eq!(
        node.attribute("title"),
        Some(&Value::Text("Mediation".into()))
    );
    let author = node.relationship("author").unwrap().single().unwrap();
    assert_eq!(author.attribute("name"), Some(&Value::Text("Ada".into())));
}

#[test]
fn denied_nested_field_is_omitted_but_siblings_survive() {
    // Author.name denied for everyone without the editor role
    let registry = registry_with(
        author_model(RuleSet::new().with(RequireRole("editor".into()))),
        article_model(),
    );
    let router = StoreRouter::new(Arc::new(MemoryStore::new("primary")));
    let (_, article_id) = seed(&registry, &router);

    let executor =
        RequestExecutor::new(&registry, router.clone()).policy(DenyPolicy::OmitField);
    let projection = Projection::new("Article")
        .attribute("title")
        .relationship("author", Projection::new("Author").attribute("name"))
        .target(article_id);

    let response = executor
        .execute(&Request::Read(projection.clone()), &Principal::new("u1"))
        .unwrap();

    assert_eq!(response.outcome, Outcome::Committed);
    let node = response.root.single().unwrap();
    assert_eq!(
        node.attribute("title"),
        Some(&Value::Text("Mediation".into()))
    );
    let author = node.relationship("author").unwrap().single().unwrap();
    assert!(author.omits("name"));

    // same request under the fail-closed policy aborts instead
    let strict = RequestExecutor::new(&registry, router.clone());
    let err = strict
        .execute(&Request::Read(projection), &Principal::new("u1"))
        .unwrap_err();
    assert_eq!(err.class, ErrorClass::Forbidden);

    // and an editor reads the field either way
    let response = executor
        .execute(
            &Request::Read(
                Projection::new("Article")
                    .relationship("author", Projection::new("Author").attribute("name"))
                    .target(article_id),
            ),
            &Principal::new("u2").with_role("editor"),
        )
        .unwrap();
    let author = response.root.single().unwrap().relationship("author").unwrap();
    assert_eq!(
        author.single().unwrap().attribute("name"),
        Some(&Value::Text("Ada".into()))
    );
}

#[test]
fn masked_fields_render_null_rather_than_disappearing() {
    let registry = registry_with(
        author_model(RuleSet::new().with(Redact(Redaction::Mask))),
        article_model(),
    );
    let router = StoreRouter::new(Arc::new(MemoryStore::new("primary")));
    let (author_id, _) = seed(&registry, &router);

    let executor = RequestExecutor::new(&registry, router.clone());
    let response = executor
        .execute(
            &Request::Read(Projection::new("Author").attribute("name").target(author_id)),
            &Principal::new("u1"),
        )
        .unwrap();

    let node = response.root.single().unwrap();
    assert_eq!(node.attribute("name"), Some(&Value::Null));
}

#[test]
fn forward_references_wire_regardless_of_declaration_order() {
    let registry = registry_with(author_model(RuleSet::new()), article_model());
    let router = StoreRouter::new(Arc::new(MemoryStore::new("primary")));
    let principal = Principal::new("u1");
    let executor = RequestExecutor::new(&registry, router.clone());

    // Article declared before the Author it references
    let writes = WriteSet::new()
        .with(WriteOp::Create {
            temp_ref: "B1".into(),
            model: "Article".into(),
            attributes: vec![("title".into(), Value::Text("Y".into()))],
            relationships: vec![RelationshipAssignment::to_one(
                "author",
                RefTarget::temp("A1"),
            )],
        })
        .with(WriteOp::Create {
            temp_ref: "A1".into(),
            model: "Author".into(),
            attributes: vec![("name".into(), Value::Text("X".into()))],
            relationships: vec![],
        });

    let projection = Projection::new("Article")
        .attribute("title")
        .relationship("author", Projection::new("Author").attribute("name"));

    let response = executor
        .execute(
            &Request::Write {
                ops: writes,
                projection: Some(projection),
            },
            &principal,
        )
        .unwrap();

    assert_eq!(response.outcome, Outcome::Committed);

    // the persisted relationship resolves to the real Author id, not
    // the temporary reference
    let node = response.root.single().unwrap();
    let author_node = node.relationship("author").unwrap().single().unwrap();
    assert_eq!(
        author_node.attribute("name"),
        Some(&Value::Text("X".into()))
    );
    assert_eq!(author_node.model, "Author");
}

#[test]
fn writes_are_readable_in_the_same_request_before_commit() {
    let registry = registry_with(author_model(RuleSet::new()), article_model());
    let router = StoreRouter::new(Arc::new(MemoryStore::new("primary")));

    let executor = RequestExecutor::new(&registry, router.clone());
    let writes = WriteSet::new().with(WriteOp::Create {
        temp_ref: "B1".into(),
        model: "Article".into(),
        attributes: vec![("title".into(), Value::Text("fresh".into()))],
        relationships: vec![],
    });

    // the projection walk runs before commit; it must see the create
    let response = executor
        .execute(
            &Request::Write {
                ops: writes,
                projection: Some(
                    Projection::new("Article")
                        .attribute("title")
                        .filter(Predicate::eq("title", Value::Text("fresh".into()))),
                ),
            },
            &Principal::new("u1"),
        )
        .unwrap();

    assert_eq!(response.root.len(), 1);
    assert_eq!(
        response.root[0].attribute("title"),
        Some(&Value::Text("fresh".into()))
    );
}

#[test]
fn validation_failure_opens_no_transaction() {
    ///
    /// CountingDriver
    /// Records whether a transaction was ever opened.
    ///
    struct CountingDriver {
        opened: Arc<AtomicUsize>,
    }

    impl StoreDriver for CountingDriver {
        fn name(&self) -> &str {
            "counting"
        }

        fn begin(
            &self,
        ) -> Result<Box<dyn crate::txn::StoreTransaction>, crate::error::InternalError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Err(crate::error::InternalError::store_internal("unreachable"))
        }
    }

    let registry = registry_with(author_model(RuleSet::new()), article_model());
    let opened = Arc::new(AtomicUsize::new(0));
    let router = StoreRouter::new(Arc::new(CountingDriver {
        opened: Arc::clone(&opened),
    }));
    let executor = RequestExecutor::new(&registry, router);

    let err = executor
        .execute(
            &Request::Read(Projection::new("Article").attribute("ghost")),
            &Principal::new("u1"),
        )
        .unwrap_err();

    assert_eq!(err.class, ErrorClass::NotFound);
    assert_eq!(opened.load(Ordering::SeqCst), 0);
}

#[test]
fn entity_create_denial_rolls_the_whole_request_back() {
    let article = ModelDescriptor::builder("Article")
        .attribute("title", FieldKind::Text)
        .attribute("views", FieldKind::Uint)
        .relationship("author", "Author", Cardinality::ToOne)
        .create_rule(DenyAll)
        .build()
        .unwrap();
    let registry = registry_with(author_model(RuleSet::new()), article);
    let primary = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(Arc::clone(&primary) as Arc<dyn StoreDriver>);
    let executor = RequestExecutor::new(&registry, router);

    // the Author create precedes the denied Article create; rollback
    // must discard it too
    let writes = WriteSet::new()
        .with(WriteOp::Create {
            temp_ref: "A1".into(),
            model: "Author".into(),
            attributes: vec![("name".into(), Value::Text("X".into()))],
            relationships: vec![],
        })
        .with(WriteOp::Create {
            temp_ref: "B1".into(),
            model: "Article".into(),
            attributes: vec![],
            relationships: vec![],
        });

    let err = executor
        .execute(
            &Request::Write {
                ops: writes,
                projection: None,
            },
            &Principal::new("u1"),
        )
        .unwrap_err();

    assert_eq!(err.class, ErrorClass::Forbidden);
    assert_eq!(primary.row_count(), 0);
}

#[test]
fn pre_commit_hook_failure_rolls_back() {
    let failing: Arc<dyn Hook> = Arc::new(FnHook(
        |_: &MutationEvent, _: &mut HookContext<'_>| {
            Err(crate::error::InternalError::store_internal("refused"))
        },
    ));

    let article = ModelDescriptor::builder("Article")
        .attribute("title", FieldKind::Text)
        .attribute("views", FieldKind::Uint)
        .relationship("author", "Author", Cardinality::ToOne)
        .hook(HookBinding::entity(HookPhase::PreCommit, failing))
        .build()
        .unwrap();
    let registry = registry_with(author_model(RuleSet::new()), article);
    let primary = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(Arc::clone(&primary) as Arc<dyn StoreDriver>);
    let executor = RequestExecutor::new(&registry, router);

    let err = executor
        .execute(
            &Request::Write {
                ops: WriteSet::new().with(WriteOp::Create {
                    temp_ref: "B1".into(),
                    model: "Article".into(),
                    attributes: vec![],
                    relationships: vec![],
                }),
                projection: None,
            },
            &Principal::new("u1"),
        )
        .unwrap_err();

    assert_eq!(err.class, ErrorClass::Internal);
    assert_eq!(primary.row_count(), 0);
}

#[test]
fn post_commit_hook_failure_is_reported_but_does_not_undo_the_commit() {
    let attempts = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&attempts);
    let failing: Arc<dyn Hook> = Arc::new(FnHook(
        move |_: &MutationEvent, _: &mut HookContext<'_>| {
            *counter.lock().unwrap() += 1;
            Err(crate::error::InternalError::store_internal(
                "notification endpoint down",
            ))
        },
    ));

    let article = ModelDescriptor::builder("Article")
        .attribute("title", FieldKind::Text)
        .attribute("views", FieldKind::Uint)
        .relationship("author", "Author", Cardinality::ToOne)
        .hook(HookBinding::entity(HookPhase::PostCommit, failing))
        .build()
        .unwrap();
    let registry = registry_with(author_model(RuleSet::new()), article);
    let primary = Arc::new(MemoryStore::new("primary"));
    let router = StoreRouter::new(Arc::clone(&primary) as Arc<dyn StoreDriver>);
    let executor = RequestExecutor::new(&registry, router);

    let response = executor
        .execute(
            &Request::Write {
                ops: WriteSet::new().with(WriteOp::Create {
                    temp_ref: "B1".into(),
                    model: "Article".into(),
                    attributes: vec![("title".into(), Value::Text("kept".into()))],
                    relationships: vec![],
                }),
                projection: None,
            },
            &Principal::new("u1"),
        )
        .unwrap();

    assert_eq!(response.outcome, Outcome::Committed);
    assert_eq!(response.notes.len(), 1);
    assert!(response.notes[0].message.contains("notification"));
    assert_eq!(*attempts.lock().unwrap(), 1);
    assert_eq!(primary.row_count(), 1);
}

#[test]
fn collection_reads_honor_filter_order_and_page() {
    let registry = registry_with(author_model(RuleSet::new()), article_model());
    let router = StoreRouter::new(Arc::new(MemoryStore::new("primary")));
    let executor = RequestExecutor::new(&registry, router.clone());
    let principal = Principal::new("u1");

    let mut writes = WriteSet::new();
    for (i, views) in [30u64, 10, 20, 40].iter().enumerate() {
        writes.push(WriteOp::Create {
            temp_ref: format!("B{i}"),
            model: "Article".into(),
            attributes: vec![
                ("title".into(), Value::Text(format!("a{i}"))),
                ("views".into(), Value::Uint(*views)),
            ],
            relationships: vec![],
        });
    }
    executor
        .execute(&Request::Write { ops: writes, projection: None }, &principal)
        .unwrap();

    let projection = Projection::new("Article")
        .attribute("views")
        .filter(Predicate::gte("views", Value::Uint(20)))
        .order_by(crate::request::OrderKey::desc("views"))
        .page(crate::request::Page::new(Some(2), 0));

    let response = executor
        .execute(&Request::Read(projection), &principal)
        .unwrap();

    let views: Vec<_> = response
        .root
        .iter()
        .map(|node| node.attribute("views").unwrap().clone())
        .collect();
    assert_eq!(views, vec![Value::Uint(40), Value::Uint(30)]);
}

#[test]
fn update_and_delete_round_trip() {
    let registry = registry_with(author_model(RuleSet::new()), article_model());
    let router = StoreRouter::new(Arc::new(MemoryStore::new("primary")));
    let (author_id, article_id) = seed(&registry, &router);
    let executor = RequestExecutor::new(&registry, router.clone());
    let principal = Principal::new("u1");

    let response = executor
        .execute(
            &Request::Write {
                ops: WriteSet::new().with(WriteOp::Update {
                    model: "Article".into(),
                    target: RefTarget::Persisted(article_id),
                    attributes: vec![("title".into(), Value::Text("Renamed".into()))],
                    relationships: vec![],
                }),
                projection: Some(Projection::new("Article").attribute("title").target(article_id)),
            },
            &principal,
        )
        .unwrap();
    assert_eq!(
        response.root.single().unwrap().attribute("title"),
        Some(&Value::Text("Renamed".into()))
    );

    executor
        .execute(
            &Request::Write {
                ops: WriteSet::new().with(WriteOp::Delete {
                    model: "Article".into(),
                    target: RefTarget::Persisted(article_id),
                }),
                projection: None,
            },
            &principal,
        )
        .unwrap();

    let err = executor
        .execute(
            &Request::Read(Projection::new("Article").attribute("title").target(article_id)),
            &principal,
        )
        .unwrap_err();
    assert_eq!(err.class, ErrorClass::NotFound);

    // the author survives its article
    let response = executor
        .execute(
            &Request::Read(Projection::new("Author").attribute("name").target(author_id)),
            &principal,
        )
        .unwrap();
    assert_eq!(response.root.len(), 1);
}
