
use crate::{
    MAX_HOOK_DEPTH,
    auth::{AuthError, CheckContext, Decision, EntityOperation, Principal, Redaction},
    error::{ErrorClass, ErrorOrigin, InternalError},
    hook::{HookError, HookPhase, MutationEvent},
    instance::{Instance, InstanceKey, RelationshipValue},
    registry::Registry,
    request::{RequestError, validate_args},
    txn::TransactionContext,
    types::Id,
    value::Value,
};
use thiserror::Error as ThisError;

///
/// MediatorError
///

#[derive(Debug, ThisError)]
pub enum MediatorError {
    #[error("instance '{model}:{id}' not found")]
    InstanceNotFound { model: String, id: Id },

    #[error("relationship '{model}.{name}' target '{target}:{id}' not found")]
    DanglingRelationship {
        model: String,
        name: String,
        target: String,
        id: Id,
    },
}

impl MediatorError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::InstanceNotFound { .. } | Self::DanglingRelationship { .. } => {
                ErrorClass::NotFound
            }
        }
    }
}

impl From<MediatorError> for InternalError {
    fn from(err: MediatorError) -> Self {
        Self::new(err.class(), ErrorOrigin::Mediator, err.to_string())
    }
}

///
/// FieldRead
/// Outcome of a mediated attribute read. Policy (omit vs abort) is the
/// caller's concern; the mediator only decides.
///

#[derive(Clone, Debug, PartialEq)]
pub enum FieldRead {
    Value(Value),
    Redacted(Redaction),
    Denied,
}

///
/// RelationshipRead
///

#[derive(Clone, Debug, PartialEq)]
pub enum RelationshipRead {
    Related(RelationshipValue),
    Redacted(Redaction),
    Denied,
}

///
/// MediatorOps
///
/// The mediation surface hooks re-enter through. Object-safe so a hook
/// context can carry it without dragging mediator lifetimes along.
///

pub trait MediatorOps {
    fn read_attribute(
        &mut self,
        key: &InstanceKey,
        name: &str,
        args: &[(String, Value)],
    ) -> Result<FieldRead, InternalError>;

    fn write_attribute(
        &mut self,
        key: &InstanceKey,
        name: &str,
        value: Value,
    ) -> Result<(), InternalError>;

    fn write_relationship(
        &mut self,
        key: &InstanceKey,
        name: &str,
        value: RelationshipValue,
    ) -> Result<(), InternalError>;

    fn create_instance(
        &mut self,
        model: &str,
        attributes: Vec<(String, Value)>,
    ) -> Result<Instance, InternalError>;

    fn delete_instance(&mut self, key: &InstanceKey) -> Result<(), InternalError>;

    fn get(&mut self, key: &InstanceKey) -> Result<Option<Instance>, InternalError>;
}

///
/// HookContext
/// Re-entry handle handed to every hook invocation.
///

pub struct HookContext<'c> {
    mediator: &'c mut dyn MediatorOps,
}

impl HookContext<'_> {
    pub fn read_attribute(
        &mut self,
        key: &InstanceKey,
        name: &str,
        args: &[(String, Value)],
    ) -> Result<FieldRead, InternalError> {
        self.mediator.read_attribute(key, name, args)
    }

    pub fn write_attribute(
        &mut self,
        key: &InstanceKey,
        name: &str,
        value: Value,
    ) -> Result<(), InternalError> {
        self.mediator.write_attribute(key, name, value)
    }

    pub fn write_relationship(
        &mut self,
        key: &InstanceKey,
        name: &str,
        value: RelationshipValue,
    ) -> Result<(), InternalError> {
        self.mediator.write_relationship(key, name, value)
    }

    pub fn create_instance(
        &mut self,
        model: &str,
        attributes: Vec<(String, Value)>,
    ) -> Result<Instance, InternalError> {
        self.mediator.create_instance(model, attributes)
    }

    pub fn delete_instance(&mut self, key: &InstanceKey) -> Result<(), InternalError> {
        self.mediator.delete_instance(key)
    }

    pub fn get(&mut self, key: &InstanceKey) -> Result<Option<Instance>, InternalError> {
        self.mediator.get(key)
    }
}

///
/// Mediator
///
/// The sole path through which instance fields move during a request.
/// Per operation: authorization gate first, lifecycle hooks second,
/// staged store work last; a Deny short-circuits before any hook can
/// observe work that will not happen. Hook re-entry recurses through
/// `MediatorOps` and is bounded by `MAX_HOOK_DEPTH`.
///

pub struct Mediator<'t, 'r> {
    registry: &'r Registry,
    principal: &'t Principal,
    txn: &'t mut TransactionContext<'r>,
    depth: usize,
}

impl<'t, 'r> Mediator<'t, 'r> {
    #[must_use]
    pub fn new(
        registry: &'r Registry,
        principal: &'t Principal,
        txn: &'t mut TransactionContext<'r>,
    ) -> Self {
        Self {
            registry,
            principal,
            txn,
            depth: 0,
        }
    }

    #[must_use]
    pub const fn transaction(&mut self) -> &mut TransactionContext<'r> {
        self.txn
    }

    // ------------------------------------------------------------------
    // Entity-level gates
    // ------------------------------------------------------------------

    /// Entity-level rule decision for an operation on a concrete
    /// instance (or none, for creates).
    pub fn entity_decision(
        &self,
        model: &str,
        op: EntityOperation,
        instance: Option<&Instance>,
    ) -> Result<Decision, InternalError> {
        let descriptor = self.registry.lookup(model)?;
        let cx = CheckContext {
            principal: self.principal,
            model,
            field: None,
            instance,
        };
        Ok(descriptor.entity_rules.for_operation(op).evaluate(&cx))
    }

    fn require_entity(
        &self,
        model: &str,
        op: EntityOperation,
        instance: Option<&Instance>,
    ) -> Result<(), InternalError> {
        match self.entity_decision(model, op, instance)? {
            Decision::Allow => Ok(()),
            // a redacted entity is not writable/deletable
            Decision::Deny | Decision::Filter(_) => Err(AuthError::EntityDenied {
                model: model.to_string(),
                op,
            }
            .into()),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn read_attribute(
        &mut self,
        key: &InstanceKey,
        name: &str,
        args: &[(String, Value)],
    ) -> Result<FieldRead, InternalError> {
        let registry = self.registry;
        let field = registry.resolve_field(&key.model, name)?;
        validate_args(&key.model, field, args).map_err(InternalError::from)?;

        let instance = self.require_instance(key)?;
        let decision = field.rules.evaluate(&CheckContext {
            principal: self.principal,
            model: &key.model,
            field: Some(name),
            instance: Some(&instance),
        });

        match decision {
            Decision::Deny => Ok(FieldRead::Denied),
            Decision::Filter(redaction) => Ok(FieldRead::Redacted(redaction)),
            Decision::Allow => {
                let event = MutationEvent::field(EntityOperation::Read, &*key.model, key.id, name)
                    .with_args(args.to_vec());
                self.run_hooks(HookPhase::PreRead, &key.model, Some(name), &event)?;

                // a pre-read hook may have restaged the value
                let instance = self.require_instance(key)?;
                Ok(FieldRead::Value(
                    instance.attribute(name).cloned().unwrap_or(Value::Null),
                ))
            }
        }
    }

    pub fn read_relationship(
        &mut self,
        key: &InstanceKey,
        name: &str,
    ) -> Result<RelationshipRead, InternalError> {
        let registry = self.registry;
        let relationship = registry.resolve_relationship(&key.model, name)?;

        let instance = self.require_instance(key)?;
        let decision = relationship.rules.evaluate(&CheckContext {
            principal: self.principal,
            model: &key.model,
            field: Some(name),
            instance: Some(&instance),
        });

        match decision {
            Decision::Deny => Ok(RelationshipRead::Denied),
            Decision::Filter(redaction) => Ok(RelationshipRead::Redacted(redaction)),
            Decision::Allow => {
                let event = MutationEvent::field(EntityOperation::Read, &*key.model, key.id, name);
                self.run_hooks(HookPhase::PreRead, &key.model, Some(name), &event)?;

                let instance = self.require_instance(key)?;
                let value = instance.relationship(name).cloned().unwrap_or_else(|| {
                    match relationship.cardinality {
                        crate::model::Cardinality::ToOne => RelationshipValue::ToOne(None),
                        crate::model::Cardinality::ToMany => RelationshipValue::ToMany(Vec::new()),
                    }
                });
                Ok(RelationshipRead::Related(value))
            }
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn write_attribute(
        &mut self,
        key: &InstanceKey,
        name: &str,
        value: Value,
    ) -> Result<(), InternalError> {
        let registry = self.registry;
        let field = registry.resolve_field(&key.model, name)?;
        if !field.kind.admits(&value) {
            return Err(RequestError::KindMismatch {
                model: key.model.clone(),
                field: name.to_string(),
            }
            .into());
        }

        let mut instance = self.require_instance(key)?;
        self.require_entity(&key.model, EntityOperation::Update, Some(&instance))?;
        self.require_field_writable(&key.model, name, &field.rules, &instance)?;

        let event = MutationEvent::field(EntityOperation::Update, &*key.model, key.id, name);
        self.run_hooks(HookPhase::PreUpdate, &key.model, Some(name), &event)?;

        instance.set_attribute(name, value);
        self.txn.stage_update(instance)
    }

    pub fn write_relationship(
        &mut self,
        key: &InstanceKey,
        name: &str,
        value: RelationshipValue,
    ) -> Result<(), InternalError> {
        let registry = self.registry;
        let relationship = registry.resolve_relationship(&key.model, name)?;

        let matches_cardinality = matches!(
            (&value, relationship.cardinality),
            (RelationshipValue::ToOne(_), crate::model::Cardinality::ToOne)
                | (RelationshipValue::ToMany(_), crate::model::Cardinality::ToMany)
        );
        if !matches_cardinality {
            return Err(RequestError::CardinalityMismatch {
                model: key.model.clone(),
                relationship: name.to_string(),
            }
            .into());
        }

        // linkage requires every referenced instance to exist
        let target_model = relationship.target.clone();
        for id in value.ids() {
            if self.txn.get(&target_model, id)?.is_none() {
                return Err(MediatorError::DanglingRelationship {
                    model: key.model.clone(),
                    name: name.to_string(),
                    target: target_model,
                    id,
                }
                .into());
            }
        }

        let mut instance = self.require_instance(key)?;
        self.require_entity(&key.model, EntityOperation::Update, Some(&instance))?;
        self.require_field_writable(&key.model, name, &relationship.rules, &instance)?;

        let event = MutationEvent::field(EntityOperation::Update, &*key.model, key.id, name);
        self.run_hooks(HookPhase::PreUpdate, &key.model, Some(name), &event)?;

        instance.set_relationship(name, value);
        self.txn.stage_update(instance)
    }

    pub fn create_instance(
        &mut self,
        model: &str,
        attributes: Vec<(String, Value)>,
    ) -> Result<Instance, InternalError> {
        let registry = self.registry;
        let descriptor = registry.lookup(model)?;

        self.require_entity(model, EntityOperation::Create, None)?;

        let mut instance = Instance::new(model, self.txn.allocate_id()?);
        for (name, value) in attributes {
            let field = descriptor
                .field(&name)
                .ok_or_else(|| crate::registry::RegistryError::UnknownField {
                    model: model.to_string(),
                    field: name.clone(),
                })?;
            if !field.kind.admits(&value) {
                return Err(RequestError::KindMismatch {
                    model: model.to_string(),
                    field: name,
                }
                .into());
            }
            instance.set_attribute(name, value);
        }

        self.txn.stage_create(instance.clone())?;

        // hooks observe the staged instance and may refine it
        let event = MutationEvent::entity(EntityOperation::Create, model, instance.id);
        self.run_hooks(HookPhase::PreCreate, model, None, &event)?;

        let refined = self
            .txn
            .get(model, instance.id)?
            .ok_or(MediatorError::InstanceNotFound {
                model: model.to_string(),
                id: instance.id,
            })?;
        Ok(refined)
    }

    pub fn delete_instance(&mut self, key: &InstanceKey) -> Result<(), InternalError> {
        let instance = self.require_instance(key)?;
        self.require_entity(&key.model, EntityOperation::Delete, Some(&instance))?;

        let event = MutationEvent::entity(EntityOperation::Delete, &*key.model, key.id);
        self.run_hooks(HookPhase::PreDelete, &key.model, None, &event)?;

        self.txn.stage_delete(key)
    }

    // ------------------------------------------------------------------
    // Lifecycle fan-out
    // ------------------------------------------------------------------

    /// Fire entity-scoped hooks of one phase for a staged mutation.
    /// The executor drives this for PreCommit and PostCommit.
    pub fn run_lifecycle(
        &mut self,
        phase: HookPhase,
        key: &InstanceKey,
        op: EntityOperation,
    ) -> Result<(), InternalError> {
        let event = MutationEvent::entity(op, &*key.model, key.id);
        self.run_hooks(phase, &key.model, None, &event)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn require_instance(&mut self, key: &InstanceKey) -> Result<Instance, InternalError> {
        self.txn
            .get(&key.model, key.id)?
            .ok_or_else(|| {
                MediatorError::InstanceNotFound {
                    model: key.model.clone(),
                    id: key.id,
                }
                .into()
            })
    }

    fn require_field_writable(
        &self,
        model: &str,
        field: &str,
        rules: &crate::auth::RuleSet,
        instance: &Instance,
    ) -> Result<(), InternalError> {
        let cx = CheckContext {
            principal: self.principal,
            model,
            field: Some(field),
            instance: Some(instance),
        };
        match rules.evaluate(&cx) {
            Decision::Allow => Ok(()),
            // writes never pass through a redaction
            Decision::Deny | Decision::Filter(_) => Err(AuthError::FieldDenied {
                model: model.to_string(),
                field: field.to_string(),
            }
            .into()),
        }
    }

    fn run_hooks(
        &mut self,
        phase: HookPhase,
        model: &str,
        field: Option<&str>,
        event: &MutationEvent,
    ) -> Result<(), InternalError> {
        let registry = self.registry;
        let descriptor = registry.lookup(model)?;
        let hooks: Vec<_> = descriptor
            .hooks_for(phase, field)
            .map(|binding| binding.hook.clone())
            .collect();
        if hooks.is_empty() {
            return Ok(());
        }

        if self.depth >= MAX_HOOK_DEPTH {
            return Err(HookError::DepthExceeded { depth: self.depth }.into());
        }

        self.depth += 1;
        let mut result = Ok(());
        for hook in hooks {
            let mut cx = HookContext {
                mediator: &mut *self,
            };
            if let Err(err) = hook.invoke(event, &mut cx) {
                result = Err(if err.origin == ErrorOrigin::Hook {
                    err
                } else {
                    InternalError::from(HookError::Failed {
                        phase,
                        message: err.to_string(),
                    })
                });
                break;
            }
        }
        self.depth -= 1;
        result
    }
}

impl MediatorOps for Mediator<'_, '_> {
    fn read_attribute(
        &mut self,
        key: &InstanceKey,
        name: &str,
        args: &[(String, Value)],
    ) -> Result<FieldRead, InternalError> {
        Self::read_attribute(self, key, name, args)
    }

    fn write_attribute(
        &mut self,
        key: &InstanceKey,
        name: &str,
        value: Value,
    ) -> Result<(), InternalError> {
        Self::write_attribute(self, key, name, value)
    }

    fn write_relationship(
        &mut self,
        key: &InstanceKey,
        name: &str,
        value: RelationshipValue,
    ) -> Result<(), InternalError> {
        Self::write_relationship(self, key, name, value)
    }

    fn create_instance(
        &mut self,
        model: &str,
        attributes: Vec<(String, Value)>,
    ) -> Result<Instance, InternalError> {
        Self::create_instance(self, model, attributes)
    }

    fn delete_instance(&mut self, key: &InstanceKey) -> Result<(), InternalError> {
        Self::delete_instance(self, key)
    }

    fn get(&mut self, key: &InstanceKey) -> Result<Option<Instance>, InternalError> {
        self.txn.get(&key.model, key.id)
    }
}
