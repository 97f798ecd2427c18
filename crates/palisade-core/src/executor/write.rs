use crate::{
    error::InternalError,
    executor::RequestExecutor,
    instance::{InstanceKey, RelationshipValue},
    mediator::Mediator,
    obs::sink::{self, ExecKind, MetricsEvent},
    request::{RefTarget, RelationshipTargets, RequestError, WriteOp, WriteSet},
    response::{ResponseNode, ResponseSet},
    types::Id,
};
use std::collections::BTreeMap;

impl RequestExecutor<'_> {
    /// Apply a write set in two phases: materialize every instance in
    /// client order, then wire relationships once every referenced
    /// instance exists. Temp refs resolve through the table built in
    /// phase one, so forward references in phase two always land.
    pub(crate) fn execute_writes(
        &self,
        mediator: &mut Mediator<'_, '_>,
        writes: &WriteSet,
    ) -> Result<Vec<(String, Id)>, InternalError> {
        let mut temp: BTreeMap<String, Id> = BTreeMap::new();
        let mut created: Vec<(String, Id)> = Vec::new();

        for op in &writes.ops {
            match op {
                WriteOp::Create {
                    temp_ref,
                    model,
                    attributes,
                    ..
                } => {
                    let instance = mediator.create_instance(model, attributes.clone())?;
                    sink::record(&MetricsEvent::new(ExecKind::Create).model(model).rows(1));
                    self.debug_log(format!("created {model}:{} ({temp_ref})", instance.id));
                    temp.insert(temp_ref.clone(), instance.id);
                    created.push((model.clone(), instance.id));
                }
                WriteOp::Update {
                    model,
                    target,
                    attributes,
                    ..
                } => {
                    let id = resolve_ref(target, &temp)?;
                    let key = InstanceKey::new(model.clone(), id);
                    for (name, value) in attributes {
                        mediator.write_attribute(&key, name, value.clone())?;
                    }
                    sink::record(&MetricsEvent::new(ExecKind::Update).model(model).rows(1));
                }
                WriteOp::Delete { model, target } => {
                    let id = resolve_ref(target, &temp)?;
                    mediator.delete_instance(&InstanceKey::new(model.clone(), id))?;
                    sink::record(&MetricsEvent::new(ExecKind::Delete).model(model).rows(1));
                }
            }
        }

        for op in &writes.ops {
            let (model, target, relationships) = match op {
                WriteOp::Create {
                    temp_ref,
                    model,
                    relationships,
                    ..
                } => (model, RefTarget::Temp(temp_ref.clone()), relationships),
                WriteOp::Update {
                    model,
                    target,
                    relationships,
                    ..
                } => (model, target.clone(), relationships),
                WriteOp::Delete { .. } => continue,
            };

            if relationships.is_empty() {
                continue;
            }

            let id = resolve_ref(&target, &temp)?;
            let key = InstanceKey::new(model.clone(), id);
            for assignment in relationships {
                let value = materialize_targets(&assignment.targets, &temp)?;
                mediator.write_relationship(&key, &assignment.name, value)?;
            }
        }

        Ok(created)
    }

    /// Response for a write request with no projection: created
    /// instances, in client order, ids only.
    pub(crate) fn bare_write_response(&self, created: &[(String, Id)]) -> ResponseSet {
        let mut set = ResponseSet::new();
        for (model, id) in created {
            set.push(ResponseNode::new(model.clone(), *id));
        }
        set
    }
}

fn resolve_ref(target: &RefTarget, temp: &BTreeMap<String, Id>) -> Result<Id, InternalError> {
    match target {
        RefTarget::Persisted(id) => Ok(*id),
        RefTarget::Temp(name) => temp
            .get(name)
            .copied()
            .ok_or_else(|| RequestError::UnknownTempRef(name.clone()).into()),
    }
}

fn materialize_targets(
    targets: &RelationshipTargets,
    temp: &BTreeMap<String, Id>,
) -> Result<RelationshipValue, InternalError> {
    match targets {
        RelationshipTargets::One(None) => Ok(RelationshipValue::ToOne(None)),
        RelationshipTargets::One(Some(target)) => {
            Ok(RelationshipValue::ToOne(Some(resolve_ref(target, temp)?)))
        }
        RelationshipTargets::Many(targets) => {
            let mut ids = Vec::with_capacity(targets.len());
            for target in targets {
                ids.push(resolve_ref(target, temp)?);
            }
            Ok(RelationshipValue::ToMany(ids))
        }
    }
}
