use crate::{
    auth::{AuthError, Decision, DenyPolicy, EntityOperation, Redaction},
    error::InternalError,
    executor::RequestExecutor,
    instance::Instance,
    mediator::{FieldRead, Mediator, MediatorError, RelationshipRead},
    obs::sink::{self, ExecKind, MetricsEvent},
    request::Projection,
    response::{ResponseNode, ResponseSet},
    txn::{apply_page, sort_instances},
    value::Value,
};

impl RequestExecutor<'_> {
    /// Depth-first read walk: load the roots through the transaction,
    /// then shape each instance to the projection via the mediator.
    pub(crate) fn execute_read(
        &self,
        mediator: &mut Mediator<'_, '_>,
        projection: &Projection,
    ) -> Result<ResponseSet, InternalError> {
        let instances = match projection.target {
            Some(id) => {
                let Some(instance) = mediator.transaction().get(&projection.model, id)? else {
                    return Err(MediatorError::InstanceNotFound {
                        model: projection.model.clone(),
                        id,
                    }
                    .into());
                };
                vec![instance]
            }
            None => mediator.transaction().load(
                &projection.model,
                projection.filter.as_ref(),
                &projection.order,
                projection.page,
            )?,
        };

        sink::record(
            &MetricsEvent::new(ExecKind::Load)
                .model(&projection.model)
                .rows(instances.len() as u64),
        );
        self.debug_log(format!(
            "loaded {} row(s) of {}",
            instances.len(),
            projection.model
        ));

        self.project_set(mediator, projection, instances)
    }

    fn project_set(
        &self,
        mediator: &mut Mediator<'_, '_>,
        projection: &Projection,
        instances: Vec<Instance>,
    ) -> Result<ResponseSet, InternalError> {
        let mut set = ResponseSet::new();

        for instance in instances {
            match mediator.entity_decision(
                &projection.model,
                EntityOperation::Read,
                Some(&instance),
            )? {
                Decision::Allow => {}
                // non-readable members leave the collection, siblings stay
                Decision::Filter(_) => continue,
                Decision::Deny => match self.policy {
                    DenyPolicy::OmitField => continue,
                    DenyPolicy::AbortRequest => {
                        return Err(AuthError::EntityDenied {
                            model: projection.model.clone(),
                            op: EntityOperation::Read,
                        }
                        .into());
                    }
                },
            }

            let node = self.project_instance(mediator, projection, &instance)?;
            set.push(node);
        }

        Ok(set)
    }

    fn project_instance(
        &self,
        mediator: &mut Mediator<'_, '_>,
        projection: &Projection,
        instance: &Instance,
    ) -> Result<ResponseNode, InternalError> {
        let key = instance.key();
        let mut node = ResponseNode::new(instance.model.clone(), instance.id);

        for selection in &projection.attributes {
            match mediator.read_attribute(&key, &selection.name, &selection.args)? {
                FieldRead::Value(value) => node.attributes.push((selection.name.clone(), value)),
                FieldRead::Redacted(Redaction::Mask) => {
                    node.attributes.push((selection.name.clone(), Value::Null));
                }
                FieldRead::Redacted(Redaction::Omit) => {}
                FieldRead::Denied => match self.policy {
                    DenyPolicy::OmitField => {}
                    DenyPolicy::AbortRequest => {
                        return Err(AuthError::FieldDenied {
                            model: key.model.clone(),
                            field: selection.name.clone(),
                        }
                        .into());
                    }
                },
            }
        }

        for (name, nested) in &projection.relationships {
            match mediator.read_relationship(&key, name)? {
                RelationshipRead::Denied => match self.policy {
                    DenyPolicy::OmitField => {}
                    DenyPolicy::AbortRequest => {
                        return Err(AuthError::FieldDenied {
                            model: key.model.clone(),
                            field: name.clone(),
                        }
                        .into());
                    }
                },
                RelationshipRead::Redacted(Redaction::Omit) => {}
                RelationshipRead::Redacted(Redaction::Mask) => {
                    node.relationships.push((name.clone(), ResponseSet::new()));
                }
                RelationshipRead::Related(value) => {
                    let mut targets = Vec::new();
                    for id in value.ids() {
                        // dangling references degrade to absence on reads
                        if let Some(target) = mediator.transaction().get(&nested.model, id)? {
                            targets.push(target);
                        }
                    }

                    let id_field = self
                        .registry
                        .lookup(&nested.model)?
                        .id_field
                        .name
                        .clone();
                    if let Some(filter) = &nested.filter {
                        targets.retain(|target| filter.matches(target, &id_field));
                    }
                    sort_instances(&mut targets, &nested.order, &id_field);
                    apply_page(&mut targets, nested.page);

                    let nested_set = self.project_set(mediator, nested, targets)?;
                    node.relationships.push((name.clone(), nested_set));
                }
            }
        }

        Ok(node)
    }
}
