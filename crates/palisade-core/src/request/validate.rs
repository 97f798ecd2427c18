use crate::{
    error::InternalError,
    model::{FieldModel, ModelDescriptor},
    registry::Registry,
    request::{
        RequestError,
        predicate::{CompareOp, Predicate},
        projection::Projection,
        write::{RelationshipTargets, RefTarget, WriteOp, WriteSet},
    },
    value::Value,
};
use std::collections::BTreeSet;

/// Validate a projection tree against the registry.
/// Runs before any transaction opens; failure leaves no side effects.
pub fn validate_projection(
    registry: &Registry,
    projection: &Projection,
) -> Result<(), InternalError> {
    let descriptor = registry.lookup(&projection.model)?;

    for selection in &projection.attributes {
        let field = registry.resolve_field(&projection.model, &selection.name)?;
        validate_args(&projection.model, field, &selection.args)?;
    }

    if let Some(filter) = &projection.filter {
        validate_predicate(descriptor, filter)?;
    }

    for key in &projection.order {
        registry.resolve_field(&projection.model, &key.field)?;
    }

    for (name, nested) in &projection.relationships {
        let relationship = registry.resolve_relationship(&projection.model, name)?;
        if relationship.target != nested.model {
            return Err(RequestError::RelationshipTargetMismatch {
                model: projection.model.clone(),
                relationship: name.clone(),
                expected: relationship.target.clone(),
                found: nested.model.clone(),
            }
            .into());
        }
        validate_projection(registry, nested)?;
    }

    Ok(())
}

/// Validate attribute-read arguments against the field signature.
pub fn validate_args(
    model: &str,
    field: &FieldModel,
    args: &[(String, Value)],
) -> Result<(), RequestError> {
    for (name, value) in args {
        let Some(spec) = field.args.iter().find(|spec| spec.name == *name) else {
            return Err(RequestError::UnknownArgument {
                model: model.to_string(),
                field: field.name.clone(),
                arg: name.clone(),
            });
        };
        if !spec.kind.admits(value) {
            return Err(RequestError::ArgumentKindMismatch {
                model: model.to_string(),
                field: field.name.clone(),
                arg: name.clone(),
            });
        }
    }

    for spec in &field.args {
        if spec.required && !args.iter().any(|(name, _)| *name == spec.name) {
            return Err(RequestError::MissingArgument {
                model: model.to_string(),
                field: field.name.clone(),
                arg: spec.name.clone(),
            });
        }
    }

    Ok(())
}

fn validate_predicate(
    descriptor: &ModelDescriptor,
    predicate: &Predicate,
) -> Result<(), InternalError> {
    let mut touched = Vec::new();
    predicate.fields(&mut touched);

    for (field_name, op) in touched {
        let Some(field) = descriptor.field(field_name) else {
            return Err(crate::registry::RegistryError::UnknownField {
                model: descriptor.name.clone(),
                field: field_name.to_string(),
            }
            .into());
        };

        if let Some(op) = op
            && !op_supported(op, field)
        {
            return Err(RequestError::UnsupportedPredicate {
                model: descriptor.name.clone(),
                field: field_name.to_string(),
                op,
            }
            .into());
        }
    }

    Ok(())
}

fn op_supported(op: CompareOp, field: &FieldModel) -> bool {
    use crate::model::FieldKind;

    match op {
        CompareOp::Eq | CompareOp::Ne | CompareOp::In => true,
        CompareOp::Lt | CompareOp::Lte | CompareOp::Gt | CompareOp::Gte => {
            field.kind.is_scalar() && field.kind != FieldKind::Blob
        }
        CompareOp::Contains => {
            matches!(field.kind, FieldKind::Text | FieldKind::List(_))
        }
    }
}

/// Validate a write set against the registry. Relationship temp refs
/// resolve order-independently (forward references are the point), but
/// an update or delete can only target an instance an earlier op in the
/// same request created.
pub fn validate_writes(registry: &Registry, writes: &WriteSet) -> Result<(), InternalError> {
    let mut declared: BTreeSet<&str> = BTreeSet::new();
    for op in &writes.ops {
        if let WriteOp::Create { temp_ref, .. } = op {
            if declared.contains(temp_ref.as_str()) {
                return Err(RequestError::DuplicateTempRef(temp_ref.clone()).into());
            }
            declared.insert(temp_ref);
        }
    }

    let mut materialized: BTreeSet<&str> = BTreeSet::new();
    for op in &writes.ops {
        let descriptor = registry.lookup(op.model())?;

        if let WriteOp::Create { temp_ref, .. } = op {
            materialized.insert(temp_ref);
        }

        match op {
            WriteOp::Create {
                attributes,
                relationships,
                ..
            }
            | WriteOp::Update {
                attributes,
                relationships,
                ..
            } => {
                for (name, value) in attributes {
                    let field = registry.resolve_field(&descriptor.name, name)?;
                    if !field.kind.admits(value) {
                        return Err(RequestError::KindMismatch {
                            model: descriptor.name.clone(),
                            field: name.clone(),
                        }
                        .into());
                    }
                }

                for assignment in relationships {
                    let relationship =
                        registry.resolve_relationship(&descriptor.name, &assignment.name)?;
                    let matches_cardinality = matches!(
                        (&assignment.targets, relationship.cardinality),
                        (RelationshipTargets::One(_), crate::model::Cardinality::ToOne)
                            | (RelationshipTargets::Many(_), crate::model::Cardinality::ToMany)
                    );
                    if !matches_cardinality {
                        return Err(RequestError::CardinalityMismatch {
                            model: descriptor.name.clone(),
                            relationship: assignment.name.clone(),
                        }
                        .into());
                    }
                    check_refs(&assignment.targets, &declared)?;
                }
            }
            WriteOp::Delete { target, .. } => {
                check_ref(target, &materialized)?;
            }
        }

        if let WriteOp::Update { target, .. } = op {
            check_ref(target, &materialized)?;
        }
    }

    Ok(())
}

fn check_refs(
    targets: &RelationshipTargets,
    declared: &BTreeSet<&str>,
) -> Result<(), InternalError> {
    match targets {
        RelationshipTargets::One(Some(target)) => check_ref(target, declared),
        RelationshipTargets::One(None) => Ok(()),
        RelationshipTargets::Many(targets) => {
            for target in targets {
                check_ref(target, declared)?;
            }
            Ok(())
        }
    }
}

fn check_ref(target: &RefTarget, declared: &BTreeSet<&str>) -> Result<(), InternalError> {
    match target {
        RefTarget::Persisted(_) => Ok(()),
        RefTarget::Temp(name) => {
            if declared.contains(name.as_str()) {
                Ok(())
            } else {
                Err(RequestError::UnknownTempRef(name.clone()).into())
            }
        }
    }
}
