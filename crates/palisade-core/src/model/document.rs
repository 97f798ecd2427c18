use crate::{
    auth::CheckRegistry,
    hook::{HookBinding, HookPhase, HookRegistry},
    model::{
        ModelError,
        descriptor::{Cardinality, ModelDescriptor, RelationshipModel},
        field::{ArgSpec, FieldKind, FieldModel},
    },
};
use crate::error::InternalError;
use serde::Deserialize;

///
/// ModelDocument
///
/// Data-driven model declaration. Rule and hook entries reference
/// named implementations in the check/hook registries, so documents
/// stay pure data. Resolution normalizes into the same
/// `ModelDescriptor` the builder form produces.
///

#[derive(Debug, Deserialize)]
pub struct ModelDocument {
    pub model: String,
    #[serde(default = "default_id_field")]
    pub id_field: String,
    #[serde(default)]
    pub fields: Vec<FieldDocument>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDocument>,
    #[serde(default)]
    pub entity_rules: EntityRulesDocument,
    #[serde(default)]
    pub hooks: Vec<HookDocument>,
}

fn default_id_field() -> String {
    "id".to_string()
}

#[derive(Debug, Deserialize)]
pub struct FieldDocument {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RelationshipDocument {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EntityRulesDocument {
    #[serde(default)]
    pub create: Vec<String>,
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub update: Vec<String>,
    #[serde(default)]
    pub delete: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HookDocument {
    pub phase: HookPhase,
    #[serde(default)]
    pub field: Option<String>,
    pub hook: String,
}

impl ModelDocument {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        serde_json::from_str(json).map_err(|err| ModelError::Parse(err.to_string()))
    }

    /// Resolve named rules and hooks and normalize into a descriptor.
    pub fn resolve(
        self,
        checks: &CheckRegistry,
        hooks: &HookRegistry,
    ) -> Result<ModelDescriptor, InternalError> {
        let mut builder = ModelDescriptor::builder(&self.model).id_field(
            &self.id_field,
            FieldKind::Id,
        );

        for field in self.fields {
            let mut model = FieldModel::new(&field.name, field.kind).with_args(field.args);
            let mut rules = crate::auth::RuleSet::new();
            for name in &field.rules {
                rules.push(checks.resolve(name)?);
            }
            model = model.with_rules(rules);
            builder = builder.attribute_model(model);
        }

        for relationship in self.relationships {
            let mut rules = crate::auth::RuleSet::new();
            for name in &relationship.rules {
                rules.push(checks.resolve(name)?);
            }
            builder = builder.relationship_model(
                RelationshipModel::new(
                    &relationship.name,
                    &relationship.target,
                    relationship.cardinality,
                )
                .with_rules(rules),
            );
        }

        let mut descriptor = builder.build().map_err(InternalError::from)?;

        for name in &self.entity_rules.create {
            descriptor.entity_rules.create.push(checks.resolve(name)?);
        }
        for name in &self.entity_rules.read {
            descriptor.entity_rules.read.push(checks.resolve(name)?);
        }
        for name in &self.entity_rules.update {
            descriptor.entity_rules.update.push(checks.resolve(name)?);
        }
        for name in &self.entity_rules.delete {
            descriptor.entity_rules.delete.push(checks.resolve(name)?);
        }

        for hook in self.hooks {
            let implementation = hooks.resolve(&hook.hook)?;
            let binding = match hook.field {
                Some(field) => HookBinding::field(hook.phase, field, implementation),
                None => HookBinding::entity(hook.phase, implementation),
            };
            descriptor.hooks.push(binding);
        }

        Ok(descriptor)
    }
}
