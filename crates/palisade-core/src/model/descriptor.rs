use crate::{
    auth::{Check, EntityRuleSet, RuleSet},
    hook::{HookBinding, HookPhase},
    model::{
        ModelError,
        field::{FieldKind, FieldModel},
    },
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

///
/// Cardinality
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

///
/// RelationshipModel
///

#[derive(Clone, Debug)]
pub struct RelationshipModel {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    pub rules: RuleSet,
}

impl RelationshipModel {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality,
            rules: RuleSet::new(),
        }
    }

    #[must_use]
    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }
}

///
/// ModelDescriptor
///
/// Immutable runtime metadata for one registered model. Built either
/// through `ModelDescriptor::builder` or resolved from a declarative
/// `ModelDocument`; downstream code never distinguishes the origin.
///

#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    pub name: String,
    pub id_field: FieldModel,
    pub fields: Vec<FieldModel>,
    pub relationships: Vec<RelationshipModel>,
    pub entity_rules: EntityRuleSet,
    pub hooks: Vec<HookBinding>,
}

impl ModelDescriptor {
    #[must_use]
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder::new(name)
    }

    /// Resolve a field by name; the identifier field resolves too.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldModel> {
        if self.id_field.name == name {
            return Some(&self.id_field);
        }
        self.fields.iter().find(|f| f.name == name)
    }

    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&RelationshipModel> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Bindings firing for a phase/field pair, in declaration order.
    pub fn hooks_for<'a>(
        &'a self,
        phase: HookPhase,
        field: Option<&'a str>,
    ) -> impl Iterator<Item = &'a HookBinding> {
        self.hooks
            .iter()
            .filter(move |binding| binding.applies_to(phase, field))
    }
}

///
/// ModelBuilder
/// Compiled-type-derived registration form.
///

pub struct ModelBuilder {
    name: String,
    id_field: FieldModel,
    fields: Vec<FieldModel>,
    relationships: Vec<RelationshipModel>,
    entity_rules: EntityRuleSet,
    hooks: Vec<HookBinding>,
}

impl ModelBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_field: FieldModel::new("id", FieldKind::Id),
            fields: Vec::new(),
            relationships: Vec::new(),
            entity_rules: EntityRuleSet::default(),
            hooks: Vec::new(),
        }
    }

    #[must_use]
    pub fn id_field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.id_field = FieldModel::new(name, kind);
        self
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldModel::new(name, kind));
        self
    }

    #[must_use]
    pub fn attribute_model(mut self, field: FieldModel) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn relationship(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        self.relationships
            .push(RelationshipModel::new(name, target, cardinality));
        self
    }

    #[must_use]
    pub fn relationship_model(mut self, relationship: RelationshipModel) -> Self {
        self.relationships.push(relationship);
        self
    }

    #[must_use]
    pub fn create_rule(mut self, check: impl Check + 'static) -> Self {
        self.entity_rules.create.push(Arc::new(check));
        self
    }

    #[must_use]
    pub fn read_rule(mut self, check: impl Check + 'static) -> Self {
        self.entity_rules.read.push(Arc::new(check));
        self
    }

    #[must_use]
    pub fn update_rule(mut self, check: impl Check + 'static) -> Self {
        self.entity_rules.update.push(Arc::new(check));
        self
    }

    #[must_use]
    pub fn delete_rule(mut self, check: impl Check + 'static) -> Self {
        self.entity_rules.delete.push(Arc::new(check));
        self
    }

    #[must_use]
    pub fn hook(mut self, binding: HookBinding) -> Self {
        self.hooks.push(binding);
        self
    }

    pub fn build(self) -> Result<ModelDescriptor, ModelError> {
        if !self.id_field.kind.is_scalar() {
            return Err(ModelError::NonScalarIdField {
                model: self.name,
                field: self.id_field.name,
            });
        }

        let mut seen_fields = vec![self.id_field.name.clone()];
        for field in &self.fields {
            if seen_fields.contains(&field.name) {
                return Err(ModelError::DuplicateField {
                    model: self.name,
                    field: field.name.clone(),
                });
            }
            seen_fields.push(field.name.clone());
        }

        let mut seen_relationships: Vec<&str> = Vec::new();
        for relationship in &self.relationships {
            if seen_fields.iter().any(|f| *f == relationship.name) {
                return Err(ModelError::FieldRelationshipClash {
                    model: self.name,
                    name: relationship.name.clone(),
                });
            }
            if seen_relationships.contains(&relationship.name.as_str()) {
                return Err(ModelError::DuplicateRelationship {
                    model: self.name,
                    relationship: relationship.name.clone(),
                });
            }
            seen_relationships.push(&relationship.name);
        }

        Ok(ModelDescriptor {
            name: self.name,
            id_field: self.id_field,
            fields: self.fields,
            relationships: self.relationships,
            entity_rules: self.entity_rules,
            hooks: self.hooks,
        })
    }
}
