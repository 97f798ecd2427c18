use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    model::{FieldModel, ModelDescriptor, RelationshipModel},
};
use std::{collections::BTreeMap, sync::OnceLock};
use thiserror::Error as ThisError;

///
/// RegistryError
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("model '{0}' already registered")]
    DuplicateModel(String),

    #[error("model '{0}' not registered")]
    UnknownModel(String),

    #[error("field '{model}.{field}' not registered")]
    UnknownField { model: String, field: String },

    #[error("relationship '{model}.{relationship}' not registered")]
    UnknownRelationship { model: String, relationship: String },

    #[error("relationship '{model}.{relationship}' targets unregistered model '{target}'")]
    UnresolvedRelationship {
        model: String,
        relationship: String,
        target: String,
    },

    #[error("a registry is already installed for this process")]
    AlreadyInstalled,
}

impl RegistryError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownModel(_)
            | Self::UnknownField { .. }
            | Self::UnknownRelationship { .. } => ErrorClass::NotFound,
            Self::DuplicateModel(_) | Self::UnresolvedRelationship { .. } => {
                ErrorClass::Validation
            }
            Self::AlreadyInstalled => ErrorClass::InvariantViolation,
        }
    }
}

impl From<RegistryError> for InternalError {
    fn from(err: RegistryError) -> Self {
        Self::new(err.class(), ErrorOrigin::Registry, err.to_string())
    }
}

// Process-wide installation slot; write-once.
static INSTALLED: OnceLock<Registry> = OnceLock::new();

///
/// RegistryBuilder
///
/// Mutable build phase. Forward relationship references are legal here;
/// `seal` verifies the set is closed before any lookup is possible.
///

#[derive(Default)]
pub struct RegistryBuilder {
    models: BTreeMap<String, ModelDescriptor>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ModelDescriptor) -> Result<(), RegistryError> {
        if self.models.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateModel(descriptor.name));
        }
        self.models.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    /// End the write phase. Every relationship target must resolve.
    pub fn seal(self) -> Result<Registry, RegistryError> {
        for descriptor in self.models.values() {
            for relationship in &descriptor.relationships {
                if !self.models.contains_key(&relationship.target) {
                    return Err(RegistryError::UnresolvedRelationship {
                        model: descriptor.name.clone(),
                        relationship: relationship.name.clone(),
                        target: relationship.target.clone(),
                    });
                }
            }
        }

        Ok(Registry {
            models: self.models,
        })
    }
}

///
/// Registry
///
/// Sealed, immutable model metadata. Shared freely across requests;
/// lookups never lock.
///

#[derive(Debug)]
pub struct Registry {
    models: BTreeMap<String, ModelDescriptor>,
}

impl Registry {
    pub fn lookup(&self, model: &str) -> Result<&ModelDescriptor, RegistryError> {
        self.models
            .get(model)
            .ok_or_else(|| RegistryError::UnknownModel(model.to_string()))
    }

    pub fn resolve_field(&self, model: &str, field: &str) -> Result<&FieldModel, RegistryError> {
        self.lookup(model)?
            .field(field)
            .ok_or_else(|| RegistryError::UnknownField {
                model: model.to_string(),
                field: field.to_string(),
            })
    }

    pub fn resolve_relationship(
        &self,
        model: &str,
        relationship: &str,
    ) -> Result<&RelationshipModel, RegistryError> {
        self.lookup(model)?.relationship(relationship).ok_or_else(|| {
            RegistryError::UnknownRelationship {
                model: model.to_string(),
                relationship: relationship.to_string(),
            }
        })
    }

    #[must_use]
    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDescriptor> {
        self.models.values()
    }

    /// Install as the process-wide registry. Callable once.
    pub fn install(self) -> Result<&'static Self, RegistryError> {
        INSTALLED
            .set(self)
            .map_err(|_| RegistryError::AlreadyInstalled)?;

        Ok(INSTALLED.get().expect("registry installed above"))
    }

    /// The process-wide registry, if one was installed.
    #[must_use]
    pub fn installed() -> Option<&'static Self> {
        INSTALLED.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cardinality, FieldKind, ModelDescriptor};

    fn author() -> ModelDescriptor {
        ModelDescriptor::builder("Author")
            .attribute("name", FieldKind::Text)
            .build()
            .unwrap()
    }

    fn article() -> ModelDescriptor {
        ModelDescriptor::builder("Article")
            .attribute("title", FieldKind::Text)
            .relationship("author", "Author", Cardinality::ToOne)
            .build()
            .unwrap()
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut builder = RegistryBuilder::new();
        builder.register(author()).unwrap();
        assert!(matches!(
            builder.register(author()),
            Err(RegistryError::DuplicateModel(_))
        ));
    }

    #[test]
    fn seal_resolves_forward_references() {
        let mut builder = RegistryBuilder::new();
        // Article registered before its Author target exists
        builder.register(article()).unwrap();
        builder.register(author()).unwrap();

        let registry = builder.seal().unwrap();
        assert!(registry.contains("Article"));
        assert!(registry.resolve_relationship("Article", "author").is_ok());
    }

    #[test]
    fn seal_rejects_unresolved_targets() {
        let mut builder = RegistryBuilder::new();
        builder.register(article()).unwrap();

        assert!(matches!(
            builder.seal(),
            Err(RegistryError::UnresolvedRelationship { .. })
        ));
    }

    #[test]
    fn lookups_fail_with_typed_errors() {
        let mut builder = RegistryBuilder::new();
        builder.register(author()).unwrap();
        let registry = builder.seal().unwrap();

        assert!(matches!(
            registry.lookup("Ghost"),
            Err(RegistryError::UnknownModel(_))
        ));
        assert!(matches!(
            registry.resolve_field("Author", "ghost"),
            Err(RegistryError::UnknownField { .. })
        ));
        assert!(matches!(
            registry.resolve_relationship("Author", "ghost"),
            Err(RegistryError::UnknownRelationship { .. })
        ));
    }

    #[test]
    fn sealed_registry_is_shareable_across_threads() {
        fn assert_sync<T: Send + Sync>() {}
        assert_sync::<Registry>();
    }
}
