use crate::{types::Id, value::Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

///
/// Instance
///
/// One runtime row of a registered model. Owned by exactly one request;
/// every mutation goes through the mediator. Also the row shape the
/// bundled memory store encodes, hence the serde derives.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Instance {
    pub id: Id,
    pub model: String,
    pub attributes: BTreeMap<String, Value>,
    pub relationships: BTreeMap<String, RelationshipValue>,
}

impl Instance {
    #[must_use]
    pub fn new(model: impl Into<String>, id: Id) -> Self {
        Self {
            id,
            model: model.into(),
            attributes: BTreeMap::new(),
            relationships: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn key(&self) -> InstanceKey {
        InstanceKey {
            model: self.model.clone(),
            id: self.id,
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: Value) {
        self.attributes.insert(name.into(), value);
    }

    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&RelationshipValue> {
        self.relationships.get(name)
    }

    pub fn set_relationship(&mut self, name: impl Into<String>, value: RelationshipValue) {
        self.relationships.insert(name.into(), value);
    }
}

///
/// InstanceKey
/// Identity-map key: model name plus id.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct InstanceKey {
    pub model: String,
    pub id: Id,
}

impl InstanceKey {
    #[must_use]
    pub fn new(model: impl Into<String>, id: Id) -> Self {
        Self {
            model: model.into(),
            id,
        }
    }
}

///
/// RelationshipValue
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RelationshipValue {
    ToOne(Option<Id>),
    ToMany(Vec<Id>),
}

impl RelationshipValue {
    /// Related ids, in stored order.
    #[must_use]
    pub fn ids(&self) -> Vec<Id> {
        match self {
            Self::ToOne(id) => id.iter().copied().collect(),
            Self::ToMany(ids) => ids.clone(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::ToOne(id) => id.is_none(),
            Self::ToMany(ids) => ids.is_empty(),
        }
    }
}
