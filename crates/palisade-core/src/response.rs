use crate::{types::Id, value::Value};
use derive_more::{Deref, DerefMut, IntoIterator};
use serde::Serialize;

///
/// Outcome
/// Terminal transaction state a response was produced under.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Committed,
    RolledBack,
}

///
/// ResponseNote
///
/// Out-of-band report attached to an otherwise successful response;
/// carries post-commit hook failures, which can no longer undo the
/// commit they follow.
///

#[derive(Clone, Debug, Serialize)]
pub struct ResponseNote {
    pub origin: String,
    pub message: String,
}

impl ResponseNote {
    #[must_use]
    pub fn new(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

///
/// ResponseNode
/// One instance, shaped to the projection that requested it.
///

#[derive(Clone, Debug, Serialize)]
pub struct ResponseNode {
    pub model: String,
    pub id: Id,
    pub attributes: Vec<(String, Value)>,
    pub relationships: Vec<(String, ResponseSet)>,
}

impl ResponseNode {
    #[must_use]
    pub fn new(model: impl Into<String>, id: Id) -> Self {
        Self {
            model: model.into(),
            id,
            attributes: Vec::new(),
            relationships: Vec::new(),
        }
    }

    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&ResponseSet> {
        self.relationships
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, set)| set)
    }

    /// True when the projection requested the attribute but the
    /// response carries no key for it (omitted by policy).
    #[must_use]
    pub fn omits(&self, name: &str) -> bool {
        self.attribute(name).is_none()
    }
}

///
/// ResponseSet
/// Ordered node collection; to-one relationships render as 0/1 nodes.
///

#[derive(Clone, Debug, Default, Deref, DerefMut, IntoIterator, Serialize)]
pub struct ResponseSet(pub Vec<ResponseNode>);

impl ResponseSet {
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, node: ResponseNode) {
        self.0.push(node);
    }

    #[must_use]
    pub fn single(&self) -> Option<&ResponseNode> {
        match self.0.as_slice() {
            [node] => Some(node),
            _ => None,
        }
    }
}

///
/// ResponseGraph
///

#[derive(Clone, Debug, Serialize)]
pub struct ResponseGraph {
    pub outcome: Outcome,
    pub root: ResponseSet,
    pub notes: Vec<ResponseNote>,
}

impl ResponseGraph {
    #[must_use]
    pub const fn committed(root: ResponseSet) -> Self {
        Self {
            outcome: Outcome::Committed,
            root,
            notes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_notes(mut self, notes: Vec<ResponseNote>) -> Self {
        self.notes = notes;
        self
    }
}
