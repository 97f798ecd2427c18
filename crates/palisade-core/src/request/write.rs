use crate::{types::Id, value::Value};

///
/// RefTarget
///
/// How a write names an instance: a persisted id, or a client-assigned
/// temporary reference resolved within the same request. Temp refs make
/// forward references legal regardless of op order.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RefTarget {
    Persisted(Id),
    Temp(String),
}

impl RefTarget {
    #[must_use]
    pub fn temp(name: impl Into<String>) -> Self {
        Self::Temp(name.into())
    }
}

///
/// RelationshipTargets
/// Cardinality-shaped assignment payload.
///

#[derive(Clone, Debug)]
pub enum RelationshipTargets {
    One(Option<RefTarget>),
    Many(Vec<RefTarget>),
}

///
/// RelationshipAssignment
///

#[derive(Clone, Debug)]
pub struct RelationshipAssignment {
    pub name: String,
    pub targets: RelationshipTargets,
}

impl RelationshipAssignment {
    #[must_use]
    pub fn to_one(name: impl Into<String>, target: RefTarget) -> Self {
        Self {
            name: name.into(),
            targets: RelationshipTargets::One(Some(target)),
        }
    }

    #[must_use]
    pub fn clear(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            targets: RelationshipTargets::One(None),
        }
    }

    #[must_use]
    pub fn to_many(name: impl Into<String>, targets: Vec<RefTarget>) -> Self {
        Self {
            name: name.into(),
            targets: RelationshipTargets::Many(targets),
        }
    }
}

///
/// WriteOp
/// One client-ordered mutation.
///

#[derive(Clone, Debug)]
pub enum WriteOp {
    Create {
        temp_ref: String,
        model: String,
        attributes: Vec<(String, Value)>,
        relationships: Vec<RelationshipAssignment>,
    },
    Update {
        model: String,
        target: RefTarget,
        attributes: Vec<(String, Value)>,
        relationships: Vec<RelationshipAssignment>,
    },
    Delete {
        model: String,
        target: RefTarget,
    },
}

impl WriteOp {
    #[must_use]
    pub fn model(&self) -> &str {
        match self {
            Self::Create { model, .. } | Self::Update { model, .. } | Self::Delete { model, .. } => {
                model
            }
        }
    }
}

///
/// WriteSet
/// Ordered mutation list for one request.
///

#[derive(Clone, Debug, Default)]
pub struct WriteSet {
    pub ops: Vec<WriteOp>,
}

impl WriteSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, op: WriteOp) -> Self {
        self.ops.push(op);
        self
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Temp refs declared by creates, in declaration order.
    #[must_use]
    pub fn declared_refs(&self) -> Vec<&str> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                WriteOp::Create { temp_ref, .. } => Some(temp_ref.as_str()),
                _ => None,
            })
            .collect()
    }
}
