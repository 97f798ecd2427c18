use crate::{
    auth::EntityOperation,
    error::{ErrorClass, ErrorOrigin, InternalError},
    mediator::HookContext,
    types::Id,
    value::Value,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error as ThisError;

///
/// HookError
///

#[derive(Debug, ThisError)]
pub enum HookError {
    #[error("hook recursion exceeded depth {depth}")]
    DepthExceeded { depth: usize },

    #[error("hook '{0}' not registered")]
    UnknownHook(String),

    #[error("hook '{0}' already registered")]
    DuplicateHook(String),

    #[error("{phase} hook failed: {message}")]
    Failed { phase: HookPhase, message: String },
}

impl HookError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::DepthExceeded { .. } | Self::DuplicateHook(_) => ErrorClass::InvariantViolation,
            Self::UnknownHook(_) => ErrorClass::NotFound,
            Self::Failed { .. } => ErrorClass::Internal,
        }
    }
}

impl From<HookError> for InternalError {
    fn from(err: HookError) -> Self {
        Self::new(err.class(), ErrorOrigin::Hook, err.to_string())
    }
}

///
/// HookPhase
///
/// PreCommit fires inside the atomic boundary, after the projection walk;
/// PostCommit fires outside it and can no longer fail the request.
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPhase {
    PreRead,
    PreCreate,
    PreUpdate,
    PreDelete,
    PreCommit,
    PostCommit,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PreRead => "pre_read",
            Self::PreCreate => "pre_create",
            Self::PreUpdate => "pre_update",
            Self::PreDelete => "pre_delete",
            Self::PreCommit => "pre_commit",
            Self::PostCommit => "post_commit",
        };
        write!(f, "{label}")
    }
}

///
/// MutationEvent
///
/// What a hook observes: the operation, the touched instance, and the
/// single changed field for field-scoped invocations.
///

#[derive(Clone, Debug)]
pub struct MutationEvent {
    pub op: EntityOperation,
    pub model: String,
    pub id: Id,
    pub field: Option<String>,
    pub args: Vec<(String, Value)>,
}

impl MutationEvent {
    #[must_use]
    pub fn entity(op: EntityOperation, model: impl Into<String>, id: Id) -> Self {
        Self {
            op,
            model: model.into(),
            id,
            field: None,
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(
        op: EntityOperation,
        model: impl Into<String>,
        id: Id,
        field: impl Into<String>,
    ) -> Self {
        Self {
            op,
            model: model.into(),
            id,
            field: Some(field.into()),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<(String, Value)>) -> Self {
        self.args = args;
        self
    }
}

///
/// Hook
///
/// Hooks re-enter the mediator through the context, so a hook can read
/// and write other instances; that recursion is depth-bounded.
///

pub trait Hook: Send + Sync {
    fn invoke(&self, event: &MutationEvent, cx: &mut HookContext<'_>)
    -> Result<(), InternalError>;
}

///
/// FnHook
/// Closure adapter, mostly for tests and small bindings.
///

pub struct FnHook<F>(pub F);

impl<F> Hook for FnHook<F>
where
    F: Fn(&MutationEvent, &mut HookContext<'_>) -> Result<(), InternalError> + Send + Sync,
{
    fn invoke(
        &self,
        event: &MutationEvent,
        cx: &mut HookContext<'_>,
    ) -> Result<(), InternalError> {
        (self.0)(event, cx)
    }
}

///
/// HookBinding
/// Entity-scoped when `field` is None.
///

#[derive(Clone)]
pub struct HookBinding {
    pub phase: HookPhase,
    pub field: Option<String>,
    pub hook: Arc<dyn Hook>,
}

impl HookBinding {
    #[must_use]
    pub fn entity(phase: HookPhase, hook: Arc<dyn Hook>) -> Self {
        Self {
            phase,
            field: None,
            hook,
        }
    }

    #[must_use]
    pub fn field(phase: HookPhase, field: impl Into<String>, hook: Arc<dyn Hook>) -> Self {
        Self {
            phase,
            field: Some(field.into()),
            hook,
        }
    }

    /// True when this binding fires for the given phase and field.
    /// Entity-scoped bindings fire for every field of their phase.
    #[must_use]
    pub fn applies_to(&self, phase: HookPhase, field: Option<&str>) -> bool {
        if self.phase != phase {
            return false;
        }
        match (&self.field, field) {
            (None, _) => true,
            (Some(bound), Some(touched)) => bound == touched,
            (Some(_), None) => false,
        }
    }
}

impl fmt::Debug for HookBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HookBinding({} {:?})", self.phase, self.field)
    }
}

///
/// HookRegistry
/// Named hook instances for the declarative model form.
///

#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Arc<dyn Hook>>,
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        hook: Arc<dyn Hook>,
    ) -> Result<(), HookError> {
        let name = name.into();
        if self.hooks.contains_key(&name) {
            return Err(HookError::DuplicateHook(name));
        }
        self.hooks.insert(name, hook);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Hook>, HookError> {
        self.hooks
            .get(name)
            .cloned()
            .ok_or_else(|| HookError::UnknownHook(name.to_string()))
    }
}
