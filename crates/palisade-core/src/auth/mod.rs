#[cfg(test)]
mod tests;

use crate::{
    error::{ErrorClass, ErrorOrigin, InternalError},
    instance::Instance,
    value::Value,
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};
use thiserror::Error as ThisError;

///
/// AuthError
///

#[derive(Debug, ThisError)]
pub enum AuthError {
    #[error("access to field '{model}.{field}' denied")]
    FieldDenied { model: String, field: String },

    #[error("{op} on '{model}' denied")]
    EntityDenied { model: String, op: EntityOperation },

    #[error("check '{0}' not registered")]
    UnknownCheck(String),

    #[error("check '{0}' already registered")]
    DuplicateCheck(String),
}

impl AuthError {
    pub(crate) const fn class(&self) -> ErrorClass {
        match self {
            Self::FieldDenied { .. } | Self::EntityDenied { .. } => ErrorClass::Forbidden,
            Self::UnknownCheck(_) => ErrorClass::NotFound,
            Self::DuplicateCheck(_) => ErrorClass::InvariantViolation,
        }
    }
}

impl From<AuthError> for InternalError {
    fn from(err: AuthError) -> Self {
        Self::new(err.class(), ErrorOrigin::Auth, err.to_string())
    }
}

///
/// EntityOperation
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntityOperation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for EntityOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{label}")
    }
}

///
/// Principal
///
/// Verified caller identity handed in by the transport layer. The core
/// never authenticates; it only interprets what is already proven.
///

#[derive(Clone, Debug, Default)]
pub struct Principal {
    pub id: String,
    pub roles: BTreeSet<String>,
    pub claims: BTreeMap<String, Value>,
}

impl Principal {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: BTreeSet::new(),
            claims: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.insert(role.into());
        self
    }

    #[must_use]
    pub fn with_claim(mut self, claim: impl Into<String>, value: Value) -> Self {
        self.claims.insert(claim.into(), value);
        self
    }

    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

///
/// Redaction
/// How a filtered field renders in the response.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Redaction {
    /// Drop the key entirely.
    Omit,
    /// Keep the key, null the value.
    Mask,
}

///
/// Decision
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Allow,
    Deny,
    Filter(Redaction),
}

///
/// DenyPolicy
///
/// What a Deny on a *requested* read field does to the request.
/// Write-path denials always abort regardless of policy.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DenyPolicy {
    /// Fail closed: abort the whole request.
    #[default]
    AbortRequest,
    /// Omit the denied field; siblings stay intact.
    OmitField,
}

///
/// CheckContext
///
/// Everything a check may consult. `instance` is absent for entity-level
/// create checks, which run before any instance exists.
///

pub struct CheckContext<'a> {
    pub principal: &'a Principal,
    pub model: &'a str,
    pub field: Option<&'a str>,
    pub instance: Option<&'a Instance>,
}

///
/// Check
///

pub trait Check: Send + Sync {
    fn evaluate(&self, cx: &CheckContext<'_>) -> Decision;
}

///
/// Built-in checks
///

pub struct AllowAll;

impl Check for AllowAll {
    fn evaluate(&self, _cx: &CheckContext<'_>) -> Decision {
        Decision::Allow
    }
}

pub struct DenyAll;

impl Check for DenyAll {
    fn evaluate(&self, _cx: &CheckContext<'_>) -> Decision {
        Decision::Deny
    }
}

/// Allow only principals holding the given role.
pub struct RequireRole(pub String);

impl Check for RequireRole {
    fn evaluate(&self, cx: &CheckContext<'_>) -> Decision {
        if cx.principal.has_role(&self.0) {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }
}

/// Allow only principals carrying an exactly-matching claim.
pub struct ClaimEquals {
    pub claim: String,
    pub value: Value,
}

impl Check for ClaimEquals {
    fn evaluate(&self, cx: &CheckContext<'_>) -> Decision {
        match cx.principal.claims.get(&self.claim) {
            Some(v) if *v == self.value => Decision::Allow,
            _ => Decision::Deny,
        }
    }
}

/// Unconditionally downgrade the field to a redacted read.
pub struct Redact(pub Redaction);

impl Check for Redact {
    fn evaluate(&self, _cx: &CheckContext<'_>) -> Decision {
        Decision::Filter(self.0)
    }
}

///
/// RuleSet
///
/// Ordered check list with a fixed interpreter: the first Deny
/// short-circuits, any Filter downgrades the final decision, an empty
/// set allows.
///

#[derive(Clone, Default)]
pub struct RuleSet {
    checks: Vec<Arc<dyn Check>>,
}

impl RuleSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, check: impl Check + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    pub fn push(&mut self, check: Arc<dyn Check>) {
        self.checks.push(check);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    #[must_use]
    pub fn evaluate(&self, cx: &CheckContext<'_>) -> Decision {
        let mut redaction = None;

        for check in &self.checks {
            match check.evaluate(cx) {
                Decision::Deny => return Decision::Deny,
                Decision::Filter(r) => {
                    // first redaction wins; later Allows cannot undo it
                    redaction.get_or_insert(r);
                }
                Decision::Allow => {}
            }
        }

        redaction.map_or(Decision::Allow, Decision::Filter)
    }
}

impl fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RuleSet({} checks)", self.checks.len())
    }
}

///
/// EntityRuleSet
/// Per-operation entity-level rule sets.
///

#[derive(Clone, Debug, Default)]
pub struct EntityRuleSet {
    pub create: RuleSet,
    pub read: RuleSet,
    pub update: RuleSet,
    pub delete: RuleSet,
}

impl EntityRuleSet {
    #[must_use]
    pub const fn for_operation(&self, op: EntityOperation) -> &RuleSet {
        match op {
            EntityOperation::Create => &self.create,
            EntityOperation::Read => &self.read,
            EntityOperation::Update => &self.update,
            EntityOperation::Delete => &self.delete,
        }
    }
}

///
/// CheckRegistry
///
/// Named, fully-configured check instances for the declarative model
/// form. Built-ins are preregistered; host applications add their own
/// under stable names before model documents are loaded.
///

pub struct CheckRegistry {
    checks: BTreeMap<String, Arc<dyn Check>>,
}

impl CheckRegistry {
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self {
            checks: BTreeMap::new(),
        };

        // infallible: the map is empty
        let _ = registry.register("allow_all", Arc::new(AllowAll));
        let _ = registry.register("deny_all", Arc::new(DenyAll));
        let _ = registry.register("redact_omit", Arc::new(Redact(Redaction::Omit)));
        let _ = registry.register("redact_mask", Arc::new(Redact(Redaction::Mask)));

        registry
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        check: Arc<dyn Check>,
    ) -> Result<(), AuthError> {
        let name = name.into();
        if self.checks.contains_key(&name) {
            return Err(AuthError::DuplicateCheck(name));
        }
        self.checks.insert(name, check);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Check>, AuthError> {
        self.checks
            .get(name)
            .cloned()
            .ok_or_else(|| AuthError::UnknownCheck(name.to_string()))
    }
}

impl Default for CheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}
