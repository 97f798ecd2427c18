mod read;
mod write;

#[cfg(test)]
mod tests;

use crate::{
    auth::{DenyPolicy, Principal},
    error::InternalError,
    hook::HookPhase,
    mediator::Mediator,
    obs::sink::{self, ExecKind, MetricsEvent},
    registry::Registry,
    request::{Request, validate_projection, validate_writes},
    response::{Outcome, ResponseGraph, ResponseNote, ResponseSet},
    txn::{StoreRouter, TransactionContext, TxnState},
};
use std::fmt;

///
/// ExecState
///
/// The request state machine. Transitions are linear; the only fork is
/// Committing into Committed or RolledBack, and exactly one of those is
/// reached before a response exists.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExecState {
    Parsed,
    Validating,
    Executing,
    Committing,
    Committed,
    RolledBack,
    Responded,
}

impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Parsed => "parsed",
            Self::Validating => "validating",
            Self::Executing => "executing",
            Self::Committing => "committing",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
            Self::Responded => "responded",
        };
        write!(f, "{label}")
    }
}

///
/// RequestExecutor
///
/// Drives one request end to end: validate against the registry, open
/// the transaction, walk the projection through the mediator, commit or
/// roll back, shape the response. One executor value is reusable across
/// requests; each `execute` call owns its transaction.
///

pub struct RequestExecutor<'r> {
    registry: &'r Registry,
    stores: StoreRouter,
    policy: DenyPolicy,
    debug: bool,
}

impl<'r> RequestExecutor<'r> {
    #[must_use]
    pub fn new(registry: &'r Registry, stores: StoreRouter) -> Self {
        Self {
            registry,
            stores,
            policy: DenyPolicy::default(),
            debug: false,
        }
    }

    #[must_use]
    pub const fn policy(mut self, policy: DenyPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub const fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    fn debug_log(&self, s: impl AsRef<str>) {
        if self.debug {
            println!("[debug] {}", s.as_ref());
        }
    }

    fn enter(&self, state: ExecState) {
        self.debug_log(format!("state -> {state}"));
    }

    /// Execute one request for one principal.
    pub fn execute(
        &self,
        request: &Request,
        principal: &Principal,
    ) -> Result<ResponseGraph, InternalError> {
        self.enter(ExecState::Parsed);
        sink::record(&MetricsEvent::new(ExecKind::Execute));

        // Validating: no transaction exists yet, so failure here has no
        // side effects to undo.
        self.enter(ExecState::Validating);
        match request {
            Request::Read(projection) => validate_projection(self.registry, projection)?,
            Request::Write { ops, projection } => {
                validate_writes(self.registry, ops)?;
                if let Some(projection) = projection {
                    validate_projection(self.registry, projection)?;
                }
            }
        }

        self.enter(ExecState::Executing);
        let mut txn = TransactionContext::begin(self.registry, &self.stores);

        let walked = self.walk(request, principal, &mut txn);

        let root = match walked {
            Ok(root) => root,
            Err(err) => {
                txn.resolve_or_rollback();
                self.enter(ExecState::RolledBack);
                sink::record(&MetricsEvent::new(ExecKind::Rollback));
                return Err(err);
            }
        };

        self.enter(ExecState::Committing);
        let staged = txn.staged_mutations();

        {
            let mut mediator = Mediator::new(self.registry, principal, &mut txn);
            for (key, op) in &staged {
                if let Err(err) = mediator.run_lifecycle(HookPhase::PreCommit, key, *op) {
                    mediator.transaction().resolve_or_rollback();
                    self.enter(ExecState::RolledBack);
                    sink::record(&MetricsEvent::new(ExecKind::Rollback));
                    return Err(err);
                }
            }
        }

        if let Err(err) = txn.commit() {
            debug_assert_eq!(txn.state(), TxnState::RolledBack);
            self.enter(ExecState::RolledBack);
            sink::record(&MetricsEvent::new(ExecKind::Rollback));
            return Err(err);
        }

        self.enter(ExecState::Committed);
        sink::record(&MetricsEvent::new(ExecKind::Commit));

        // Post-commit hooks fire outside the atomic boundary: a failure
        // is reported on the response, never rolled back.
        let mut notes: Vec<ResponseNote> = Vec::new();
        {
            let mut mediator = Mediator::new(self.registry, principal, &mut txn);
            for (key, op) in &staged {
                if let Err(err) = mediator.run_lifecycle(HookPhase::PostCommit, key, *op) {
                    notes.push(ResponseNote::new(
                        format!("{}:{}", key.model, key.id),
                        err.to_string(),
                    ));
                }
            }
        }

        self.enter(ExecState::Responded);
        Ok(ResponseGraph {
            outcome: Outcome::Committed,
            root,
            notes,
        })
    }

    fn walk(
        &self,
        request: &Request,
        principal: &Principal,
        txn: &mut TransactionContext<'r>,
    ) -> Result<ResponseSet, InternalError> {
        let mut mediator = Mediator::new(self.registry, principal, txn);

        match request {
            Request::Read(projection) => self.execute_read(&mut mediator, projection),
            Request::Write { ops, projection } => {
                let created = self.execute_writes(&mut mediator, ops)?;
                match projection {
                    Some(projection) => self.execute_read(&mut mediator, projection),
                    None => Ok(self.bare_write_response(&created)),
                }
            }
        }
    }
}
