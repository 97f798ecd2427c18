use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Every module-level error converts into this shape before crossing the
/// executor boundary.
///

#[derive(Clone, Debug, ThisError)]
#[error("{origin}/{class}: {message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl InternalError {
    /// Construct an error with an explicit classification.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
        }
    }

    /// Construct a store-origin internal error.
    pub(crate) fn store_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Store, message)
    }

    /// True if the error is an authorization denial.
    #[must_use]
    pub const fn is_forbidden(&self) -> bool {
        matches!(self.class, ErrorClass::Forbidden)
    }
}

///
/// ErrorClass
/// Cross-cutting classification; drives rollback and transport mapping.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    Conflict,
    Unsupported,
    Validation,
    InvariantViolation,
    Internal,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::Validation => "validation",
            Self::InvariantViolation => "invariant_violation",
            Self::Internal => "internal",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Registry,
    Request,
    Auth,
    Hook,
    Mediator,
    Transaction,
    Store,
    Executor,
    Response,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Registry => "registry",
            Self::Request => "request",
            Self::Auth => "auth",
            Self::Hook => "hook",
            Self::Mediator => "mediator",
            Self::Transaction => "transaction",
            Self::Store => "store",
            Self::Executor => "executor",
            Self::Response => "response",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_origin_and_class() {
        let err = InternalError::new(ErrorClass::NotFound, ErrorOrigin::Registry, "missing");
        assert_eq!(err.to_string(), "registry/not_found: missing");
    }

    #[test]
    fn forbidden_is_detected() {
        let err = InternalError::new(ErrorClass::Forbidden, ErrorOrigin::Auth, "no");
        assert!(err.is_forbidden());
        assert!(!InternalError::store_internal("x").is_forbidden());
    }
}
