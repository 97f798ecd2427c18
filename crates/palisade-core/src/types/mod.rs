mod generator;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error as ThisError;
use ulid::Ulid;

use crate::error::{ErrorClass, ErrorOrigin, InternalError};

///
/// IdError
///

#[derive(Debug, ThisError)]
pub enum IdError {
    #[error("invalid identifier '{0}'")]
    InvalidFormat(String),

    #[error("identifier generator overflow")]
    GeneratorOverflow,
}

impl From<IdError> for InternalError {
    fn from(err: IdError) -> Self {
        Self::new(ErrorClass::Validation, ErrorOrigin::Request, err.to_string())
    }
}

///
/// Id
///
/// ULID-backed instance identifier.
/// Serializes as the Crockford base32 string form so identifiers survive
/// any wire protocol unchanged.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Id(Ulid);

impl Id {
    /// Wrap a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Generate a fresh identifier from the global monotonic generator.
    pub fn generate() -> Result<Self, IdError> {
        generator::generate().map(Self)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Id {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|_| IdError::InvalidFormat(s.to_string()))
    }
}

impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_string_form() {
        let id = Id::generate().unwrap();
        let parsed: Id = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn generation_is_monotonic() {
        let a = Id::generate().unwrap();
        let b = Id::generate().unwrap();
        assert!(b > a);
    }

    #[test]
    fn rejects_garbage() {
        assert!("not-a-ulid!".parse::<Id>().is_err());
    }
}
