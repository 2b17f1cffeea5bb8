use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid id {value:?}: ids must be a single path segment (no '/', '\\\\', NUL, '.' or '..')")]
pub struct IdError {
    value: String,
}

/// Opaque identifier for price records, ledger entries, envelopes and users.
///
/// User ids name ledger files, so anything coming from outside goes through
/// [`Id::from_string_checked`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id(String);

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl Id {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap a trusted string without validation.
    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_string_checked(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into();
        if Self::is_path_safe(&value) {
            Ok(Self(value))
        } else {
            Err(IdError { value })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_path_safe(value: &str) -> bool {
        if value.is_empty() || value == "." || value == ".." {
            return false;
        }
        !value.chars().any(|c| c == '/' || c == '\\' || c == '\0')
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Id {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
