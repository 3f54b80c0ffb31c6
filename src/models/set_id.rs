//! Memory set identifiers.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a memory set.
///
/// Opaque to the storage layer; typically one per end user or session owner.
/// Empty identifiers are rejected because the durable store cannot key them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SetId(String);

impl SetId {
    /// Creates a new set ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the identifier is empty.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidInput(
                "memory set id must not be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SetId {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for SetId {
    type Error = Error;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<SetId> for String {
    fn from(id: SetId) -> Self {
        id.0
    }
}
