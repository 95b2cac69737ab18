//! Symbolic node names.
//!
//! An [`Alias`] is the unique, URL-safe identifier of a node within a
//! workflow. Aliases appear in iterate bodies, route branches, execution
//! selections, and as the namespace under which a node's results are
//! stored (`global[alias][field]`, `record.data[alias]`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Maximum alias length in bytes.
const MAX_ALIAS_LEN: usize = 64;

/// Error produced when validating an alias string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AliasError {
    /// The alias was empty.
    #[error("alias must not be empty")]
    Empty,
    /// The alias exceeded the maximum length.
    #[error("alias too long: {len} bytes (max {MAX_ALIAS_LEN})")]
    TooLong {
        /// Length of the rejected alias.
        len: usize,
    },
    /// The alias contained a character outside `[A-Za-z0-9_-]`.
    #[error("alias {alias:?} contains invalid character {ch:?}")]
    InvalidCharacter {
        /// The rejected alias.
        alias: String,
        /// The offending character.
        ch: char,
    },
}

/// A validated, URL-safe symbolic node name.
///
/// Allowed characters are ASCII alphanumerics, `_`, and `-`. Aliases are
/// case-sensitive and compared byte-wise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Alias(String);

impl Alias {
    /// Validate and wrap an alias string.
    pub fn new(s: impl Into<String>) -> Result<Self, AliasError> {
        let s = s.into();
        if s.is_empty() {
            return Err(AliasError::Empty);
        }
        if s.len() > MAX_ALIAS_LEN {
            return Err(AliasError::TooLong { len: s.len() });
        }
        if let Some(ch) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
        {
            return Err(AliasError::InvalidCharacter { alias: s, ch });
        }
        Ok(Self(s))
    }

    /// The alias as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Alias {
    type Err = AliasError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Alias {
    type Error = AliasError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Alias> for String {
    fn from(alias: Alias) -> Self {
        alias.0
    }
}

impl AsRef<str> for Alias {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
