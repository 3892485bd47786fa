//! Validated names for repositories and branches.
//!
//! Repository names double as the bucket-style identifier exposed through
//! wire front-ends, so they follow DNS naming rules. Branch names are looser
//! but must never collide with the reference grammar (`:HEAD`, `~N`, commit
//! hashes are all parsed out of the same string).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// A validated repository name.
///
/// Repository names must be:
/// - Between 3 and 63 characters (compatible with DNS/bucket naming)
/// - Lowercase alphanumeric with hyphens
/// - Not start or end with a hyphen
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryName(String);

impl RepositoryName {
    /// Creates a new repository name after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<()> {
        if name.len() < 3 {
            return Err(Error::InvalidName {
                message: format!("repository name '{name}' is too short (minimum 3 characters)"),
            });
        }
        if name.len() > 63 {
            return Err(Error::InvalidName {
                message: format!("repository name '{name}' is too long (maximum 63 characters)"),
            });
        }
        if name.starts_with('-') || name.ends_with('-') {
            return Err(Error::InvalidName {
                message: format!("repository name '{name}' cannot start or end with a hyphen"),
            });
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::InvalidName {
                message: format!(
                    "repository name '{name}' must be lowercase alphanumeric with hyphens"
                ),
            });
        }
        Ok(())
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RepositoryName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// A validated branch name.
///
/// Branch names must be non-empty, at most 255 characters, and must not
/// contain characters the reference grammar reserves (`:`, `~`) or
/// whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Creates a new branch name after validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidName {
                message: "branch name cannot be empty".to_string(),
            });
        }
        if name.len() > 255 {
            return Err(Error::InvalidName {
                message: format!("branch name '{name}' is too long (maximum 255 characters)"),
            });
        }
        if name.starts_with('-') {
            return Err(Error::InvalidName {
                message: format!("branch name '{name}' cannot start with a hyphen"),
            });
        }
        if let Some(c) = name
            .chars()
            .find(|c| *c == ':' || *c == '~' || c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidName {
                message: format!("branch name '{name}' contains reserved character {c:?}"),
            });
        }
        Ok(())
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BranchName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
