//! Domain identifier types with validation
//!
//! Newtype wrappers keep school identifiers and result identifiers from being
//! mixed up with arbitrary strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// School/organization identifier as known to AISR
///
/// Used as the unit of failure isolation and as the prefix of output file
/// names, so it must be non-empty and free of path separators.
///
/// # Examples
///
/// ```
/// use immunization_etl::domain::ids::EntityId;
/// use std::str::FromStr;
///
/// let id = EntityId::from_str("2542").unwrap();
/// assert_eq!(id.as_str(), "2542");
/// assert!(EntityId::new("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Creates a new EntityId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err("Entity ID cannot be empty".to_string());
        }
        if trimmed
            .chars()
            .any(|c| matches!(c, '/' | '\\' | ':') || c.is_control())
            || trimmed.contains("..")
        {
            return Err(format!("Entity ID contains invalid characters: {trimmed}"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for EntityId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one downloadable query result on the registry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultId(String);

impl ResultId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_trims_whitespace() {
        let id = EntityId::new("  2542 ").unwrap();
        assert_eq!(id.as_str(), "2542");
    }

    #[test]
    fn test_entity_id_rejects_empty() {
        assert!(EntityId::new("").is_err());
        assert!(EntityId::new("   ").is_err());
    }

    #[test]
    fn test_entity_id_rejects_path_characters() {
        assert!(EntityId::new("a/b").is_err());
        assert!(EntityId::new("a\\b").is_err());
        assert!(EntityId::new("..").is_err());
    }

    #[test]
    fn test_entity_id_serde() {
        let id: EntityId = serde_json::from_str("\"2543\"").unwrap();
        assert_eq!(id.as_str(), "2543");
        assert!(serde_json::from_str::<EntityId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"2543\"");
    }
}
