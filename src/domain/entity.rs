//! Entities (schools) and registry credentials

use super::ids::EntityId;
use crate::config::{secret_string, SecretString};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default output file naming pattern
pub const DEFAULT_OUTPUT_PATTERN: &str = "{id}_{timestamp}.csv";

/// One school/organization processed by the pipeline
///
/// Loaded once from the `schools` section of the configuration and never
/// mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// AISR school identifier
    pub id: EntityId,

    /// Display name
    pub name: String,

    /// AISR classification code sent with the bulk query upload
    #[serde(default = "default_classification")]
    pub classification: String,

    /// Contact address AISR notifies when results are ready
    #[serde(default)]
    pub email: String,

    /// Bulk query file submitted in the upload phase
    #[serde(alias = "queryFilePath", alias = "query_file_path")]
    pub bulk_query_file: PathBuf,

    /// Output file naming pattern (`{id}`, `{name}`, `{timestamp}`, `{run_id}`)
    #[serde(default)]
    pub output_file_pattern: Option<String>,
}

impl EntityConfig {
    /// Creates an entity with default classification and naming pattern
    pub fn new(id: EntityId, name: impl Into<String>, bulk_query_file: impl Into<PathBuf>) -> Self {
        Self {
            id,
            name: name.into(),
            classification: default_classification(),
            email: String::new(),
            bulk_query_file: bulk_query_file.into(),
            output_file_pattern: None,
        }
    }

    /// Output naming pattern, falling back to [`DEFAULT_OUTPUT_PATTERN`]
    pub fn output_pattern(&self) -> &str {
        self.output_file_pattern
            .as_deref()
            .unwrap_or(DEFAULT_OUTPUT_PATTERN)
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err(format!("schools[{}].name cannot be empty", self.id));
        }
        if self.bulk_query_file.as_os_str().is_empty() {
            return Err(format!("schools[{}].bulk_query_file cannot be empty", self.id));
        }
        let pattern = self.output_pattern();
        if !pattern.contains("{id}") {
            return Err(format!(
                "schools[{}].output_file_pattern must contain {{id}}, got '{pattern}'",
                self.id
            ));
        }
        if pattern.contains('/') || pattern.contains('\\') {
            return Err(format!(
                "schools[{}].output_file_pattern must be a file name, got '{pattern}'",
                self.id
            ));
        }
        Ok(())
    }
}

fn default_classification() -> String {
    "N".to_string()
}

/// Registry login credentials
///
/// The password lives in a zeroizing secret and is never written anywhere.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: secret_string(password.into()),
        }
    }

    /// Builds credentials from a username and an environment variable holding
    /// the password
    pub fn from_env(username: impl Into<String>, password_var: &str) -> Result<Self, String> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err("username cannot be empty".to_string());
        }
        match std::env::var(password_var) {
            Ok(password) if !password.is_empty() => Ok(Self::new(username, password)),
            _ => Err(format!(
                "password not found: set the {password_var} environment variable"
            )),
        }
    }

    pub fn password(&self) -> &str {
        self.password.expose_secret().as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn entity() -> EntityConfig {
        EntityConfig::new(
            EntityId::from_str("2542").unwrap(),
            "Friendly Hills Mid",
            "/data/query.csv",
        )
    }

    #[test]
    fn test_entity_defaults() {
        let entity = entity();
        assert_eq!(entity.classification, "N");
        assert_eq!(entity.output_pattern(), DEFAULT_OUTPUT_PATTERN);
        assert!(entity.validate().is_ok());
    }

    #[test]
    fn test_entity_deserializes_query_file_alias() {
        let entity: EntityConfig = serde_json::from_str(
            r#"{"id": "2542", "name": "Friendly Hills Mid", "queryFilePath": "q.csv"}"#,
        )
        .unwrap();
        assert_eq!(entity.bulk_query_file, PathBuf::from("q.csv"));
    }

    #[test]
    fn test_entity_pattern_requires_id() {
        let mut entity = entity();
        entity.output_file_pattern = Some("{timestamp}.csv".to_string());
        assert!(entity.validate().is_err());

        entity.output_file_pattern = Some("out/{id}.csv".to_string());
        assert!(entity.validate().is_err());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let credentials = Credentials::new("user", "hunter2");
        assert_eq!(credentials.password(), "hunter2");
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }

    #[test]
    fn test_credentials_from_missing_env() {
        std::env::remove_var("IMMUNIZATION_TEST_MISSING_PASSWORD");
        let result = Credentials::from_env("user", "IMMUNIZATION_TEST_MISSING_PASSWORD");
        assert!(result.is_err());
    }
}
