//! Configuration schema types
//!
//! This module defines the configuration structure loaded from the JSON (or
//! TOML) configuration file.

use crate::domain::{EntityConfig, EntityId};
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Runtime environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment (mock registry, self-signed certificates)
    #[default]
    Development,
    /// Staging environment
    Staging,
    /// Production environment
    Production,
}

/// Main configuration
///
/// This is the root configuration structure that maps to the config file.
/// It is passed explicitly to the orchestrator; nothing reads it globally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application-level settings
    #[serde(default)]
    pub application: ApplicationConfig,

    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: Environment,

    /// AISR endpoints and protocol settings
    pub api: ApiConfig,

    /// Output and log locations
    pub paths: PathsConfig,

    /// Schools to process
    pub schools: Vec<EntityConfig>,

    /// Raw extract schema and normalization rules
    #[serde(default)]
    pub transform: TransformConfig,

    /// Incremental "new vaccinations" processing
    #[serde(default)]
    pub incremental: IncrementalConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Configuration with default settings for everything but paths and schools
    pub fn new(paths: PathsConfig, schools: Vec<EntityConfig>) -> Self {
        Self {
            application: ApplicationConfig::default(),
            environment: Environment::default(),
            api: ApiConfig::default(),
            paths,
            schools,
            transform: TransformConfig::default(),
            incremental: IncrementalConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.api.validate(&self.environment)?;
        self.paths.validate()?;

        if self.schools.is_empty() {
            return Err("schools cannot be empty".to_string());
        }
        let mut seen: HashSet<&EntityId> = HashSet::new();
        for school in &self.schools {
            if !seen.insert(&school.id) {
                return Err(format!("duplicate school id '{}'", school.id));
            }
            school.validate()?;
        }

        self.transform.validate()?;
        self.incremental.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Looks up a configured school by id
    pub fn school(&self, id: &str) -> Option<&EntityConfig> {
        self.schools.iter().find(|s| s.id.as_str() == id)
    }
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl ApplicationConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }
        Ok(())
    }
}

/// Retry configuration for transient registry failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Initial delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_retries == 0 || self.max_retries > 10 {
            return Err(format!(
                "api.retry.max_retries must be between 1 and 10, got {}",
                self.max_retries
            ));
        }
        if self.backoff_multiplier < 1.0 {
            return Err("api.retry.backoff_multiplier must be >= 1.0".to_string());
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err("api.retry.initial_delay_ms cannot exceed max_delay_ms".to_string());
        }
        Ok(())
    }
}

/// AISR endpoint and protocol configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Keycloak base URL (e.g. `https://authenticator4.web.health.state.mn.us`)
    pub auth_base_url: String,

    /// AISR API base URL (e.g. `https://aisr-api.web.health.state.mn.us`)
    pub aisr_api_base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// TLS certificate verification enabled
    ///
    /// May only be disabled outside production, e.g. against a local mock
    /// registry with a self-signed certificate.
    #[serde(default = "default_true")]
    pub tls_verify: bool,

    /// Retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Token lifetime assumed when the registry does not report `expires_in`
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,

    /// Re-authentication attempts allowed per phase after an expired session
    #[serde(default = "default_max_reauth_attempts")]
    pub max_reauth_attempts: u32,

    /// Number of schools processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Pause before each school's registry work, to stay under rate limits
    #[serde(default)]
    pub delay_between_requests_ms: u64,

    /// Download only the newest result per school instead of every listed one
    #[serde(default)]
    pub latest_result_only: bool,

    /// District identifier sent as `x-amz-meta-iddis` with uploads
    #[serde(default = "default_iddis")]
    pub iddis: String,

    /// Fixed `host` header for the signed upload, when the signature covers it
    #[serde(default)]
    pub upload_host: Option<String>,
}

impl ApiConfig {
    fn validate(&self, environment: &Environment) -> Result<(), String> {
        for (key, url) in [
            ("api.auth_base_url", &self.auth_base_url),
            ("api.aisr_api_base_url", &self.aisr_api_base_url),
        ] {
            if url.is_empty() {
                return Err(format!("{key} cannot be empty"));
            }
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(format!("{key} must start with http:// or https://"));
            }
        }

        if self.timeout_seconds == 0 {
            return Err("api.timeout_seconds must be > 0".to_string());
        }

        if self.concurrency == 0 || self.concurrency > 32 {
            return Err(format!(
                "api.concurrency must be between 1 and 32, got {}",
                self.concurrency
            ));
        }

        if self.session_ttl_seconds == 0 {
            return Err("api.session_ttl_seconds must be > 0".to_string());
        }

        if *environment == Environment::Production && !self.tls_verify {
            return Err(
                "TLS certificate verification cannot be disabled in production environments"
                    .to_string(),
            );
        }

        self.retry.validate()
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            auth_base_url: "http://localhost:8080/mock-auth-server".to_string(),
            aisr_api_base_url: "http://localhost:8080".to_string(),
            timeout_seconds: default_timeout_seconds(),
            tls_verify: true,
            retry: RetryConfig::default(),
            session_ttl_seconds: default_session_ttl_seconds(),
            max_reauth_attempts: default_max_reauth_attempts(),
            concurrency: default_concurrency(),
            delay_between_requests_ms: 0,
            latest_result_only: false,
            iddis: default_iddis(),
            upload_host: None,
        }
    }
}

/// Output and log locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Folder receiving transformed CSV files
    pub output_folder: PathBuf,

    /// Folder receiving log files and run manifests
    #[serde(alias = "log_folder")]
    pub logs_folder: PathBuf,

    /// Optional archive of raw registry downloads
    #[serde(default, alias = "aisr_downloads_folder")]
    pub raw_folder: Option<PathBuf>,
}

impl PathsConfig {
    pub fn new(output_folder: impl Into<PathBuf>, logs_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
            logs_folder: logs_folder.into(),
            raw_folder: None,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.output_folder.as_os_str().is_empty() {
            return Err("paths.output_folder cannot be empty".to_string());
        }
        if self.logs_folder.as_os_str().is_empty() {
            return Err("paths.logs_folder cannot be empty".to_string());
        }
        Ok(())
    }

    /// Folder holding run manifests
    pub fn manifest_folder(&self) -> PathBuf {
        self.logs_folder.join("manifests")
    }
}

/// Raw extract schema and normalization rules
///
/// The default schema is the AISR full vaccine file:
/// `id_1|id_2|name|dob|vaccine_group_name|vaccination_date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Raw column names, in order
    #[serde(default = "default_columns")]
    pub columns: Vec<String>,

    /// Column mapped to `id_1`
    #[serde(default = "default_student_id_column")]
    pub student_id_column: String,

    /// Column mapped to `id_2`; `id_2` is left empty when unset
    #[serde(default = "default_secondary_id_column")]
    pub secondary_id_column: Option<String>,

    /// Column mapped to `vaccine_group_name`
    #[serde(default = "default_vaccine_column")]
    pub vaccine_column: String,

    /// Column mapped to `vaccination_date`
    #[serde(default = "default_date_column")]
    pub date_column: String,

    /// Columns intentionally not carried into the output
    #[serde(default = "default_dropped_columns")]
    pub dropped_columns: Vec<String>,

    /// Accepted raw date formats, tried in order (chrono strftime syntax)
    #[serde(default = "default_input_date_formats")]
    pub input_date_formats: Vec<String>,

    /// Output date format (chrono strftime syntax)
    #[serde(default = "default_output_date_format")]
    pub output_date_format: String,

    /// Additional or overriding vaccine name mappings (raw name -> output name)
    #[serde(default)]
    pub vaccine_names: BTreeMap<String, String>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            columns: default_columns(),
            student_id_column: default_student_id_column(),
            secondary_id_column: default_secondary_id_column(),
            vaccine_column: default_vaccine_column(),
            date_column: default_date_column(),
            dropped_columns: default_dropped_columns(),
            input_date_formats: default_input_date_formats(),
            output_date_format: default_output_date_format(),
            vaccine_names: BTreeMap::new(),
        }
    }
}

impl TransformConfig {
    /// Validates that the column mapping is total and the date formats parse
    pub fn validate(&self) -> Result<(), String> {
        if self.columns.is_empty() {
            return Err("transform.columns cannot be empty".to_string());
        }

        let mut seen = HashSet::new();
        for column in &self.columns {
            if !seen.insert(column.as_str()) {
                return Err(format!("transform.columns contains '{column}' twice"));
            }
        }

        let mut mapped: Vec<&str> = vec![
            self.student_id_column.as_str(),
            self.vaccine_column.as_str(),
            self.date_column.as_str(),
        ];
        if let Some(secondary) = &self.secondary_id_column {
            mapped.push(secondary.as_str());
        }

        for column in &mapped {
            if !seen.contains(column) {
                return Err(format!(
                    "transform mapping refers to unknown column '{column}'"
                ));
            }
        }

        for column in &self.columns {
            let is_mapped = mapped.contains(&column.as_str());
            let is_dropped = self.dropped_columns.iter().any(|d| d == column);
            match (is_mapped, is_dropped) {
                (false, false) => {
                    return Err(format!(
                        "transform column '{column}' is neither mapped nor listed in dropped_columns"
                    ))
                }
                (true, true) => {
                    return Err(format!(
                        "transform column '{column}' is both mapped and dropped"
                    ))
                }
                _ => {}
            }
        }

        if self.input_date_formats.is_empty() {
            return Err("transform.input_date_formats cannot be empty".to_string());
        }
        for format in self
            .input_date_formats
            .iter()
            .chain(std::iter::once(&self.output_date_format))
        {
            validate_date_format(format)?;
        }

        for (raw, normalized) in &self.vaccine_names {
            if raw.trim().is_empty() || normalized.trim().is_empty() {
                return Err("transform.vaccine_names cannot contain empty names".to_string());
            }
        }

        Ok(())
    }

    /// Position of a named column in the raw schema
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn validate_date_format(format: &str) -> Result<(), String> {
    if format.trim().is_empty() {
        return Err("date formats cannot be empty".to_string());
    }
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid date format '{format}'"));
    }
    Ok(())
}

/// Incremental processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementalConfig {
    /// Produce a "new vaccinations" file after each download phase
    #[serde(default)]
    pub enabled: bool,

    /// Master file of every vaccination seen so far, inside the output folder
    #[serde(default = "default_master_file_name")]
    pub master_file_name: String,

    /// Subfolder of the output folder receiving the daily change files
    #[serde(default = "default_changes_folder")]
    pub changes_folder: String,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            master_file_name: default_master_file_name(),
            changes_folder: default_changes_folder(),
        }
    }
}

impl IncrementalConfig {
    fn validate(&self) -> Result<(), String> {
        if self.master_file_name.trim().is_empty() || self.master_file_name.contains('/') {
            return Err("incremental.master_file_name must be a plain file name".to_string());
        }
        if self.changes_folder.trim().is_empty() {
            return Err("incremental.changes_folder cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Logging configuration
///
/// Log files are written into `paths.logs_folder`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Enable local file logging
    #[serde(default = "default_true")]
    pub local_enabled: bool,

    /// Log rotation strategy (daily, hourly, never)
    #[serde(default = "default_local_rotation")]
    pub local_rotation: String,

    /// Log file name prefix
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl LoggingConfig {
    fn validate(&self) -> Result<(), String> {
        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&self.local_rotation.as_str()) {
            return Err(format!(
                "Invalid logging.local_rotation '{}'. Must be one of: {}",
                self.local_rotation,
                valid_rotations.join(", ")
            ));
        }
        if self.file_prefix.trim().is_empty() {
            return Err("logging.file_prefix cannot be empty".to_string());
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            local_enabled: true,
            local_rotation: default_local_rotation(),
            file_prefix: default_file_prefix(),
        }
    }
}

// Default value functions

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    60
}

fn default_max_retries() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_session_ttl_seconds() -> u64 {
    300
}

fn default_max_reauth_attempts() -> u32 {
    1
}

fn default_concurrency() -> usize {
    1
}

fn default_iddis() -> String {
    "0197".to_string()
}

fn default_columns() -> Vec<String> {
    ["id_1", "id_2", "name", "dob", "vaccine_group_name", "vaccination_date"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_student_id_column() -> String {
    "id_1".to_string()
}

fn default_secondary_id_column() -> Option<String> {
    Some("id_2".to_string())
}

fn default_vaccine_column() -> String {
    "vaccine_group_name".to_string()
}

fn default_date_column() -> String {
    "vaccination_date".to_string()
}

fn default_dropped_columns() -> Vec<String> {
    vec!["name".to_string(), "dob".to_string()]
}

fn default_input_date_formats() -> Vec<String> {
    vec!["%m/%d/%Y".to_string(), "%Y-%m-%d".to_string()]
}

fn default_output_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_master_file_name() -> String {
    "all_known_vaccinations.csv".to_string()
}

fn default_changes_folder() -> String {
    "changes".to_string()
}

fn default_local_rotation() -> String {
    "daily".to_string()
}

fn default_file_prefix() -> String {
    "immunization-etl.log".to_string()
}
