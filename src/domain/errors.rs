//! Domain error types
//!
//! This module defines the error hierarchy for the pipeline. Registry and
//! transform failures have their own enums so that the orchestrator can decide
//! per entity whether a failure is retryable, triggers re-authentication, or is
//! recorded and isolated. No third-party error types leak through these enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Main error type
///
/// This is the primary error type used throughout the application.
#[derive(Debug, Error)]
pub enum ImmunizationError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// AISR registry errors
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Raw extract transformation errors
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Credential lookup errors
    #[error("Credential error: {0}")]
    Credentials(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Manifest read/write errors
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl ImmunizationError {
    /// Classifies the error for manifest reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            ImmunizationError::Registry(e) => e.kind(),
            ImmunizationError::Transform(e) => e.kind(),
            ImmunizationError::Io(_) => ErrorKind::IoError,
            ImmunizationError::Configuration(_) | ImmunizationError::Validation(_) => {
                ErrorKind::ConfigurationError
            }
            ImmunizationError::Credentials(_) => ErrorKind::AuthenticationError,
            _ => ErrorKind::Other,
        }
    }
}

/// Step of the two-step bulk query upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStep {
    /// Requesting the signed upload URL from the registry
    SignedUrl,
    /// Transferring the query file to the signed URL
    Transfer,
}

impl fmt::Display for UploadStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStep::SignedUrl => write!(f, "signed-url"),
            UploadStep::Transfer => write!(f, "transfer"),
        }
    }
}

/// AISR registry errors
///
/// Errors that occur while talking to the registry's authentication or API
/// endpoints. Only [`RegistryError::Network`] is transient.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    /// The registry rejected the credentials or the login flow broke
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The session token is no longer accepted
    #[error("Session expired: {0}")]
    AuthExpired(String),

    /// The registry refused the bulk query upload
    #[error("Upload rejected at {step} step: {message}")]
    UploadRejected { step: UploadStep, message: String },

    /// Connection, timeout, throttling or server-side failure
    #[error("Network error{}: {message}", step.map(|s| format!(" at {s} step")).unwrap_or_default())]
    Network {
        step: Option<UploadStep>,
        message: String,
    },

    /// Resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response could not be understood
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// A local file needed for the request could not be read
    #[error("I/O error: {0}")]
    Io(String),
}

impl RegistryError {
    /// Creates a network error outside of the upload protocol
    pub fn network(message: impl Into<String>) -> Self {
        RegistryError::Network {
            step: None,
            message: message.into(),
        }
    }

    /// Whether the operation may be retried as-is
    pub fn is_transient(&self) -> bool {
        matches!(self, RegistryError::Network { .. })
    }

    /// Whether the error asks for a fresh session
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, RegistryError::AuthExpired(_))
    }

    /// Upload step the error belongs to, if any
    pub fn upload_step(&self) -> Option<UploadStep> {
        match self {
            RegistryError::UploadRejected { step, .. } => Some(*step),
            RegistryError::Network { step, .. } => *step,
            _ => None,
        }
    }

    /// Attaches the upload step to a step-less network error
    pub fn at_step(self, step: UploadStep) -> Self {
        match self {
            RegistryError::Network { step: None, message } => RegistryError::Network {
                step: Some(step),
                message,
            },
            other => other,
        }
    }

    /// Classifies the error for manifest reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::AuthenticationFailed(_) => ErrorKind::AuthenticationError,
            RegistryError::AuthExpired(_) => ErrorKind::AuthExpired,
            RegistryError::UploadRejected { .. } => ErrorKind::UploadRejected,
            RegistryError::Network { .. } => ErrorKind::NetworkError,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            RegistryError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            RegistryError::Io(_) => ErrorKind::IoError,
        }
    }
}

/// Raw extract transformation errors
///
/// Line numbers are 1-based positions in the raw extract.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    /// Row has the wrong number of pipe-delimited fields
    #[error("Line {line}: expected {expected} fields, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// Date field matches none of the accepted formats
    #[error("Line {line}: unparseable date '{value}'")]
    InvalidDate { line: usize, value: String },

    /// Required identifier is blank
    #[error("Line {line}: empty value in required column '{column}'")]
    MissingValue { line: usize, column: String },

    /// Extract is not valid UTF-8
    #[error("Extract is not valid UTF-8: {0}")]
    Encoding(String),

    /// Vaccine name has no entry in the mapping table
    #[error("Line {line}: unknown vaccine code '{code}'")]
    UnknownVaccineCode { line: usize, code: String },
}

impl TransformError {
    /// Classifies the error for manifest reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransformError::UnknownVaccineCode { .. } => ErrorKind::UnknownVaccineCode,
            _ => ErrorKind::ParseError,
        }
    }
}

/// Error classification recorded in run manifests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationError,
    AuthExpired,
    NetworkError,
    UploadRejected,
    NotFound,
    MalformedResponse,
    ParseError,
    UnknownVaccineCode,
    IoError,
    ConfigurationError,
    Cancelled,
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::AuthenticationError => "AuthenticationError",
            ErrorKind::AuthExpired => "AuthExpired",
            ErrorKind::NetworkError => "NetworkError",
            ErrorKind::UploadRejected => "UploadRejected",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::MalformedResponse => "MalformedResponse",
            ErrorKind::ParseError => "ParseError",
            ErrorKind::UnknownVaccineCode => "UnknownVaccineCode",
            ErrorKind::IoError => "IOError",
            ErrorKind::ConfigurationError => "ConfigurationError",
            ErrorKind::Cancelled => "Cancelled",
            ErrorKind::Other => "Other",
        };
        write!(f, "{name}")
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for ImmunizationError {
    fn from(err: std::io::Error) -> Self {
        ImmunizationError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for ImmunizationError {
    fn from(err: serde_json::Error) -> Self {
        ImmunizationError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for ImmunizationError {
    fn from(err: toml::de::Error) -> Self {
        ImmunizationError::Configuration(format!("TOML parse error: {err}"))
    }
}

impl From<csv::Error> for ImmunizationError {
    fn from(err: csv::Error) -> Self {
        ImmunizationError::Io(format!("CSV error: {err}"))
    }
}
