//! Run manifests
//!
//! Every phase invocation ends by writing a [`RunManifest`]: which entities
//! were processed, what was produced, and what went wrong. Manifests are the
//! only persistent state of the pipeline; `check-errors` reads them back.

pub mod report;
pub mod store;

pub use report::{collect_errors, ErrorEntry, ErrorReport, ErrorScope};
pub use store::ManifestStore;

use crate::core::load::LoadedFile;
use crate::core::run::RunContext;
use crate::domain::{EntityConfig, ErrorKind, ImmunizationError, RegistryError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Which cycle produced a manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Upload,
    Download,
    Transform,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Upload => write!(f, "upload"),
            Phase::Download => write!(f, "download"),
            Phase::Transform => write!(f, "transform"),
        }
    }
}

/// Overall run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every entity succeeded
    Done,
    /// At least one entity failed or was not attempted
    Partial,
    /// The phase could not run (authentication, fatal error)
    Failed,
}

/// Per-entity status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Done,
    Failed,
    NotAttempted,
}

/// Error as stored in a manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RecordedError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "Shutdown requested before processing")
    }
}

impl From<&ImmunizationError> for RecordedError {
    fn from(err: &ImmunizationError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl From<&RegistryError> for RecordedError {
    fn from(err: &RegistryError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for RecordedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Outcome of one entity within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityOutcome {
    pub entity_id: String,
    pub entity_name: String,
    pub status: EntityStatus,

    /// Records written (download and transform phases)
    #[serde(default)]
    pub records: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedError>,
}

impl EntityOutcome {
    fn base(entity: &EntityConfig, status: EntityStatus) -> Self {
        Self {
            entity_id: entity.id.to_string(),
            entity_name: entity.name.clone(),
            status,
            records: 0,
            output_path: None,
            sha256: None,
            error: None,
        }
    }

    /// Successful upload (nothing written locally)
    pub fn uploaded(entity: &EntityConfig) -> Self {
        Self::base(entity, EntityStatus::Done)
    }

    /// Successful download or transform with its output file
    pub fn loaded(entity: &EntityConfig, file: &LoadedFile) -> Self {
        Self {
            records: file.records,
            output_path: Some(file.path.clone()),
            sha256: Some(file.sha256.clone()),
            ..Self::base(entity, EntityStatus::Done)
        }
    }

    pub fn failed(entity: &EntityConfig, error: RecordedError) -> Self {
        Self {
            error: Some(error),
            ..Self::base(entity, EntityStatus::Failed)
        }
    }

    pub fn not_attempted(entity: &EntityConfig, reason: Option<RecordedError>) -> Self {
        Self {
            error: reason,
            ..Self::base(entity, EntityStatus::NotAttempted)
        }
    }

    pub fn is_done(&self) -> bool {
        self.status == EntityStatus::Done
    }
}

/// Record of one phase invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,

    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,

    pub status: RunStatus,

    /// Error that stopped the phase as a whole
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<RecordedError>,

    /// Set when a shutdown signal cut the run short
    #[serde(default)]
    pub interrupted: bool,

    /// Outcomes in configuration order
    #[serde(default)]
    pub entities: Vec<EntityOutcome>,

    #[serde(default)]
    pub outputs: Vec<PathBuf>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub raw_archives: Vec<PathBuf>,

    /// Incremental changes file, when one was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes_file: Option<PathBuf>,

    pub version: String,
}

impl RunManifest {
    pub fn new(run: &RunContext, phase: Phase) -> Self {
        Self {
            run_id: run.run_id.clone(),
            phase,
            started_at: run.started_at,
            finished_at: None,
            status: RunStatus::Done,
            fatal_error: None,
            interrupted: false,
            entities: Vec::new(),
            outputs: Vec::new(),
            raw_archives: Vec::new(),
            changes_file: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Appends an entity outcome, registering its output file
    pub fn record(&mut self, outcome: EntityOutcome) {
        if let Some(path) = &outcome.output_path {
            self.outputs.push(path.clone());
        }
        self.entities.push(outcome);
    }

    /// Marks the phase as failed as a whole
    pub fn fail(&mut self, error: RecordedError) {
        self.fatal_error = Some(error);
    }

    /// Stamps the finish time and derives the overall status
    ///
    /// A fatal error makes the run `Failed`; otherwise any entity that is not
    /// `Done` makes it `Partial`.
    pub fn finish(&mut self, finished_at: DateTime<Utc>) {
        self.finished_at = Some(finished_at);
        self.status = if self.fatal_error.is_some() {
            RunStatus::Failed
        } else if self.entities.iter().all(EntityOutcome::is_done) {
            RunStatus::Done
        } else {
            RunStatus::Partial
        };
    }

    pub fn count(&self, status: EntityStatus) -> usize {
        self.entities.iter().filter(|e| e.status == status).count()
    }

    pub fn total_records(&self) -> usize {
        self.entities.iter().map(|e| e.records).sum()
    }

    /// Process exit code for this run
    ///
    /// 0 done, 1 partial, 3 failed, 130 interrupted.
    pub fn exit_code(&self) -> i32 {
        if self.interrupted {
            return 130;
        }
        match self.status {
            RunStatus::Done => 0,
            RunStatus::Partial => 1,
            RunStatus::Failed => 3,
        }
    }

    pub fn log_summary(&self) {
        let duration_ms = self
            .finished_at
            .map(|f| (f - self.started_at).num_milliseconds())
            .unwrap_or_default();

        tracing::info!(
            run_id = %self.run_id,
            phase = %self.phase,
            status = ?self.status,
            done = self.count(EntityStatus::Done),
            failed = self.count(EntityStatus::Failed),
            not_attempted = self.count(EntityStatus::NotAttempted),
            records = self.total_records(),
            duration_ms,
            "Phase finished"
        );

        if let Some(error) = &self.fatal_error {
            tracing::error!(run_id = %self.run_id, kind = %error.kind, message = %error.message, "Phase failed");
        }
        for entity in &self.entities {
            if let Some(error) = &entity.error {
                tracing::warn!(
                    run_id = %self.run_id,
                    entity_id = %entity.entity_id,
                    status = ?entity.status,
                    kind = %error.kind,
                    message = %error.message,
                    "Entity error"
                );
            }
        }
    }
}
