//! Run identity shared by the stages of one phase

use chrono::{DateTime, Utc};

/// Timestamp format used in output and manifest file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Identity of one phase invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    /// Short random run identifier (8 hex characters)
    pub run_id: String,

    /// Phase start time
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    pub fn at(started_at: DateTime<Utc>) -> Self {
        let run_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        Self { run_id, started_at }
    }

    /// Start time formatted for file names
    pub fn timestamp(&self) -> String {
        self.started_at.format(FILE_TIMESTAMP_FORMAT).to_string()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}
