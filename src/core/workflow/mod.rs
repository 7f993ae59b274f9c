//! Workflow orchestration
//!
//! Drives the three cycles over all configured schools:
//!
//! - **upload**: log in, submit each school's bulk query file, log out
//! - **download**: log in, download every available result, log out,
//!   transform, write one CSV per school, optionally update the incremental
//!   master and changes files
//! - **transform**: re-process raw extract files from a local folder
//!
//! The registry processes uploaded queries on its own schedule, so upload and
//! download are separate invocations, typically scheduled hours apart.
//!
//! # Example
//!
//! ```no_run
//! use immunization_etl::domain::Credentials;
//! use std::path::Path;
//!
//! # async fn example() -> immunization_etl::domain::Result<()> {
//! let credentials = Credentials::from_env("etl-user", "AISR_PASSWORD")
//!     .map_err(immunization_etl::domain::ImmunizationError::Credentials)?;
//! let manifest =
//!     immunization_etl::run_upload_phase(Path::new("config/config.json"), credentials).await?;
//! println!("upload finished: {:?}", manifest.status);
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod orchestrator;
pub mod session;

pub use builder::OrchestratorBuilder;
pub use orchestrator::{PhaseState, WorkflowOrchestrator};
pub use session::SharedSession;

use crate::config::load_config;
use crate::core::manifest::RunManifest;
use crate::domain::{Credentials, Result};
use std::path::Path;

/// Loads the configuration and runs one upload cycle
///
/// Nothing is shared between calls: configuration, clients and session are
/// created fresh each time.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, a client cannot be
/// built, or the manifest cannot be written. Registry and per-school
/// failures are reported in the manifest.
pub async fn run_upload_phase(config_path: &Path, credentials: Credentials) -> Result<RunManifest> {
    let config = load_config(config_path)?;
    OrchestratorBuilder::new(config)
        .credentials(credentials)
        .build()?
        .run_upload()
        .await
}

/// Loads the configuration and runs one download cycle
///
/// # Errors
///
/// Same as [`run_upload_phase`].
pub async fn run_download_phase(config_path: &Path, credentials: Credentials) -> Result<RunManifest> {
    let config = load_config(config_path)?;
    OrchestratorBuilder::new(config)
        .credentials(credentials)
        .build()?
        .run_download()
        .await
}
