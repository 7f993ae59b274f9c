//! Core pipeline logic.
//!
//! # Modules
//!
//! - [`extract`] - Per-school registry work of the upload and download phases
//! - [`transform`] - Pipe-delimited extract to normalized record conversion
//! - [`load`] - CSV output files and raw extract archiving
//! - [`incremental`] - Master file and daily "new vaccinations" changes
//! - [`manifest`] - Run manifests and error reports
//! - [`workflow`] - Phase orchestration and the shared registry session
//!
//! # Download Workflow
//!
//! 1. **Authenticate**: one Keycloak login shared by every school
//! 2. **Download**: list and fetch each school's results
//! 3. **Transform**: parse, map vaccine names, reformat dates
//! 4. **Load**: write `{id}_{timestamp}.csv` per school
//! 5. **Report**: write the run manifest
//!
//! # Example
//!
//! ```rust,no_run
//! use immunization_etl::config::load_config;
//! use immunization_etl::core::workflow::OrchestratorBuilder;
//! use immunization_etl::domain::Credentials;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("config/config.json")?;
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let orchestrator = OrchestratorBuilder::new(config)
//!     .credentials(Credentials::new("etl-user", "secret"))
//!     .shutdown_signal(shutdown_rx)
//!     .build()?;
//!
//! let manifest = orchestrator.run_download().await?;
//! println!("Status: {:?}", manifest.status);
//! println!("Records: {}", manifest.total_records());
//! # Ok(())
//! # }
//! ```

pub mod extract;
pub mod incremental;
pub mod load;
pub mod manifest;
pub mod run;
pub mod transform;
pub mod workflow;
