// Immunization ETL - AISR to school information system
// Copyright (c) 2025 Immunization ETL Contributors
// Licensed under the MIT License

//! # Immunization ETL - AISR to school information system
//!
//! Moves student immunization histories from the state immunization registry
//! (AISR) into per-school CSV files that a school information system imports.
//!
//! ## Overview
//!
//! The registry answers bulk queries asynchronously, so the work is split into
//! two scheduled phases:
//!
//! - **Upload**: log in once and submit each school's bulk query file
//! - **Download**: log in once, fetch every available result per school,
//!   normalize vaccine codes and dates, and write one CSV per school
//!
//! A local **transform** cycle re-processes archived raw extracts without
//! touching the registry, and every phase writes a JSON run manifest that the
//! `check-errors` command summarizes.
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Workflow, extract/transform/load stages, manifests
//! - [`adapters`] - AISR authentication and registry client
//! - [`domain`] - Records, identifiers and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use immunization_etl::domain::Credentials;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Credentials::new("etl-user", "secret");
//!     let manifest =
//!         immunization_etl::run_download_phase(Path::new("config/config.json"), credentials)
//!             .await?;
//!
//!     println!(
//!         "{} schools done, {} records written",
//!         manifest.count(immunization_etl::core::manifest::EntityStatus::Done),
//!         manifest.total_records()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library operations return [`domain::ImmunizationError`]. Failures of a
//! single school are recorded in the run manifest instead of aborting the
//! phase; only configuration errors and manifest write failures surface as
//! `Err`.
//!
//! ## Logging
//!
//! Logging uses the `tracing` crate; see [`logging::init_logging`].

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;

pub use core::workflow::{run_download_phase, run_upload_phase};
