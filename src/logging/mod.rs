//! Logging and observability
//!
//! Structured logging with:
//! - Console output at the configured level
//! - JSON log files with rotation in `paths.logs_folder`
//!
//! # Example
//!
//! ```no_run
//! use immunization_etl::config::LoggingConfig;
//! use immunization_etl::logging::init_logging;
//! use std::path::Path;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config, Path::new("logs")).expect("Failed to initialize logging");
//!
//! tracing::info!(entity_id = "2542", "Phase started");
//! ```

pub mod structured;

pub use structured::{init_logging, parse_log_level, LoggingGuard};
