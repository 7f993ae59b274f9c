//! CLI interface and argument parsing
//!
//! This module provides the command-line interface using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.json";

/// Environment variable holding the registry password
pub const PASSWORD_ENV_VAR: &str = "AISR_PASSWORD";

/// Immunization ETL - AISR to school information system
#[derive(Parser, Debug)]
#[command(name = "immunization-etl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (JSON, or TOML by extension)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, env = "IMMUNIZATION_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "IMMUNIZATION_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// AISR username; the password is read from AISR_PASSWORD
    #[arg(short, long, env = "AISR_USERNAME", global = true)]
    pub username: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload each school's bulk query file to AISR
    SubmitQueries(commands::phase::PhaseArgs),

    /// Download AISR results and write one CSV per school
    DownloadAndTransform(commands::phase::PhaseArgs),

    /// List errors recorded in run manifests
    CheckErrors(commands::check_errors::CheckErrorsArgs),

    /// Re-process raw extract files from a local folder
    Transform(commands::transform::TransformArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),
}
