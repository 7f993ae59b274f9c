//! Configuration management.
//!
//! Configuration is read once at startup, validated, and passed explicitly to
//! the orchestrator. JSON is the default format; files ending in `.toml` are
//! parsed as TOML.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use immunization_etl::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("config/config.json")?;
//!
//! println!("AISR API: {}", config.api.aisr_api_base_url);
//! for school in &config.schools {
//!     println!("{} ({})", school.name, school.id);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`ApiConfig`] - Keycloak and AISR endpoints, retries, concurrency
//! - [`PathsConfig`] - Output, log and raw archive folders
//! - `schools` - One [`EntityConfig`](crate::domain::EntityConfig) per school
//! - [`TransformConfig`] - Raw column schema, date formats, vaccine names
//! - [`IncrementalConfig`] - "New vaccinations" change files
//! - [`LoggingConfig`] - Local log files
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "api": {
//!     "auth_base_url": "https://authenticator4.web.health.state.mn.us",
//!     "aisr_api_base_url": "https://aisr-api.web.health.state.mn.us"
//!   },
//!   "paths": {
//!     "output_folder": "output",
//!     "logs_folder": "logs"
//!   },
//!   "schools": [
//!     {
//!       "name": "Friendly Hills Mid",
//!       "id": "2542",
//!       "email": "${SCHOOL_CONTACT_EMAIL}",
//!       "bulk_query_file": "queries/friendly_hills.csv"
//!     }
//!   ]
//! }
//! ```
//!
//! # Environment Variables
//!
//! `${VAR_NAME}` placeholders are substituted before parsing, and
//! `IMMUNIZATION_<SECTION>_<KEY>` variables override individual values. The
//! registry password is never part of the configuration; it is read from
//! `AISR_PASSWORD`.

pub mod loader;
pub mod schema;
pub mod secret;

pub use loader::{load_config, parse_config, ConfigFormat};
pub use schema::{
    ApiConfig, AppConfig, ApplicationConfig, Environment, IncrementalConfig, LoggingConfig,
    PathsConfig, RetryConfig, TransformConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
