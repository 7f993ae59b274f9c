//! Domain models and types.
//!
//! This module contains the types every other layer speaks in: entities
//! (schools), credentials, raw and normalized records, identifiers and the
//! error hierarchy.
//!
//! # Type Safety
//!
//! School identifiers are wrapped in [`EntityId`], which rejects empty values
//! and path separators because the identifier ends up in output file names:
//!
//! ```rust
//! use immunization_etl::domain::EntityId;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let id = EntityId::new("2542")?;
//! assert_eq!(id.as_str(), "2542");
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ImmunizationError>`]. Registry
//! and transform failures keep their own enums ([`RegistryError`],
//! [`TransformError`]) so they can be classified per entity with
//! [`ErrorKind`].

pub mod entity;
pub mod errors;
pub mod ids;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use entity::{Credentials, EntityConfig, DEFAULT_OUTPUT_PATTERN};
pub use errors::{ErrorKind, ImmunizationError, RegistryError, TransformError, UploadStep};
pub use ids::{EntityId, ResultId};
pub use record::{NormalizedRecord, RawExtract, RawRecord, OUTPUT_COLUMNS};
pub use result::Result;
