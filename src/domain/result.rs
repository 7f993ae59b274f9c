//! Result type alias
//!
//! Convenience alias that uses [`ImmunizationError`] as the error type.

use super::errors::ImmunizationError;

/// Result type alias for pipeline operations
///
/// # Examples
///
/// ```
/// use immunization_etl::domain::result::Result;
/// use immunization_etl::domain::errors::ImmunizationError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(ImmunizationError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, ImmunizationError>;
