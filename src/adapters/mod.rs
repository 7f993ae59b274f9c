//! External system integrations.
//!
//! - [`aisr`] - State immunization registry (AISR) login, bulk query upload
//!   and result download
//!
//! Registry access sits behind the [`aisr::Authenticator`] and
//! [`aisr::RegistryClient`] traits; [`aisr::InMemoryRegistry`] implements
//! both for tests.

pub mod aisr;
