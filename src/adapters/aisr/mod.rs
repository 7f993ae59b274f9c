//! AISR state immunization registry adapter
//!
//! This module provides the Keycloak login flow, the registry API client,
//! its wire models, and an in-memory registry for tests.

pub mod auth;
pub mod client;
mod http;
pub mod memory;
pub mod models;

pub use auth::{Authenticator, KeycloakAuthenticator, Session};
pub use client::{AisrClient, RegistryClient};
pub use memory::InMemoryRegistry;
pub use models::{QueryResult, UploadConfirmation};
