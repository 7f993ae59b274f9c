//! In-memory registry
//!
//! A scripted stand-in for AISR implementing both [`Authenticator`] and
//! [`RegistryClient`]. It issues real tokens and rejects stale ones, so the
//! session handling of the orchestrator is exercised the same way as against
//! the real registry.

use super::auth::{Authenticator, Session};
use super::client::RegistryClient;
use super::models::{QueryResult, UploadConfirmation};
use crate::domain::{Credentials, EntityConfig, RegistryError, UploadStep};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct RegistryState {
    results: HashMap<String, Vec<(QueryResult, Vec<u8>)>>,
    upload_failures: HashMap<String, RegistryError>,
    download_failures: HashMap<String, RegistryError>,
    expire_before: HashSet<String>,
    login_error: Option<RegistryError>,
    max_logins: Option<u32>,
    valid_token: Option<String>,
    logins: u32,
    logouts: u32,
    uploads: Vec<(String, Vec<u8>)>,
    calls: Vec<String>,
}

/// Scripted in-memory AISR
///
/// ```
/// use immunization_etl::adapters::aisr::InMemoryRegistry;
///
/// let registry = InMemoryRegistry::new()
///     .with_result("2542", "r1", "1|2|Jane|01/01/2010|MMR|05/01/2023\n");
/// assert_eq!(registry.login_count(), 0);
/// ```
#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<RegistryState>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds a downloadable result; results are listed in insertion order
    pub fn with_result(
        self,
        entity_id: &str,
        result_id: &str,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        {
            let mut state = self.state();
            let list = state.results.entry(entity_id.to_string()).or_default();
            let uploaded_at = Utc
                .timestamp_millis_opt(1_740_764_967_763 + list.len() as i64 * 60_000)
                .single();
            let mut result = QueryResult::new(
                result_id,
                format!("memory://{entity_id}/{result_id}"),
            );
            result.uploaded_at = uploaded_at;
            list.push((result, content.into()));
        }
        self
    }

    /// Makes every upload for the entity fail with `error`
    pub fn with_upload_failure(self, entity_id: &str, error: RegistryError) -> Self {
        self.state()
            .upload_failures
            .insert(entity_id.to_string(), error);
        self
    }

    /// Makes every result list or download for the entity fail with `error`
    pub fn with_download_failure(self, entity_id: &str, error: RegistryError) -> Self {
        self.state()
            .download_failures
            .insert(entity_id.to_string(), error);
        self
    }

    /// Revokes the current token the first time the entity is touched
    pub fn expire_session_before(self, entity_id: &str) -> Self {
        self.state().expire_before.insert(entity_id.to_string());
        self
    }

    /// Makes every login fail with `error`
    pub fn with_login_failure(self, error: RegistryError) -> Self {
        self.state().login_error = Some(error);
        self
    }

    /// Lets only the first `n` logins succeed
    pub fn with_login_limit(self, n: u32) -> Self {
        self.state().max_logins = Some(n);
        self
    }

    pub fn login_count(&self) -> u32 {
        self.state().logins
    }

    pub fn logout_count(&self) -> u32 {
        self.state().logouts
    }

    /// Uploaded `(entity_id, bytes)` pairs in arrival order
    pub fn uploads(&self) -> Vec<(String, Vec<u8>)> {
        self.state().uploads.clone()
    }

    /// Entity ids of registry calls in arrival order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Records the call and checks the token
    fn admit(&self, session: &Session, entity_id: &str) -> Result<(), RegistryError> {
        let mut state = self.state();
        state.calls.push(entity_id.to_string());

        if state.expire_before.remove(entity_id) {
            state.valid_token = None;
        }
        if state.valid_token.as_deref() != Some(session.token()) {
            return Err(RegistryError::AuthExpired(
                "HTTP 401 Unauthorized: token is no longer valid".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Authenticator for InMemoryRegistry {
    async fn login(&self, credentials: &Credentials) -> Result<Session, RegistryError> {
        let mut state = self.state();
        if let Some(error) = &state.login_error {
            return Err(error.clone());
        }
        if let Some(max) = state.max_logins {
            if state.logins >= max {
                return Err(RegistryError::AuthenticationFailed(
                    "login rejected by registry".to_string(),
                ));
            }
        }

        state.logins += 1;
        let token = format!("memory-token-{}-{}", credentials.username, state.logins);
        state.valid_token = Some(token.clone());
        Ok(Session::new(token, Utc::now() + ChronoDuration::minutes(30)))
    }

    async fn logout(&self, session: &Session) {
        let mut state = self.state();
        state.logouts += 1;
        if state.valid_token.as_deref() == Some(session.token()) {
            state.valid_token = None;
        }
    }
}

#[async_trait]
impl RegistryClient for InMemoryRegistry {
    async fn submit_bulk_query(
        &self,
        session: &Session,
        entity: &EntityConfig,
        query_file: &Path,
    ) -> Result<UploadConfirmation, RegistryError> {
        self.admit(session, entity.id.as_str())?;

        if let Some(error) = self.state().upload_failures.get(entity.id.as_str()) {
            return Err(error.clone());
        }

        let payload = tokio::fs::read(query_file).await.map_err(|e| {
            RegistryError::Io(format!(
                "cannot read bulk query file {}: {e}",
                query_file.display()
            ))
        })?;
        if payload.is_empty() {
            return Err(RegistryError::UploadRejected {
                step: UploadStep::Transfer,
                message: "Empty request body.".to_string(),
            });
        }

        let bytes_sent = payload.len();
        self.state()
            .uploads
            .push((entity.id.to_string(), payload));
        Ok(UploadConfirmation {
            entity_id: entity.id.to_string(),
            bytes_sent,
        })
    }

    async fn fetch_result_list(
        &self,
        session: &Session,
        entity: &EntityConfig,
    ) -> Result<Vec<QueryResult>, RegistryError> {
        self.admit(session, entity.id.as_str())?;

        let state = self.state();
        if let Some(error) = state.download_failures.get(entity.id.as_str()) {
            return Err(error.clone());
        }
        Ok(state
            .results
            .get(entity.id.as_str())
            .map(|list| list.iter().map(|(r, _)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn download_result(
        &self,
        session: &Session,
        entity: &EntityConfig,
        result: &QueryResult,
    ) -> Result<Vec<u8>, RegistryError> {
        self.admit(session, entity.id.as_str())?;

        let state = self.state();
        state
            .results
            .get(entity.id.as_str())
            .and_then(|list| list.iter().find(|(r, _)| r.id == result.id))
            .map(|(_, content)| content.clone())
            .ok_or_else(|| RegistryError::NotFound(format!("result {} not found", result.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityId;

    fn entity(id: &str) -> EntityConfig {
        EntityConfig::new(EntityId::new(id).unwrap(), "School", "query.csv")
    }

    fn credentials() -> Credentials {
        Credentials::new("nurse", "pw")
    }

    #[tokio::test]
    async fn test_stale_token_is_rejected() {
        let registry = InMemoryRegistry::new().with_result("1", "r1", "x");
        let first = registry.login(&credentials()).await.unwrap();
        let second = registry.login(&credentials()).await.unwrap();

        let err = registry
            .fetch_result_list(&first, &entity("1"))
            .await
            .unwrap_err();
        assert!(err.is_auth_expired());

        let results = registry.fetch_result_list(&second, &entity("1")).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn test_expire_session_before_entity() {
        let registry = InMemoryRegistry::new().expire_session_before("3");
        let session = registry.login(&credentials()).await.unwrap();

        assert!(registry.fetch_result_list(&session, &entity("2")).await.is_ok());
        assert!(registry
            .fetch_result_list(&session, &entity("3"))
            .await
            .unwrap_err()
            .is_auth_expired());

        let session = registry.login(&credentials()).await.unwrap();
        assert!(registry.fetch_result_list(&session, &entity("3")).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_limit() {
        let registry = InMemoryRegistry::new().with_login_limit(1);
        assert!(registry.login(&credentials()).await.is_ok());
        assert!(matches!(
            registry.login(&credentials()).await,
            Err(RegistryError::AuthenticationFailed(_))
        ));
        assert_eq!(registry.login_count(), 1);
    }

    #[tokio::test]
    async fn test_results_are_listed_oldest_first() {
        let registry = InMemoryRegistry::new()
            .with_result("1", "old", "a")
            .with_result("1", "new", "b");
        let session = registry.login(&credentials()).await.unwrap();
        let results = registry.fetch_result_list(&session, &entity("1")).await.unwrap();
        assert_eq!(results[0].id.as_str(), "old");
        assert!(results[0].uploaded_at < results[1].uploaded_at);
    }
}
