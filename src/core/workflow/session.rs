//! Registry session shared by all entity workers of a phase
//!
//! One login serves every entity. When a worker sees its token rejected it
//! asks for a refresh naming the generation it used; the first such request
//! logs in again while holding the lock, and later requests for the same
//! generation just receive the new session. Refreshes are bounded by
//! `api.max_reauth_attempts`, and a failed refresh is final for the phase.

use crate::adapters::aisr::{Authenticator, Session};
use crate::domain::{Credentials, RegistryError};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;

struct SessionState {
    current: Option<Session>,
    generation: u64,
    reauths: u32,
    failure: Option<RegistryError>,
}

pub struct SharedSession {
    authenticator: Arc<dyn Authenticator>,
    credentials: Credentials,
    max_reauth_attempts: u32,
    state: Mutex<SessionState>,
}

impl SharedSession {
    /// Performs the initial login
    ///
    /// # Errors
    ///
    /// Returns the authenticator's error; no session is held afterwards.
    pub async fn login(
        authenticator: Arc<dyn Authenticator>,
        credentials: Credentials,
        max_reauth_attempts: u32,
    ) -> Result<Self, RegistryError> {
        let session = authenticator.login(&credentials).await?.with_generation(1);
        tracing::info!(
            username = %credentials.username,
            expires_at = %session.expires_at(),
            "Registry session established"
        );

        Ok(Self {
            authenticator,
            credentials,
            max_reauth_attempts,
            state: Mutex::new(SessionState {
                current: Some(session),
                generation: 1,
                reauths: 0,
                failure: None,
            }),
        })
    }

    /// Returns a usable session, refreshing it first if its expiry has passed
    pub async fn current(&self) -> Result<Session, RegistryError> {
        let (session, generation) = {
            let state = self.state.lock().await;
            if let Some(failure) = &state.failure {
                return Err(failure.clone());
            }
            (state.current.clone(), state.generation)
        };

        match session {
            Some(session) if session.is_valid_at(Utc::now()) => Ok(session),
            Some(_) => {
                tracing::info!(generation, "Registry session reached its expiry");
                self.refresh(generation).await
            }
            None => Err(RegistryError::AuthExpired("session already released".to_string())),
        }
    }

    /// Replaces the session of `stale_generation` with a fresh one
    ///
    /// If another worker already replaced it, the newer session is returned
    /// without logging in again.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AuthenticationFailed`] when the refresh limit
    /// is reached or the login fails. The failure is remembered and returned
    /// to every later caller.
    pub async fn refresh(&self, stale_generation: u64) -> Result<Session, RegistryError> {
        let mut state = self.state.lock().await;

        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }
        if state.generation != stale_generation {
            if let Some(session) = &state.current {
                return Ok(session.clone());
            }
        }

        if state.reauths >= self.max_reauth_attempts {
            let failure = RegistryError::AuthenticationFailed(format!(
                "re-authentication limit of {} reached",
                self.max_reauth_attempts
            ));
            state.failure = Some(failure.clone());
            return Err(failure);
        }

        state.reauths += 1;
        tracing::warn!(
            generation = state.generation,
            attempt = state.reauths,
            "Re-authenticating with the registry"
        );

        match self.authenticator.login(&self.credentials).await {
            Ok(session) => {
                state.generation += 1;
                let session = session.with_generation(state.generation);
                state.current = Some(session.clone());
                tracing::info!(generation = state.generation, "Registry session refreshed");
                Ok(session)
            }
            Err(e) => {
                let failure = match e {
                    RegistryError::AuthenticationFailed(_) => e,
                    other => RegistryError::AuthenticationFailed(format!(
                        "re-authentication failed: {other}"
                    )),
                };
                tracing::error!(error = %failure, "Re-authentication failed");
                state.failure = Some(failure.clone());
                state.current = None;
                Err(failure)
            }
        }
    }

    /// Number of refreshes performed so far
    pub async fn reauth_count(&self) -> u32 {
        self.state.lock().await.reauths
    }

    /// Releases the session; safe to call more than once
    pub async fn logout(&self) {
        let session = self.state.lock().await.current.take();
        if let Some(session) = session {
            self.authenticator.logout(&session).await;
            tracing::info!(generation = session.generation(), "Registry session released");
        }
    }
}
