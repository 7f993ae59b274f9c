//! AISR authentication against the state Keycloak realm
//!
//! AISR uses a browser-style OpenID Connect authorization code flow:
//!
//! 1. `GET .../protocol/openid-connect/auth` returns the login page; the
//!    `kc-form-login` form action carries `session_code` and `tab_id`
//! 2. `POST .../login-actions/authenticate` with the credentials answers
//!    `302` with a `KEYCLOAK_IDENTITY` cookie and the authorization code in
//!    the `Location` fragment
//! 3. `POST .../protocol/openid-connect/token` exchanges the code for an
//!    access token
//!
//! Sessions are released with `GET .../protocol/openid-connect/logout`.

use super::http::{build_client, retry_request, transport_error};
use super::models::TokenResponse;
use crate::config::{secret_string, ApiConfig, SecretString};
use crate::domain::{Credentials, RegistryError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use regex::Regex;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use url::Url;

const REALM_PATH: &str = "/auth/realms/idepc-aisr-realm";
const CLIENT_ID: &str = "aisr-app";
const REDIRECT_URI: &str = "https://aisr.web.health.state.mn.us/home";
const LOGIN_EXECUTION: &str = "084dee30-925f-4a8f-829d-7a372e38d0de";
const IDENTITY_COOKIE: &str = "KEYCLOAK_IDENTITY";

/// An authenticated registry session
///
/// The generation number increases with every successful login of a run, so
/// concurrent workers can tell whether the session they saw fail has already
/// been replaced.
#[derive(Debug, Clone)]
pub struct Session {
    token: SecretString,
    expires_at: DateTime<Utc>,
    generation: u64,
}

impl Session {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: secret_string(token.into()),
            expires_at,
            generation: 0,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret().as_ref()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether the token is still usable at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.token())
    }
}

/// Establishes and releases registry sessions
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Logs in and returns a fresh session
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AuthenticationFailed`] when the registry
    /// rejects the credentials or the login flow cannot be completed.
    async fn login(&self, credentials: &Credentials) -> std::result::Result<Session, RegistryError>;

    /// Ends a session; failures are logged, never returned
    async fn logout(&self, session: &Session);
}

/// Keycloak implementation of [`Authenticator`] for the AISR realm
pub struct KeycloakAuthenticator {
    client: Client,
    realm_url: String,
    config: ApiConfig,
}

impl KeycloakAuthenticator {
    /// Creates an authenticator for `api.auth_base_url`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = build_client(&config, true)?;
        let realm_url = format!("{}{}", config.auth_base_url.trim_end_matches('/'), REALM_PATH);
        Ok(Self {
            client,
            realm_url,
            config,
        })
    }

    fn auth_url(&self) -> std::result::Result<Url, RegistryError> {
        let mut url = Url::parse(&format!("{}/protocol/openid-connect/auth", self.realm_url))
            .map_err(|e| RegistryError::AuthenticationFailed(format!("invalid auth URL: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", CLIENT_ID)
            .append_pair("redirect_uri", REDIRECT_URI)
            .append_pair("state", &uuid::Uuid::new_v4().to_string())
            .append_pair("response_mode", "fragment")
            .append_pair("response_type", "code")
            .append_pair("scope", "openid")
            .append_pair("nonce", &uuid::Uuid::new_v4().to_string());
        Ok(url)
    }

    /// Step 1: fetch the login form and read `session_code` / `tab_id`
    async fn login_form(&self) -> std::result::Result<(String, String), RegistryError> {
        let url = self.auth_url()?;

        let page = retry_request(&self.config.retry, "keycloak_login_form", || async {
            let resp = self
                .client
                .get(url.clone())
                .send()
                .await
                .map_err(|e| transport_error(e, None))?;

            let status = resp.status();
            let body = resp.text().await.map_err(|e| transport_error(e, None))?;
            if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                return Err(RegistryError::network(format!("login page returned HTTP {status}")));
            }
            if !status.is_success() {
                return Err(RegistryError::AuthenticationFailed(format!(
                    "login page returned HTTP {status}"
                )));
            }
            Ok(body)
        })
        .await?;

        parse_login_form(&page, &url)
    }

    /// Step 2: submit the credentials and read the authorization code
    async fn submit_credentials(
        &self,
        credentials: &Credentials,
        session_code: &str,
        tab_id: &str,
    ) -> std::result::Result<String, RegistryError> {
        let url = format!("{}/login-actions/authenticate", self.realm_url);

        let resp = self
            .client
            .post(&url)
            .query(&[
                ("session_code", session_code),
                ("execution", LOGIN_EXECUTION),
                ("client_id", CLIENT_ID),
                ("tab_id", tab_id),
            ])
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password()),
            ])
            .send()
            .await
            .map_err(|e| transport_error(e, None))?;

        let status = resp.status();
        let has_identity = resp.cookies().any(|c| c.name() == IDENTITY_COOKIE);
        if status != StatusCode::FOUND || !has_identity {
            tracing::error!(
                status = %status,
                identity_cookie = has_identity,
                "Login failed or KEYCLOAK_IDENTITY cookie is missing"
            );
            return Err(RegistryError::AuthenticationFailed(
                "login rejected: check the username and AISR_PASSWORD".to_string(),
            ));
        }

        let location = resp
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                RegistryError::AuthenticationFailed(
                    "authorization code not found in response Location header".to_string(),
                )
            })?;

        code_from_location(location)
    }

    /// Step 3: exchange the code for an access token
    async fn exchange_code(&self, code: &str) -> std::result::Result<Session, RegistryError> {
        let url = format!("{}/protocol/openid-connect/token", self.realm_url);

        let resp = self
            .client
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", REDIRECT_URI),
                ("client_id", CLIENT_ID),
            ])
            .send()
            .await
            .map_err(|e| transport_error(e, None))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RegistryError::AuthenticationFailed(format!(
                "token exchange failed with HTTP {status}: {}",
                body.trim()
            )));
        }

        let token: TokenResponse = resp.json().await.map_err(|e| {
            RegistryError::AuthenticationFailed(format!("invalid token response: {e}"))
        })?;

        let ttl = token.expires_in.unwrap_or(self.config.session_ttl_seconds);
        let expires_at = Utc::now() + ChronoDuration::seconds(ttl as i64);
        Ok(Session::new(token.access_token, expires_at))
    }
}

#[async_trait]
impl Authenticator for KeycloakAuthenticator {
    async fn login(&self, credentials: &Credentials) -> std::result::Result<Session, RegistryError> {
        tracing::info!(
            realm_url = %self.realm_url,
            username = %credentials.username,
            "Authenticating with AISR"
        );

        let (session_code, tab_id) = self.login_form().await?;
        let code = self
            .submit_credentials(credentials, &session_code, &tab_id)
            .await?;
        let session = self.exchange_code(&code).await?;

        tracing::info!(expires_at = %session.expires_at(), "AISR login successful");
        Ok(session)
    }

    async fn logout(&self, session: &Session) {
        let url = format!("{}/protocol/openid-connect/logout", self.realm_url);
        let result = self
            .client
            .get(&url)
            .query(&[("client_id", CLIENT_ID)])
            .header(reqwest::header::AUTHORIZATION, session.bearer())
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() || resp.status().is_redirection() => {
                tracing::info!("Logged out of AISR");
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "AISR logout returned an error status");
            }
            Err(e) => {
                tracing::warn!(error = %e, "AISR logout failed");
            }
        }
    }
}

/// Reads `session_code` and `tab_id` from the `kc-form-login` form action
fn parse_login_form(html: &str, page_url: &Url) -> std::result::Result<(String, String), RegistryError> {
    let form_re = Regex::new(r#"(?is)<form\b[^>]*\bid\s*=\s*["']kc-form-login["'][^>]*>"#)
        .map_err(|e| RegistryError::AuthenticationFailed(e.to_string()))?;
    let action_re = Regex::new(r#"(?is)\baction\s*=\s*["']([^"']*)["']"#)
        .map_err(|e| RegistryError::AuthenticationFailed(e.to_string()))?;

    let form = form_re.find(html).ok_or_else(|| {
        RegistryError::AuthenticationFailed("login form kc-form-login not found".to_string())
    })?;
    let action = action_re
        .captures(form.as_str())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .ok_or_else(|| {
            RegistryError::AuthenticationFailed("login form has no action URL".to_string())
        })?;

    let action_url = Url::parse(&action)
        .or_else(|_| page_url.join(&action))
        .map_err(|e| RegistryError::AuthenticationFailed(format!("invalid form action: {e}")))?;

    let mut session_code = None;
    let mut tab_id = None;
    for (key, value) in action_url.query_pairs() {
        match key.as_ref() {
            "session_code" => session_code = Some(value.into_owned()),
            "tab_id" => tab_id = Some(value.into_owned()),
            _ => {}
        }
    }

    match (session_code, tab_id) {
        (Some(session_code), Some(tab_id)) => Ok((session_code, tab_id)),
        _ => Err(RegistryError::AuthenticationFailed(
            "login form action lacks session_code or tab_id".to_string(),
        )),
    }
}

/// Reads the authorization code from the redirect `Location` fragment
fn code_from_location(location: &str) -> std::result::Result<String, RegistryError> {
    let fragment = location.split_once('#').map(|(_, f)| f).unwrap_or_default();
    url::form_urlencoded::parse(fragment.as_bytes())
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .filter(|code| !code.is_empty())
        .ok_or_else(|| {
            RegistryError::AuthenticationFailed("code not found in response fragment".to_string())
        })
}
