//! HTTP plumbing shared by the AISR authenticator and registry client
//!
//! Builds reqwest clients, maps HTTP failures onto [`RegistryError`], and
//! retries transient failures with exponential backoff.

use crate::config::{ApiConfig, RetryConfig};
use crate::domain::{ImmunizationError, RegistryError, Result, UploadStep};
use rand::Rng;
use reqwest::{redirect, Client, ClientBuilder, StatusCode};
use std::future::Future;
use std::time::Duration;

/// Response bodies longer than this are truncated in error messages
const MAX_ERROR_BODY: usize = 512;

/// Builds an HTTP client from the API configuration
///
/// The login flow needs a cookie store and must see redirects itself, so it
/// asks for `keycloak = true`.
pub(crate) fn build_client(config: &ApiConfig, keycloak: bool) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .connect_timeout(Duration::from_secs(30));

    if keycloak {
        builder = builder
            .cookie_store(true)
            .redirect(redirect::Policy::none());
    }

    if !config.tls_verify {
        tracing::warn!(
            auth_base_url = %config.auth_base_url,
            aisr_api_base_url = %config.aisr_api_base_url,
            "TLS certificate verification is DISABLED; only use this against a local mock registry"
        );
        builder = builder.danger_accept_invalid_certs(true);
    }

    builder
        .build()
        .map_err(|e| ImmunizationError::Configuration(format!("Failed to build HTTP client: {e}")))
}

/// Maps a transport-level reqwest error
pub(crate) fn transport_error(error: reqwest::Error, step: Option<UploadStep>) -> RegistryError {
    let message = if error.is_timeout() {
        format!("request timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    };
    RegistryError::Network { step, message }
}

/// Maps a non-success HTTP status
///
/// 401/403 ask for a new session, 429 and 5xx are transient, anything else is
/// a permanent rejection of the request.
pub(crate) fn status_error(status: StatusCode, body: &str, step: Option<UploadStep>) -> RegistryError {
    let message = format!("HTTP {status}: {}", truncate(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RegistryError::AuthExpired(message),
        StatusCode::TOO_MANY_REQUESTS => RegistryError::Network { step, message },
        s if s.is_server_error() => RegistryError::Network { step, message },
        StatusCode::NOT_FOUND if step.is_none() => RegistryError::NotFound(message),
        _ => match step {
            Some(step) => RegistryError::UploadRejected { step, message },
            None => RegistryError::MalformedResponse(message),
        },
    }
}

/// Maps a non-success HTTP status from a pre-signed file URL
///
/// The request carries no registry token, so 401/403 mean the object itself
/// is unreadable and never that the session expired.
pub(crate) fn signed_url_error(status: StatusCode, body: &str) -> RegistryError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RegistryError::MalformedResponse(
            format!("vaccine file URL denied access: HTTP {status}: {}", truncate(body)),
        ),
        _ => status_error(status, body, None),
    }
}

fn truncate(body: &str) -> &str {
    let body = body.trim();
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Delay before retry number `attempt` (1-based), with up to 10% jitter
pub(crate) fn backoff_delay(retry: &RetryConfig, attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1).min(32) as i32;
    let base = retry.initial_delay_ms as f64 * retry.backoff_multiplier.powi(exponent);
    let capped = base.min(retry.max_delay_ms as f64) as u64;
    let jitter = if capped >= 10 {
        rand::thread_rng().gen_range(0..=capped / 10)
    } else {
        0
    };
    Duration::from_millis(capped.saturating_add(jitter).min(retry.max_delay_ms))
}

/// Retries an operation with exponential backoff
///
/// Only transient errors ([`RegistryError::is_transient`]) are retried;
/// `retry.max_retries` bounds the total number of attempts.
pub(crate) async fn retry_request<F, T, Fut>(
    retry: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> std::result::Result<T, RegistryError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, RegistryError>>,
{
    let max_retries = retry.max_retries.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() => {
                attempt += 1;
                if attempt >= max_retries {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt,
                        error = %e,
                        "Giving up after repeated transient failures"
                    );
                    return Err(e);
                }

                let delay = backoff_delay(retry, attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt,
                    max_retries = max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Retrying request after error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    fn fast_retry() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 2.0,
        }
    }

    #[test_case(401, "auth_expired")]
    #[test_case(403, "auth_expired")]
    #[test_case(429, "network_error")]
    #[test_case(503, "network_error")]
    #[test_case(404, "not_found")]
    #[test_case(400, "malformed_response")]
    fn test_status_error_without_step(status: u16, expected_kind: &str) {
        let status = StatusCode::from_u16(status).unwrap();
        let kind = status_error(status, "", None).kind();
        assert_eq!(serde_json::to_value(kind).unwrap(), expected_kind);
    }

    #[test_case(401)]
    #[test_case(403)]
    fn test_signed_url_denial_is_not_a_session_error(status: u16) {
        let status = StatusCode::from_u16(status).unwrap();
        let err = signed_url_error(status, "<Error><Code>AccessDenied</Code></Error>");
        assert!(!err.is_auth_expired());
        assert!(!err.is_transient());
        assert!(matches!(err, RegistryError::MalformedResponse(_)));
    }

    #[test]
    fn test_signed_url_outage_stays_transient() {
        assert!(signed_url_error(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
        assert!(matches!(
            signed_url_error(StatusCode::NOT_FOUND, ""),
            RegistryError::NotFound(_)
        ));
    }

    #[test]
    fn test_status_error_during_upload_keeps_step() {
        let err = status_error(StatusCode::BAD_REQUEST, "Missing headers", Some(UploadStep::Transfer));
        assert_eq!(err.upload_step(), Some(UploadStep::Transfer));
        assert!(matches!(err, RegistryError::UploadRejected { .. }));

        let err = status_error(StatusCode::BAD_GATEWAY, "", Some(UploadStep::SignedUrl));
        assert!(err.is_transient());
        assert_eq!(err.upload_step(), Some(UploadStep::SignedUrl));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(2000);
        assert_eq!(truncate(&body).len(), MAX_ERROR_BODY);
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 3000,
            backoff_multiplier: 2.0,
        };
        assert!(backoff_delay(&retry, 1) >= Duration::from_millis(1000));
        assert!(backoff_delay(&retry, 1) <= Duration::from_millis(1100));
        assert_eq!(backoff_delay(&retry, 10), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_retry_request_retries_transient_errors() {
        let calls = AtomicUsize::new(0);
        let result = retry_request(&fast_retry(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RegistryError::network("connection reset"))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_request_gives_up() {
        let calls = AtomicUsize::new(0);
        let result: std::result::Result<(), _> = retry_request(&fast_retry(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::network("down"))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_request_does_not_retry_permanent_errors() {
        let calls = AtomicUsize::new(0);
        let result: std::result::Result<(), _> = retry_request(&fast_retry(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(RegistryError::AuthExpired("401".into()))
        })
        .await;

        assert!(result.unwrap_err().is_auth_expired());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
