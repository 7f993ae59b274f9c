//! AISR registry client
//!
//! [`RegistryClient`] is the seam between the pipeline stages and the
//! registry. [`AisrClient`] talks to the real AISR API over HTTPS;
//! [`InMemoryRegistry`](super::memory::InMemoryRegistry) stands in for it in
//! tests and dry runs.

use super::auth::Session;
use super::http::{build_client, retry_request, signed_url_error, status_error, transport_error};
use super::models::{
    QueryResult, SchoolQueryEntry, SignedUrlRequest, SignedUrlResponse, UploadConfirmation,
};
use crate::config::ApiConfig;
use crate::domain::{EntityConfig, RegistryError, Result, UploadStep};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::path::Path;

/// Registry operations used by the extract stage
///
/// Every call requires a currently valid [`Session`]. A rejected token is
/// reported as [`RegistryError::AuthExpired`] and never retried here; the
/// orchestrator decides whether to log in again.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Submits an entity's bulk query file
    ///
    /// Uploading is two steps: request a signed URL, then `PUT` the file to
    /// it. Errors carry the [`UploadStep`] that failed.
    async fn submit_bulk_query(
        &self,
        session: &Session,
        entity: &EntityConfig,
        query_file: &Path,
    ) -> std::result::Result<UploadConfirmation, RegistryError>;

    /// Lists the results available for an entity, oldest first
    ///
    /// An entity with no results yields an empty list, not an error.
    async fn fetch_result_list(
        &self,
        session: &Session,
        entity: &EntityConfig,
    ) -> std::result::Result<Vec<QueryResult>, RegistryError>;

    /// Downloads the raw pipe-delimited content of one result
    async fn download_result(
        &self,
        session: &Session,
        entity: &EntityConfig,
        result: &QueryResult,
    ) -> std::result::Result<Vec<u8>, RegistryError>;
}

/// HTTP client for the AISR API
pub struct AisrClient {
    client: Client,
    api_base_url: String,
    config: ApiConfig,
}

impl AisrClient {
    /// Creates a client for `api.aisr_api_base_url`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: ApiConfig) -> Result<Self> {
        let client = build_client(&config, false)?;
        let api_base_url = config.aisr_api_base_url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            api_base_url,
            config,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.api_base_url
    }

    async fn request_signed_url(
        &self,
        session: &Session,
        entity: &EntityConfig,
        query_file: &Path,
    ) -> std::result::Result<String, RegistryError> {
        let step = Some(UploadStep::SignedUrl);
        let url = format!("{}/signing/puturl", self.api_base_url);
        let body = SignedUrlRequest {
            file_path: query_file.display().to_string(),
            content_type: "text/csv".to_string(),
            school_id: entity.id.to_string(),
        };

        retry_request(&self.config.retry, "signed_url", || async {
            let resp = self
                .client
                .post(&url)
                .header(reqwest::header::AUTHORIZATION, session.bearer())
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_error(e, step))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(status_error(status, &text, step));
            }

            let signed: SignedUrlResponse = resp.json().await.map_err(|e| {
                RegistryError::UploadRejected {
                    step: UploadStep::SignedUrl,
                    message: format!("invalid signed URL response: {e}"),
                }
            })?;

            signed
                .url
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| RegistryError::UploadRejected {
                    step: UploadStep::SignedUrl,
                    message: "signed URL response has no url".to_string(),
                })
        })
        .await
    }

    async fn transfer_file(
        &self,
        signed_url: &str,
        entity: &EntityConfig,
        payload: &[u8],
    ) -> std::result::Result<(), RegistryError> {
        let step = Some(UploadStep::Transfer);

        retry_request(&self.config.retry, "transfer", || async {
            let mut request = self
                .client
                .put(signed_url)
                .header("x-amz-meta-classification", &entity.classification)
                .header("x-amz-meta-school_id", entity.id.as_str())
                .header("x-amz-meta-email_contact", &entity.email)
                .header(reqwest::header::CONTENT_TYPE, "text/csv")
                .header("x-amz-meta-iddis", &self.config.iddis)
                .body(payload.to_vec());

            if let Some(host) = &self.config.upload_host {
                request = request.header(reqwest::header::HOST, host);
            }

            let resp = request.send().await.map_err(|e| transport_error(e, step))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(status_error(status, &text, step));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl RegistryClient for AisrClient {
    async fn submit_bulk_query(
        &self,
        session: &Session,
        entity: &EntityConfig,
        query_file: &Path,
    ) -> std::result::Result<UploadConfirmation, RegistryError> {
        let payload = tokio::fs::read(query_file).await.map_err(|e| {
            RegistryError::Io(format!(
                "cannot read bulk query file {}: {e}",
                query_file.display()
            ))
        })?;

        tracing::debug!(
            entity_id = %entity.id,
            query_file = %query_file.display(),
            bytes = payload.len(),
            "Requesting signed upload URL"
        );
        let signed_url = self.request_signed_url(session, entity, query_file).await?;

        tracing::debug!(entity_id = %entity.id, "Transferring bulk query file");
        self.transfer_file(&signed_url, entity, &payload).await?;

        Ok(UploadConfirmation {
            entity_id: entity.id.to_string(),
            bytes_sent: payload.len(),
        })
    }

    async fn fetch_result_list(
        &self,
        session: &Session,
        entity: &EntityConfig,
    ) -> std::result::Result<Vec<QueryResult>, RegistryError> {
        let url = format!("{}/school/query/{}", self.api_base_url, entity.id);

        let entries = retry_request(&self.config.retry, "fetch_result_list", || async {
            let resp = self
                .client
                .get(&url)
                .header(reqwest::header::AUTHORIZATION, session.bearer())
                .send()
                .await
                .map_err(|e| transport_error(e, None))?;

            let status = resp.status();
            if status == StatusCode::NOT_FOUND {
                return Ok(Vec::new());
            }
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(status_error(status, &text, None));
            }

            let text = resp.text().await.map_err(|e| transport_error(e, None))?;
            if text.trim().is_empty() {
                return Ok(Vec::new());
            }
            serde_json::from_str::<Vec<SchoolQueryEntry>>(&text).map_err(|e| {
                RegistryError::MalformedResponse(format!("invalid school query response: {e}"))
            })
        })
        .await?;

        let total = entries.len();
        let mut results: Vec<QueryResult> = entries
            .into_iter()
            .filter_map(SchoolQueryEntry::into_result)
            .collect();
        results.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at));

        if results.len() < total {
            tracing::info!(
                entity_id = %entity.id,
                pending = total - results.len(),
                "Some results have no vaccine file yet"
            );
        }

        Ok(results)
    }

    async fn download_result(
        &self,
        _session: &Session,
        entity: &EntityConfig,
        result: &QueryResult,
    ) -> std::result::Result<Vec<u8>, RegistryError> {
        // The vaccine file URL is pre-signed; a bearer header would be rejected by S3
        let bytes = retry_request(&self.config.retry, "download_result", || async {
            let resp = self
                .client
                .get(&result.download_url)
                .send()
                .await
                .map_err(|e| transport_error(e, None))?;

            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                return Err(signed_url_error(status, &text));
            }

            resp.bytes().await.map_err(|e| transport_error(e, None))
        })
        .await?;

        if std::str::from_utf8(&bytes).is_err() {
            return Err(RegistryError::MalformedResponse(format!(
                "result {} for entity {} is not valid UTF-8",
                result.id, entity.id
            )));
        }

        tracing::debug!(
            entity_id = %entity.id,
            result_id = %result.id,
            bytes = bytes.len(),
            "Downloaded result"
        );
        Ok(bytes.to_vec())
    }
}
