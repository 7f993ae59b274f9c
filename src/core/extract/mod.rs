//! Extract stage
//!
//! Wraps a [`RegistryClient`] with the per-entity extract logic of the two
//! phases: submitting the bulk query file, and collecting every available
//! result as raw bytes. There is no waiting or polling here; the registry
//! processes uploaded queries on its own schedule and the download phase is
//! run separately.

use crate::adapters::aisr::{RegistryClient, Session, UploadConfirmation};
use crate::domain::{EntityConfig, RawExtract, RegistryError};
use async_trait::async_trait;
use std::sync::Arc;

/// Per-entity registry work of the upload and download phases
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Submits the entity's bulk query file
    async fn upload(
        &self,
        session: &Session,
        entity: &EntityConfig,
    ) -> Result<UploadConfirmation, RegistryError>;

    /// Downloads the entity's results, oldest first
    ///
    /// An entity without results yields an empty list.
    async fn download(
        &self,
        session: &Session,
        entity: &EntityConfig,
    ) -> Result<Vec<RawExtract>, RegistryError>;
}

/// [`Extractor`] backed by a registry client
pub struct RegistryExtractor {
    client: Arc<dyn RegistryClient>,
    latest_result_only: bool,
}

impl RegistryExtractor {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self {
            client,
            latest_result_only: false,
        }
    }

    /// Only download the newest result of each entity
    pub fn latest_result_only(mut self, latest: bool) -> Self {
        self.latest_result_only = latest;
        self
    }
}

#[async_trait]
impl Extractor for RegistryExtractor {
    async fn upload(
        &self,
        session: &Session,
        entity: &EntityConfig,
    ) -> Result<UploadConfirmation, RegistryError> {
        let confirmation = self
            .client
            .submit_bulk_query(session, entity, &entity.bulk_query_file)
            .await?;

        tracing::info!(
            entity_id = %entity.id,
            entity_name = %entity.name,
            bytes = confirmation.bytes_sent,
            "Bulk query uploaded"
        );
        Ok(confirmation)
    }

    async fn download(
        &self,
        session: &Session,
        entity: &EntityConfig,
    ) -> Result<Vec<RawExtract>, RegistryError> {
        let mut results = self.client.fetch_result_list(session, entity).await?;

        if results.is_empty() {
            tracing::info!(entity_id = %entity.id, "No results available");
            return Ok(Vec::new());
        }

        if self.latest_result_only && results.len() > 1 {
            let skipped = results.len() - 1;
            results.drain(..skipped);
            tracing::debug!(entity_id = %entity.id, skipped, "Keeping only the newest result");
        }

        let mut extracts = Vec::with_capacity(results.len());
        for result in &results {
            let content = self.client.download_result(session, entity, result).await?;
            extracts.push(RawExtract::new(result.id.clone(), content));
        }

        tracing::info!(
            entity_id = %entity.id,
            results = extracts.len(),
            bytes = extracts.iter().map(|e| e.content.len()).sum::<usize>(),
            "Downloaded results"
        );
        Ok(extracts)
    }
}
