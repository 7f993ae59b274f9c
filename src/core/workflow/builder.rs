//! Orchestrator assembly

use super::orchestrator::WorkflowOrchestrator;
use crate::adapters::aisr::{AisrClient, Authenticator, InMemoryRegistry, KeycloakAuthenticator};
use crate::config::AppConfig;
use crate::core::extract::{Extractor, RegistryExtractor};
use crate::core::load::{CsvFileLoader, Loader};
use crate::core::manifest::ManifestStore;
use crate::core::transform::{AisrTransformer, Transformer};
use crate::domain::{Credentials, Result};
use std::sync::Arc;
use tokio::sync::watch;

/// Builds a [`WorkflowOrchestrator`]
///
/// Stages left unset default to the real AISR implementations configured
/// from `config`: Keycloak login, HTTP registry client, the pipe-delimited
/// transformer and the CSV file loader.
///
/// ```no_run
/// use immunization_etl::config::AppConfig;
/// use immunization_etl::core::workflow::OrchestratorBuilder;
/// use immunization_etl::domain::Credentials;
///
/// # fn example(config: AppConfig) -> immunization_etl::domain::Result<()> {
/// let orchestrator = OrchestratorBuilder::new(config)
///     .credentials(Credentials::new("etl-user", "secret"))
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct OrchestratorBuilder {
    config: AppConfig,
    credentials: Option<Credentials>,
    authenticator: Option<Arc<dyn Authenticator>>,
    extractor: Option<Arc<dyn Extractor>>,
    transformer: Option<Arc<dyn Transformer>>,
    loader: Option<Arc<dyn Loader>>,
    manifests: Option<ManifestStore>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            credentials: None,
            authenticator: None,
            extractor: None,
            transformer: None,
            loader: None,
            manifests: None,
            shutdown: None,
        }
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn loader(mut self, loader: Arc<dyn Loader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Overrides the manifest folder (default `{logs_folder}/manifests`)
    pub fn manifest_store(mut self, store: ManifestStore) -> Self {
        self.manifests = Some(store);
        self
    }

    pub fn shutdown_signal(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Uses one in-memory registry for both login and registry calls
    pub fn in_memory_registry(self, registry: Arc<InMemoryRegistry>) -> Self {
        let latest = self.config.api.latest_result_only;
        self.authenticator(registry.clone())
            .extractor(Arc::new(RegistryExtractor::new(registry).latest_result_only(latest)))
    }

    /// # Errors
    ///
    /// Returns a configuration error if a default stage cannot be created
    /// from the configuration (for example an invalid transform mapping or
    /// an HTTP client that cannot be built).
    pub fn build(self) -> Result<WorkflowOrchestrator> {
        let api = &self.config.api;

        let authenticator: Arc<dyn Authenticator> = match self.authenticator {
            Some(authenticator) => authenticator,
            None => Arc::new(KeycloakAuthenticator::new(api.clone())?),
        };
        let extractor: Arc<dyn Extractor> = match self.extractor {
            Some(extractor) => extractor,
            None => {
                let client = Arc::new(AisrClient::new(api.clone())?);
                Arc::new(RegistryExtractor::new(client).latest_result_only(api.latest_result_only))
            }
        };
        let transformer: Arc<dyn Transformer> = match self.transformer {
            Some(transformer) => transformer,
            None => Arc::new(AisrTransformer::new(&self.config.transform)?),
        };
        let loader: Arc<dyn Loader> = match self.loader {
            Some(loader) => loader,
            None => Arc::new(CsvFileLoader::new(&self.config.paths.output_folder)),
        };
        let manifests = self
            .manifests
            .unwrap_or_else(|| ManifestStore::new(self.config.paths.manifest_folder()));
        // A receiver whose sender is gone keeps reporting the last value (false)
        let shutdown = self.shutdown.unwrap_or_else(|| watch::channel(false).1);

        Ok(WorkflowOrchestrator {
            config: self.config,
            credentials: self.credentials,
            authenticator,
            extractor,
            transformer,
            loader,
            manifests,
            shutdown,
        })
    }
}
