//! Phase orchestration
//!
//! Upload: `Idle -> Authenticating -> Uploading -> Done|Partial|Failed`.
//! Download: `Idle -> Authenticating -> Downloading -> Transforming ->
//! Loading -> Done|Partial|Failed`. The local transform cycle skips the
//! registry and starts at `Transforming`.
//!
//! Entities run on a bounded pool and fail independently; only a session
//! that can no longer be refreshed stops the remaining entities. Every phase
//! ends with a manifest, whatever happened.

use super::session::SharedSession;
use crate::adapters::aisr::{Authenticator, Session};
use crate::config::AppConfig;
use crate::core::extract::Extractor;
use crate::core::incremental::IncrementalProcessor;
use crate::core::load::{archive_raw, Loader};
use crate::core::manifest::{
    EntityOutcome, ManifestStore, Phase, RecordedError, RunManifest, RunStatus,
};
use crate::core::run::RunContext;
use crate::core::transform::{merge_records, Transformer};
use crate::domain::{
    Credentials, EntityConfig, ErrorKind, NormalizedRecord, RawExtract, RegistryError, Result,
    ResultId,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Phase state, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseState {
    Idle,
    Authenticating,
    Uploading,
    Downloading,
    Transforming,
    Loading,
    Done,
    Partial,
    Failed,
}

/// Why an entity did not succeed
#[derive(Debug)]
struct EntityFailure {
    error: RecordedError,
    /// The session is gone; no further entity can run
    fatal: bool,
}

impl EntityFailure {
    fn isolated(error: RecordedError) -> Self {
        Self {
            error,
            fatal: false,
        }
    }
}

enum Attempt<T> {
    Succeeded(T),
    Finished(EntityOutcome),
}

/// Per-entity results of one pooled stage, in configuration order
struct StageResults<'a, T> {
    attempts: Vec<(&'a EntityConfig, Attempt<T>)>,
    fatal: Option<RecordedError>,
    cancelled: bool,
}

/// Runs the upload, download and local transform cycles
pub struct WorkflowOrchestrator {
    pub(super) config: AppConfig,
    pub(super) credentials: Option<Credentials>,
    pub(super) authenticator: Arc<dyn Authenticator>,
    pub(super) extractor: Arc<dyn Extractor>,
    pub(super) transformer: Arc<dyn Transformer>,
    pub(super) loader: Arc<dyn Loader>,
    pub(super) manifests: ManifestStore,
    pub(super) shutdown: watch::Receiver<bool>,
}

impl WorkflowOrchestrator {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn manifest_store(&self) -> &ManifestStore {
        &self.manifests
    }

    /// Submits every school's bulk query file
    ///
    /// # Errors
    ///
    /// Only a manifest that cannot be written is an error; everything else
    /// is reported in the returned manifest.
    pub async fn run_upload(&self) -> Result<RunManifest> {
        let run = RunContext::new();
        let mut manifest = RunManifest::new(&run, Phase::Upload);
        self.enter(&run, Phase::Upload, PhaseState::Idle);

        let Some(session) = self.authenticate(&run, &mut manifest).await else {
            return self.finish(&run, manifest);
        };

        self.enter(&run, Phase::Upload, PhaseState::Uploading);
        let stage = self
            .run_pooled(|entity| {
                let session = &session;
                async move {
                    self.with_session(session, entity, |current| async move {
                        self.extractor.upload(&current, entity).await
                    })
                    .await
                }
            })
            .await;
        session.logout().await;

        let stage_fatal = stage.fatal.clone();
        manifest.interrupted = stage.cancelled;
        for (entity, attempt) in stage.attempts {
            manifest.record(match attempt {
                Attempt::Succeeded(_) => EntityOutcome::uploaded(entity),
                Attempt::Finished(outcome) => outcome,
            });
        }
        if let Some(error) = stage_fatal {
            manifest.fail(error);
        }
        self.finish(&run, manifest)
    }

    /// Downloads, transforms and writes every school's results
    ///
    /// # Errors
    ///
    /// Only a manifest that cannot be written is an error.
    pub async fn run_download(&self) -> Result<RunManifest> {
        let run = RunContext::new();
        let mut manifest = RunManifest::new(&run, Phase::Download);
        self.enter(&run, Phase::Download, PhaseState::Idle);

        let Some(session) = self.authenticate(&run, &mut manifest).await else {
            return self.finish(&run, manifest);
        };

        self.enter(&run, Phase::Download, PhaseState::Downloading);
        let stage = self
            .run_pooled(|entity| {
                let session = &session;
                async move {
                    self.with_session(session, entity, |current| async move {
                        self.extractor.download(&current, entity).await
                    })
                    .await
                }
            })
            .await;
        session.logout().await;

        if let Some(folder) = &self.config.paths.raw_folder {
            for (entity, attempt) in &stage.attempts {
                if let Attempt::Succeeded(extracts) = attempt {
                    for extract in extracts {
                        match archive_raw(folder, entity, &run, extract) {
                            Ok(path) => manifest.raw_archives.push(path),
                            Err(e) => tracing::warn!(
                                entity_id = %entity.id,
                                error = %e,
                                "Failed to archive raw extract"
                            ),
                        }
                    }
                }
            }
        }

        let records = self.transform_and_load(&run, Phase::Download, stage, &mut manifest);

        if self.config.incremental.enabled && manifest.fatal_error.is_none() {
            let processor =
                IncrementalProcessor::new(&self.config.incremental, &self.config.paths.output_folder);
            match processor.process(&merge_records(records), &run) {
                Ok(outcome) => manifest.changes_file = Some(outcome.changes_file),
                Err(e) => {
                    tracing::error!(error = %e, "Incremental processing failed");
                    manifest.fail(RecordedError::from(&e));
                }
            }
        }

        self.finish(&run, manifest)
    }

    /// Re-processes raw extract files from `input` without the registry
    ///
    /// Files are matched to schools by the `{school_id}_` name prefix and
    /// must end in `.txt` or `.csv`. Schools without files are skipped.
    ///
    /// # Errors
    ///
    /// Only a manifest that cannot be written is an error.
    pub async fn run_transform(&self, input: &Path) -> Result<RunManifest> {
        let run = RunContext::new();
        let mut manifest = RunManifest::new(&run, Phase::Transform);
        self.enter(&run, Phase::Transform, PhaseState::Idle);

        let files = match list_raw_files(input) {
            Ok(files) => files,
            Err(e) => {
                manifest.fail(RecordedError::new(
                    ErrorKind::IoError,
                    format!("cannot read input folder {}: {e}", input.display()),
                ));
                return self.finish(&run, manifest);
            }
        };

        let mut attempts = Vec::new();
        let mut cancelled = false;
        for entity in &self.config.schools {
            let prefix = format!("{}_", entity.id);
            let matching: Vec<&PathBuf> = files
                .iter()
                .filter(|p| file_name(p).starts_with(&prefix))
                .collect();
            if matching.is_empty() {
                tracing::info!(entity_id = %entity.id, "No raw files for school, skipping");
                continue;
            }
            if self.shutdown_requested() {
                cancelled = true;
                attempts.push((
                    entity,
                    Attempt::Finished(EntityOutcome::not_attempted(
                        entity,
                        Some(RecordedError::cancelled()),
                    )),
                ));
                continue;
            }

            let mut extracts = Vec::with_capacity(matching.len());
            let mut failure = None;
            for path in matching {
                match std::fs::read(path) {
                    Ok(content) => extracts.push(RawExtract::new(ResultId::new(file_stem(path)), content)),
                    Err(e) => {
                        failure = Some(RecordedError::new(
                            ErrorKind::IoError,
                            format!("cannot read {}: {e}", path.display()),
                        ));
                        break;
                    }
                }
            }
            attempts.push(match failure {
                Some(error) => (entity, Attempt::Finished(EntityOutcome::failed(entity, error))),
                None => (entity, Attempt::Succeeded(extracts)),
            });
        }

        if attempts.is_empty() {
            manifest.fail(RecordedError::new(
                ErrorKind::NotFound,
                format!("no raw files for any configured school in {}", input.display()),
            ));
            return self.finish(&run, manifest);
        }

        let stage = StageResults {
            attempts,
            fatal: None,
            cancelled,
        };
        self.transform_and_load(&run, Phase::Transform, stage, &mut manifest);
        self.finish(&run, manifest)
    }

    fn enter(&self, run: &RunContext, phase: Phase, state: PhaseState) {
        tracing::info!(run_id = %run.run_id, phase = %phase, state = ?state, "Phase state");
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Logs in, or records why the phase cannot start
    async fn authenticate(&self, run: &RunContext, manifest: &mut RunManifest) -> Option<SharedSession> {
        if self.shutdown_requested() {
            manifest.interrupted = true;
            manifest.fail(RecordedError::cancelled());
            self.record_all_not_attempted(manifest);
            return None;
        }

        self.enter(run, manifest.phase, PhaseState::Authenticating);
        let Some(credentials) = self.credentials.clone() else {
            manifest.fail(RecordedError::new(
                ErrorKind::AuthenticationError,
                "no registry credentials supplied",
            ));
            self.record_all_not_attempted(manifest);
            return None;
        };

        match SharedSession::login(
            self.authenticator.clone(),
            credentials,
            self.config.api.max_reauth_attempts,
        )
        .await
        {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::error!(run_id = %run.run_id, error = %e, "Registry login failed");
                manifest.fail(RecordedError::from(&e));
                self.record_all_not_attempted(manifest);
                None
            }
        }
    }

    fn record_all_not_attempted(&self, manifest: &mut RunManifest) {
        for entity in &self.config.schools {
            manifest.record(EntityOutcome::not_attempted(entity, None));
        }
    }

    /// Runs `work` for every school on the bounded pool
    ///
    /// Schools not yet started when the session is lost or shutdown is
    /// requested are recorded as not attempted.
    async fn run_pooled<'a, T, F, Fut>(&'a self, work: F) -> StageResults<'a, T>
    where
        F: Fn(&'a EntityConfig) -> Fut,
        Fut: Future<Output = std::result::Result<T, EntityFailure>>,
    {
        let abort = AtomicBool::new(false);
        let cancelled = AtomicBool::new(false);
        let delay = Duration::from_millis(self.config.api.delay_between_requests_ms);
        let concurrency = self.config.api.concurrency.max(1);

        let mut slots: Vec<(usize, Attempt<T>, Option<RecordedError>)> =
            stream::iter(self.config.schools.iter().enumerate())
                .map(|(index, entity)| {
                    let (abort, cancelled, work) = (&abort, &cancelled, &work);
                    async move {
                        if index > 0 && !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        if abort.load(Ordering::SeqCst) {
                            let outcome = EntityOutcome::not_attempted(entity, None);
                            return (index, Attempt::Finished(outcome), None);
                        }
                        if self.shutdown_requested() {
                            cancelled.store(true, Ordering::SeqCst);
                            let outcome =
                                EntityOutcome::not_attempted(entity, Some(RecordedError::cancelled()));
                            return (index, Attempt::Finished(outcome), None);
                        }

                        match work(entity).await {
                            Ok(value) => (index, Attempt::Succeeded(value), None),
                            Err(failure) => {
                                tracing::error!(
                                    entity_id = %entity.id,
                                    kind = %failure.error.kind,
                                    error = %failure.error.message,
                                    "School failed"
                                );
                                let fatal = failure.fatal.then(|| failure.error.clone());
                                if fatal.is_some() {
                                    abort.store(true, Ordering::SeqCst);
                                }
                                let outcome = EntityOutcome::failed(entity, failure.error);
                                (index, Attempt::Finished(outcome), fatal)
                            }
                        }
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;

        slots.sort_by_key(|(index, _, _)| *index);

        let mut fatal = None;
        let mut attempts = Vec::with_capacity(slots.len());
        for (index, attempt, slot_fatal) in slots {
            if fatal.is_none() {
                fatal = slot_fatal;
            }
            attempts.push((&self.config.schools[index], attempt));
        }

        StageResults {
            attempts,
            fatal,
            cancelled: cancelled.load(Ordering::SeqCst),
        }
    }

    /// Runs a registry operation, refreshing the session once it is rejected
    async fn with_session<T, F, Fut>(
        &self,
        session: &SharedSession,
        entity: &EntityConfig,
        op: F,
    ) -> std::result::Result<T, EntityFailure>
    where
        F: Fn(Session) -> Fut,
        Fut: Future<Output = std::result::Result<T, RegistryError>>,
    {
        let mut current = session.current().await.map_err(session_lost)?;
        loop {
            match op(current.clone()).await {
                Err(e) if e.is_auth_expired() => {
                    tracing::warn!(
                        entity_id = %entity.id,
                        generation = current.generation(),
                        error = %e,
                        "Registry rejected the session"
                    );
                    current = session.refresh(current.generation()).await.map_err(session_lost)?;
                }
                Err(e) => return Err(EntityFailure::isolated(RecordedError::from(&e))),
                Ok(value) => return Ok(value),
            }
        }
    }

    /// Transforming and Loading states shared by download and local transform
    ///
    /// Returns the records of schools that were written successfully.
    fn transform_and_load(
        &self,
        run: &RunContext,
        phase: Phase,
        stage: StageResults<'_, Vec<RawExtract>>,
        manifest: &mut RunManifest,
    ) -> Vec<Vec<NormalizedRecord>> {
        manifest.interrupted |= stage.cancelled;

        self.enter(run, phase, PhaseState::Transforming);
        let transformed: Vec<_> = stage
            .attempts
            .into_iter()
            .map(|(entity, attempt)| match attempt {
                Attempt::Succeeded(extracts) => {
                    let batches: std::result::Result<Vec<_>, _> =
                        extracts.iter().map(|e| self.transformer.transform(e)).collect();
                    match batches {
                        Ok(batches) => (entity, Attempt::Succeeded(merge_records(batches))),
                        Err(e) => {
                            tracing::error!(entity_id = %entity.id, error = %e, "Transform failed");
                            let error = RecordedError::new(e.kind(), e.to_string());
                            (entity, Attempt::Finished(EntityOutcome::failed(entity, error)))
                        }
                    }
                }
                Attempt::Finished(outcome) => (entity, Attempt::Finished(outcome)),
            })
            .collect();

        self.enter(run, phase, PhaseState::Loading);
        let mut written = Vec::new();
        for (entity, attempt) in transformed {
            let outcome = match attempt {
                Attempt::Succeeded(records) => match self.loader.load(entity, &records, run) {
                    Ok(file) => {
                        written.push(records);
                        EntityOutcome::loaded(entity, &file)
                    }
                    Err(e) => {
                        tracing::error!(entity_id = %entity.id, error = %e, "Failed to write output");
                        EntityOutcome::failed(entity, RecordedError::from(&e))
                    }
                },
                Attempt::Finished(outcome) => outcome,
            };
            manifest.record(outcome);
        }

        if let Some(error) = stage.fatal {
            manifest.fail(error);
        }
        written
    }

    fn finish(&self, run: &RunContext, mut manifest: RunManifest) -> Result<RunManifest> {
        manifest.finish(Utc::now());
        let state = match manifest.status {
            RunStatus::Done => PhaseState::Done,
            RunStatus::Partial => PhaseState::Partial,
            RunStatus::Failed => PhaseState::Failed,
        };
        self.enter(run, manifest.phase, state);
        manifest.log_summary();
        self.manifests.save(&manifest)?;
        Ok(manifest)
    }
}

fn session_lost(error: RegistryError) -> EntityFailure {
    let error = match error {
        RegistryError::AuthenticationFailed(_) => error,
        other => RegistryError::AuthenticationFailed(other.to_string()),
    };
    EntityFailure {
        error: RecordedError::from(&error),
        fatal: true,
    }
}

fn list_raw_files(folder: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(folder)? {
        let path = entry?.path();
        let is_raw = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("txt") | Some("csv")
        );
        if path.is_file() && is_raw {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
