//! Manifest persistence
//!
//! Manifests live as pretty-printed JSON files under
//! `{logs_folder}/manifests/`, named `{timestamp}_{phase}_{run_id}.json`.

use super::RunManifest;
use crate::core::load::atomic::{write_atomic, OnCollision};
use crate::core::run::FILE_TIMESTAMP_FORMAT;
use crate::domain::{ImmunizationError, Result};
use std::path::{Path, PathBuf};

/// Folder of run manifests
#[derive(Debug, Clone)]
pub struct ManifestStore {
    folder: PathBuf,
}

impl ManifestStore {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Writes a manifest, returning its path
    ///
    /// # Errors
    ///
    /// Returns [`ImmunizationError::Manifest`] if the manifest cannot be
    /// serialized or written.
    pub fn save(&self, manifest: &RunManifest) -> Result<PathBuf> {
        let name = format!(
            "{}_{}_{}.json",
            manifest.started_at.format(FILE_TIMESTAMP_FORMAT),
            manifest.phase,
            manifest.run_id
        );
        let json = serde_json::to_vec_pretty(manifest)
            .map_err(|e| ImmunizationError::Manifest(format!("cannot serialize manifest: {e}")))?;

        let path = write_atomic(&self.folder.join(name), &json, OnCollision::Overwrite)
            .map_err(|e| ImmunizationError::Manifest(e.to_string()))?;

        tracing::info!(run_id = %manifest.run_id, path = %path.display(), "Manifest written");
        Ok(path)
    }

    /// Reads every manifest in the folder, oldest first
    ///
    /// A missing folder means no runs yet. Files that do not parse are
    /// skipped with a warning.
    pub fn load_all(&self) -> Result<Vec<RunManifest>> {
        let entries = match std::fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(ImmunizationError::Manifest(format!(
                    "cannot read {}: {e}",
                    self.folder.display()
                )))
            }
        };

        let mut manifests = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let parsed = std::fs::read(&path)
                .map_err(ImmunizationError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<RunManifest>(&bytes)?));
            match parsed {
                Ok(manifest) => manifests.push(manifest),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable manifest")
                }
            }
        }

        manifests.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        Ok(manifests)
    }
}
