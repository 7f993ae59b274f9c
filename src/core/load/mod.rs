//! Load stage
//!
//! Writes normalized records as the comma-delimited file the school system
//! imports (`id_1,id_2,vaccine_group_name,vaccination_date`), one file per
//! entity per run, and optionally archives the raw registry extracts.

pub mod atomic;
pub mod checksum;

use crate::core::run::RunContext;
use crate::domain::{EntityConfig, NormalizedRecord, RawExtract, Result, OUTPUT_COLUMNS};
use atomic::{write_atomic, OnCollision};
use checksum::sha256_hex;
use std::path::{Path, PathBuf};

/// A file produced by the load stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFile {
    pub path: PathBuf,
    pub records: usize,
    pub sha256: String,
}

/// Persists an entity's normalized records
pub trait Loader: Send + Sync {
    /// Writes the records and returns the file written
    ///
    /// Zero records still produce a header-only file.
    fn load(
        &self,
        entity: &EntityConfig,
        records: &[NormalizedRecord],
        run: &RunContext,
    ) -> Result<LoadedFile>;
}

/// [`Loader`] writing CSV files into one output folder
#[derive(Debug, Clone)]
pub struct CsvFileLoader {
    output_folder: PathBuf,
}

impl CsvFileLoader {
    pub fn new(output_folder: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
        }
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }
}

impl Loader for CsvFileLoader {
    fn load(
        &self,
        entity: &EntityConfig,
        records: &[NormalizedRecord],
        run: &RunContext,
    ) -> Result<LoadedFile> {
        let bytes = records_to_csv(records)?;
        let path = self.output_folder.join(output_file_name(entity, run));
        let path = write_atomic(&path, &bytes, OnCollision::Suffix(&run.run_id))?;

        tracing::info!(
            entity_id = %entity.id,
            path = %path.display(),
            records = records.len(),
            "Wrote output file"
        );

        Ok(LoadedFile {
            path,
            records: records.len(),
            sha256: sha256_hex(&bytes),
        })
    }
}

/// Serializes records with the output header
pub fn records_to_csv(records: &[NormalizedRecord]) -> Result<Vec<u8>> {
    encode_records(records, true)
}

/// Serializes records, optionally preceded by the output header
pub fn encode_records(records: &[NormalizedRecord], with_header: bool) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    if with_header {
        writer.write_record(OUTPUT_COLUMNS)?;
    }
    for record in records {
        writer.write_record([
            record.id_1.as_str(),
            record.id_2.as_str(),
            record.vaccine_group_name.as_str(),
            record.vaccination_date.as_str(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| crate::domain::ImmunizationError::Io(format!("CSV flush failed: {e}")))
}

/// Renders the entity's output file pattern
///
/// Placeholders: `{id}`, `{name}`, `{timestamp}`, `{run_id}`.
pub fn output_file_name(entity: &EntityConfig, run: &RunContext) -> String {
    entity
        .output_pattern()
        .replace("{id}", entity.id.as_str())
        .replace("{name}", &file_safe(&entity.name))
        .replace("{timestamp}", &run.timestamp())
        .replace("{run_id}", &run.run_id)
}

/// Archives a raw extract as `{entity_id}_{timestamp}_{result_id}.txt`
pub fn archive_raw(
    folder: &Path,
    entity: &EntityConfig,
    run: &RunContext,
    extract: &RawExtract,
) -> Result<PathBuf> {
    let name = format!(
        "{}_{}_{}.txt",
        entity.id,
        run.timestamp(),
        file_safe(extract.result_id.as_str())
    );
    let path = write_atomic(
        &folder.join(name),
        &extract.content,
        OnCollision::Suffix(&run.run_id),
    )?;
    tracing::debug!(entity_id = %entity.id, path = %path.display(), "Archived raw extract");
    Ok(path)
}

fn file_safe(value: &str) -> String {
    value
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
