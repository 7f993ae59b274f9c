//! Incremental "new vaccinations" processing
//!
//! After a download phase the combined records of all successful schools are
//! compared with a master file of every vaccination seen so far. Rows missing
//! from the master go to a dated changes file and the master is replaced with
//! the union. Both files are headerless, as the school system imports them.

use crate::config::IncrementalConfig;
use crate::core::load::atomic::{write_atomic, OnCollision};
use crate::core::load::encode_records;
use crate::core::run::RunContext;
use crate::core::transform::merge_records;
use crate::domain::{ImmunizationError, NormalizedRecord, Result, OUTPUT_COLUMNS};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Files written by one incremental step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncrementalOutcome {
    pub changes_file: PathBuf,
    pub master_file: PathBuf,
    pub new_records: usize,
    pub known_records: usize,
}

#[derive(Debug, Clone)]
pub struct IncrementalProcessor {
    master_file: PathBuf,
    changes_folder: PathBuf,
}

impl IncrementalProcessor {
    pub fn new(config: &IncrementalConfig, output_folder: &Path) -> Self {
        Self {
            master_file: output_folder.join(&config.master_file_name),
            changes_folder: output_folder.join(&config.changes_folder),
        }
    }

    pub fn master_file(&self) -> &Path {
        &self.master_file
    }

    /// Reads the master file; a missing file is an empty history
    pub fn load_known(&self) -> Result<Vec<NormalizedRecord>> {
        let bytes = match std::fs::read(&self.master_file) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.master_file.display(), "No master file yet, starting empty");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(ImmunizationError::Io(format!(
                    "cannot read {}: {e}",
                    self.master_file.display()
                )))
            }
        };
        parse_master(&bytes)
    }

    /// Writes the changes file for `current` and replaces the master
    pub fn process(&self, current: &[NormalizedRecord], run: &RunContext) -> Result<IncrementalOutcome> {
        let known = self.load_known()?;
        let added = new_records(current, &known);

        let changes_name = format!("{}_new_vaccinations.csv", run.started_at.format("%Y-%m-%d"));
        let changes_file = write_atomic(
            &self.changes_folder.join(changes_name),
            &encode_records(&added, false)?,
            OnCollision::Suffix(&run.run_id),
        )?;

        let union = merge_records([known, current.to_vec()]);
        let master_file = write_atomic(
            &self.master_file,
            &encode_records(&union, false)?,
            OnCollision::Overwrite,
        )?;

        tracing::info!(
            current = current.len(),
            new_records = added.len(),
            known_records = union.len(),
            changes_file = %changes_file.display(),
            "Incremental processing complete"
        );

        Ok(IncrementalOutcome {
            changes_file,
            master_file,
            new_records: added.len(),
            known_records: union.len(),
        })
    }
}

/// Records of `current` absent from `known`, deduplicated, in order
pub fn new_records(current: &[NormalizedRecord], known: &[NormalizedRecord]) -> Vec<NormalizedRecord> {
    let known: HashSet<_> = known.iter().map(NormalizedRecord::key).collect();
    merge_records([current
        .iter()
        .filter(|r| !known.contains(&r.key()))
        .cloned()
        .collect::<Vec<_>>()])
}

fn parse_master(bytes: &[u8]) -> Result<Vec<NormalizedRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut records = Vec::new();
    for (index, row) in reader.records().enumerate() {
        let row = row?;
        if row.len() < OUTPUT_COLUMNS.len() {
            tracing::warn!(line = index + 1, fields = row.len(), "Skipping short master file row");
            continue;
        }
        if row.iter().take(OUTPUT_COLUMNS.len()).eq(OUTPUT_COLUMNS.iter().copied()) {
            continue;
        }
        records.push(NormalizedRecord {
            id_1: row[0].to_string(),
            id_2: row[1].to_string(),
            vaccine_group_name: row[2].to_string(),
            vaccination_date: row[3].to_string(),
            source_line: index + 1,
        });
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(id: &str, vaccine: &str, date: &str) -> NormalizedRecord {
        NormalizedRecord {
            id_1: id.into(),
            id_2: String::new(),
            vaccine_group_name: vaccine.into(),
            vaccination_date: date.into(),
            source_line: 1,
        }
    }

    fn run() -> RunContext {
        RunContext {
            run_id: "feedbeef".into(),
            started_at: Utc.with_ymd_and_hms(2025, 9, 2, 7, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_new_records_diff() {
        let known = vec![record("1", "MMR", "2023-05-01")];
        let current = vec![
            record("1", "MMR", "2023-05-01"),
            record("2", "Polio", "2023-06-01"),
            record("2", "Polio", "2023-06-01"),
        ];
        let added = new_records(&current, &known);
        assert_eq!(added, vec![record("2", "Polio", "2023-06-01")]);
    }

    #[test]
    fn test_first_run_everything_is_new() {
        let dir = TempDir::new().unwrap();
        let processor = IncrementalProcessor::new(&IncrementalConfig::default(), dir.path());
        let current = vec![record("1", "MMR", "2023-05-01"), record("2", "HPV", "2024-01-10")];

        let outcome = processor.process(&current, &run()).unwrap();
        assert_eq!(outcome.new_records, 2);
        assert_eq!(outcome.known_records, 2);
        assert!(outcome.changes_file.ends_with("changes/2025-09-02_new_vaccinations.csv"));
        assert_eq!(
            std::fs::read_to_string(&outcome.master_file).unwrap(),
            "1,,MMR,2023-05-01\n2,,HPV,2024-01-10\n"
        );
    }

    #[test]
    fn test_second_run_only_new_rows() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("all_known_vaccinations.csv"),
            "id_1,id_2,vaccine_group_name,vaccination_date\n1,,MMR,2023-05-01\n9,,Td,2019-01-01\n",
        )
        .unwrap();
        let processor = IncrementalProcessor::new(&IncrementalConfig::default(), dir.path());
        let current = vec![record("1", "MMR", "2023-05-01"), record("3", "Flu", "2024-10-01")];

        let outcome = processor.process(&current, &run()).unwrap();
        assert_eq!(outcome.new_records, 1);
        assert_eq!(
            std::fs::read_to_string(&outcome.changes_file).unwrap(),
            "3,,Flu,2024-10-01\n"
        );
        let master = processor.load_known().unwrap();
        assert_eq!(master.len(), 3);
        assert_eq!(master[1].id_1, "9");
    }

    #[test]
    fn test_same_day_rerun_keeps_first_changes_file() {
        let dir = TempDir::new().unwrap();
        let processor = IncrementalProcessor::new(&IncrementalConfig::default(), dir.path());
        let first = processor.process(&[record("1", "MMR", "2023-05-01")], &run()).unwrap();
        let second = processor.process(&[record("1", "MMR", "2023-05-01")], &run()).unwrap();

        assert_ne!(first.changes_file, second.changes_file);
        assert_eq!(second.new_records, 0);
        assert_eq!(std::fs::read_to_string(&second.changes_file).unwrap(), "");
    }
}
