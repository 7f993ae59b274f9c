//! Raw and normalized immunization records

use super::ids::ResultId;
use serde::{Deserialize, Serialize};

/// Raw content of one downloaded registry result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExtract {
    /// Registry result the content came from
    pub result_id: ResultId,

    /// Pipe-delimited UTF-8 bytes as delivered by the registry
    pub content: Vec<u8>,
}

impl RawExtract {
    pub fn new(result_id: ResultId, content: impl Into<Vec<u8>>) -> Self {
        Self {
            result_id,
            content: content.into(),
        }
    }
}

/// One row of a pipe-delimited registry extract
///
/// Fields are kept in source column order. Produced by the parser and only
/// ever read afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// Registry result the row came from
    pub result_id: ResultId,

    /// 1-based line number in the extract
    pub line: usize,

    /// Field values in source column order
    pub fields: Vec<String>,
}

impl RawRecord {
    pub fn field(&self, index: usize) -> &str {
        self.fields.get(index).map(String::as_str).unwrap_or("")
    }
}

/// Column names of the destination CSV, in import order
pub const OUTPUT_COLUMNS: [&str; 4] = ["id_1", "id_2", "vaccine_group_name", "vaccination_date"];

/// One row of the destination CSV
///
/// Serialized field order matches [`OUTPUT_COLUMNS`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// School-system student identifier
    pub id_1: String,

    /// Secondary registry identifier (empty when the source has none)
    pub id_2: String,

    /// Normalized vaccine group name
    pub vaccine_group_name: String,

    /// Formatted vaccination date
    pub vaccination_date: String,

    /// Line of the raw record this row was built from
    #[serde(skip)]
    pub source_line: usize,
}

impl NormalizedRecord {
    /// Identity of the immunization event, ignoring provenance
    pub fn key(&self) -> (&str, &str, &str, &str) {
        (
            &self.id_1,
            &self.id_2,
            &self.vaccine_group_name,
            &self.vaccination_date,
        )
    }
}
