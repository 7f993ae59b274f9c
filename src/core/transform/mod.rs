//! Raw extract transformation
//!
//! Converts pipe-delimited AISR extracts into the four-column CSV schema the
//! school information system imports:
//!
//! - **Parse**: split rows and enforce the configured column count
//! - **Map**: pick the mapped columns; every other column must be listed as
//!   dropped
//! - **Normalize**: translate vaccine names through [`VaccineTable`] and
//!   reformat dates with [`DateFormatter`]
//!
//! Transformation is pure: the same extract always yields the same records,
//! and any error fails the whole extract.

pub mod dates;
pub mod parse;
pub mod vaccines;

pub use dates::DateFormatter;
pub use parse::parse_extract;
pub use vaccines::VaccineTable;

use crate::config::TransformConfig;
use crate::domain::{ImmunizationError, NormalizedRecord, RawExtract, RawRecord, Result, TransformError};
use std::collections::HashSet;

/// Turns raw registry extracts into normalized records
pub trait Transformer: Send + Sync {
    /// Transforms one extract
    ///
    /// # Errors
    ///
    /// Returns the first [`TransformError`] found; no records are returned in
    /// that case.
    fn transform(&self, extract: &RawExtract) -> std::result::Result<Vec<NormalizedRecord>, TransformError>;
}

/// Resolved column positions
#[derive(Debug, Clone)]
struct ColumnMapping {
    student_id: usize,
    secondary_id: Option<usize>,
    vaccine: usize,
    date: usize,
}

/// Transformer for the AISR full vaccine file
#[derive(Debug, Clone)]
pub struct AisrTransformer {
    columns: Vec<String>,
    mapping: ColumnMapping,
    vaccines: VaccineTable,
    dates: DateFormatter,
}

impl AisrTransformer {
    /// Builds a transformer from the transform configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the column mapping is not total or a
    /// date format is invalid.
    pub fn new(config: &TransformConfig) -> Result<Self> {
        config
            .validate()
            .map_err(ImmunizationError::Configuration)?;

        let index = |name: &str| {
            config.column_index(name).ok_or_else(|| {
                ImmunizationError::Configuration(format!("unknown transform column '{name}'"))
            })
        };

        let mapping = ColumnMapping {
            student_id: index(&config.student_id_column)?,
            secondary_id: config
                .secondary_id_column
                .as_deref()
                .map(index)
                .transpose()?,
            vaccine: index(&config.vaccine_column)?,
            date: index(&config.date_column)?,
        };

        let dates = DateFormatter::new(&config.input_date_formats, &config.output_date_format)
            .ok_or_else(|| {
                ImmunizationError::Configuration("invalid transform date format".to_string())
            })?;

        Ok(Self {
            columns: config.columns.clone(),
            mapping,
            vaccines: VaccineTable::with_overrides(&config.vaccine_names),
            dates,
        })
    }

    fn normalize(&self, raw: &RawRecord) -> std::result::Result<NormalizedRecord, TransformError> {
        let required = |index: usize| {
            let value = raw.field(index);
            if value.is_empty() {
                Err(TransformError::MissingValue {
                    line: raw.line,
                    column: self.columns[index].clone(),
                })
            } else {
                Ok(value)
            }
        };

        let id_1 = required(self.mapping.student_id)?.to_string();
        let id_2 = self
            .mapping
            .secondary_id
            .map(|i| raw.field(i).to_string())
            .unwrap_or_default();

        let code = required(self.mapping.vaccine)?;
        let vaccine_group_name = self
            .vaccines
            .normalize(code)
            .ok_or_else(|| TransformError::UnknownVaccineCode {
                line: raw.line,
                code: code.to_string(),
            })?
            .to_string();

        let raw_date = raw.field(self.mapping.date);
        let vaccination_date =
            self.dates
                .reformat(raw_date)
                .ok_or_else(|| TransformError::InvalidDate {
                    line: raw.line,
                    value: raw_date.to_string(),
                })?;

        Ok(NormalizedRecord {
            id_1,
            id_2,
            vaccine_group_name,
            vaccination_date,
            source_line: raw.line,
        })
    }
}

impl Transformer for AisrTransformer {
    fn transform(&self, extract: &RawExtract) -> std::result::Result<Vec<NormalizedRecord>, TransformError> {
        parse_extract(extract, &self.columns)?
            .iter()
            .map(|raw| self.normalize(raw))
            .collect()
    }
}

/// Concatenates record batches, keeping the first occurrence of each record
pub fn merge_records<I>(batches: I) -> Vec<NormalizedRecord>
where
    I: IntoIterator<Item = Vec<NormalizedRecord>>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for record in batches.into_iter().flatten() {
        let key = (
            record.id_1.clone(),
            record.id_2.clone(),
            record.vaccine_group_name.clone(),
            record.vaccination_date.clone(),
        );
        if seen.insert(key) {
            merged.push(record);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResultId;

    fn extract(content: &str) -> RawExtract {
        RawExtract::new(ResultId::new("r1"), content)
    }

    fn transformer() -> AisrTransformer {
        AisrTransformer::new(&TransformConfig::default()).unwrap()
    }

    #[test]
    fn test_transform_full_vaccine_file() {
        let content = "id_1|id_2|name|dob|vaccine_group_name|vaccination_date\n\
                       1001|55501|Jane Doe|03/04/2012|COVID-19|05/01/2023\n\
                       1001|55501|Jane Doe|03/04/2012|influenza|10/15/2022\n";
        let records = transformer().transform(&extract(content)).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id_1, "1001");
        assert_eq!(records[0].id_2, "55501");
        assert_eq!(records[0].vaccine_group_name, "COVID-19");
        assert_eq!(records[0].vaccination_date, "2023-05-01");
        assert_eq!(records[0].source_line, 2);
        assert_eq!(records[1].vaccine_group_name, "Flu");
        assert_eq!(records[1].vaccination_date, "2022-10-15");
    }

    #[test]
    fn test_transform_four_column_schema() {
        let config = TransformConfig {
            columns: vec![
                "id_1".into(),
                "name".into(),
                "vaccine_group_name".into(),
                "vaccination_date".into(),
            ],
            secondary_id_column: None,
            dropped_columns: vec!["name".into()],
            ..Default::default()
        };
        let transformer = AisrTransformer::new(&config).unwrap();
        let records = transformer
            .transform(&extract("S1|Doe|COVID-19|2023-05-01"))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id_1, "S1");
        assert_eq!(records[0].id_2, "");
        assert_eq!(records[0].vaccine_group_name, "COVID-19");
        assert_eq!(records[0].vaccination_date, "2023-05-01");
    }

    #[test]
    fn test_transform_is_deterministic() {
        let content = "1|2|A|01/01/2010|MMR|05/01/2023\n3|4|B|01/01/2011|Polio|06/01/2023\n";
        let first = transformer().transform(&extract(content)).unwrap();
        let second = transformer().transform(&extract(content)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_vaccine_fails_whole_extract() {
        let content = "1|2|A|01/01/2010|MMR|05/01/2023\n3|4|B|01/01/2011|XYZ-123|06/01/2023\n";
        let err = transformer().transform(&extract(content)).unwrap_err();
        assert_eq!(
            err,
            TransformError::UnknownVaccineCode {
                line: 2,
                code: "XYZ-123".into()
            }
        );
    }

    #[test]
    fn test_invalid_date() {
        let err = transformer()
            .transform(&extract("1|2|A|01/01/2010|MMR|2023/31/12"))
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidDate { line: 1, .. }));
    }

    #[test]
    fn test_missing_student_id() {
        let err = transformer()
            .transform(&extract("|2|A|01/01/2010|MMR|05/01/2023"))
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingValue { ref column, .. } if column == "id_1"));
    }

    #[test]
    fn test_wrong_column_count_is_parse_error() {
        let err = transformer()
            .transform(&extract("1|2|MMR|05/01/2023"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::domain::ErrorKind::ParseError);
    }

    #[test]
    fn test_new_rejects_partial_mapping() {
        let config = TransformConfig {
            dropped_columns: vec!["name".into()],
            ..Default::default()
        };
        assert!(matches!(
            AisrTransformer::new(&config),
            Err(ImmunizationError::Configuration(_))
        ));
    }

    #[test]
    fn test_merge_records_dedupes_in_order() {
        let record = |id: &str, vaccine: &str| NormalizedRecord {
            id_1: id.into(),
            id_2: String::new(),
            vaccine_group_name: vaccine.into(),
            vaccination_date: "2023-05-01".into(),
            source_line: 1,
        };
        let merged = merge_records(vec![
            vec![record("1", "MMR"), record("2", "MMR")],
            vec![record("1", "MMR"), record("3", "Polio")],
        ]);
        let ids: Vec<&str> = merged.iter().map(|r| r.id_1.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
