//! Pipe-delimited extract parsing

use crate::domain::{RawExtract, RawRecord, TransformError};

/// Field delimiter of AISR extracts
pub const DELIMITER: char = '|';

/// Splits an extract into raw records
///
/// Blank lines are skipped, `\r\n` line endings are tolerated, and a leading
/// row equal to `columns` is treated as the header. Every other row must have
/// exactly `columns.len()` fields.
///
/// # Errors
///
/// - [`TransformError::Encoding`] if the content is not UTF-8
/// - [`TransformError::ColumnCount`] for the first row with a wrong field count
pub fn parse_extract(
    extract: &RawExtract,
    columns: &[String],
) -> Result<Vec<RawRecord>, TransformError> {
    let text = std::str::from_utf8(&extract.content).map_err(|e| {
        TransformError::Encoding(format!("result {}: {e}", extract.result_id))
    })?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut records = Vec::new();
    let mut seen_data = false;

    for (index, line) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<String> = line
            .split(DELIMITER)
            .map(|f| f.trim().to_string())
            .collect();

        if !seen_data && is_header(&fields, columns) {
            seen_data = true;
            continue;
        }
        seen_data = true;

        if fields.len() != columns.len() {
            return Err(TransformError::ColumnCount {
                line: line_number,
                expected: columns.len(),
                found: fields.len(),
            });
        }

        records.push(RawRecord {
            result_id: extract.result_id.clone(),
            line: line_number,
            fields,
        });
    }

    Ok(records)
}

fn is_header(fields: &[String], columns: &[String]) -> bool {
    fields.len() == columns.len()
        && fields
            .iter()
            .zip(columns)
            .all(|(field, column)| field.eq_ignore_ascii_case(column))
}
