//! Vaccination date parsing and formatting

use chrono::format::{Item, StrftimeItems};
use chrono::NaiveDate;
use std::fmt::Write;

/// Parses raw dates with a list of accepted formats and writes them in the
/// output format
#[derive(Debug, Clone)]
pub struct DateFormatter {
    input_formats: Vec<String>,
    output_format: String,
}

impl DateFormatter {
    /// Creates a formatter; returns `None` if any format string is invalid
    pub fn new(input_formats: &[String], output_format: &str) -> Option<Self> {
        let all_valid = input_formats
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(output_format))
            .all(|f| !StrftimeItems::new(f).any(|item| matches!(item, Item::Error)));
        if !all_valid || input_formats.is_empty() {
            return None;
        }
        Some(Self {
            input_formats: input_formats.to_vec(),
            output_format: output_format.to_string(),
        })
    }

    /// Parses with the first matching input format
    pub fn parse(&self, raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        self.input_formats
            .iter()
            .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
    }

    /// Reformats a raw date, or `None` if no input format matches
    pub fn reformat(&self, raw: &str) -> Option<String> {
        let date = self.parse(raw)?;
        let mut out = String::with_capacity(10);
        write!(out, "{}", date.format(&self.output_format)).ok()?;
        Some(out)
    }
}
