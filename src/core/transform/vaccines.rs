//! Vaccine name normalization table
//!
//! Registry vaccine group names are mapped case-insensitively onto the names
//! the school system imports. Names missing from the table are rejected.

use std::collections::{BTreeMap, HashMap};

/// Built-in mappings (raw name, normalized name)
const BUILTIN_VACCINES: &[(&str, &str)] = &[
    ("COVID-19", "COVID-19"),
    ("COVID", "COVID-19"),
    ("COVID19", "COVID-19"),
    ("DTaP", "DTaP"),
    ("DTaP/DTP/DT", "DTaP"),
    ("DT", "DTaP"),
    ("Tdap", "Tdap"),
    ("Td", "Td"),
    ("Flu", "Flu"),
    ("Influenza", "Flu"),
    ("Hepatitis A", "Hepatitis A"),
    ("HepA", "Hepatitis A"),
    ("Hepatitis B", "Hepatitis B"),
    ("HepB", "Hepatitis B"),
    ("Hib", "Hib"),
    ("HPV", "HPV"),
    ("Meningococcal", "Meningococcal"),
    ("MCV4", "Meningococcal"),
    ("MenACWY", "Meningococcal"),
    ("MenB", "MenB"),
    ("MMR", "MMR"),
    ("Pneumococcal", "Pneumococcal"),
    ("PCV", "Pneumococcal"),
    ("Polio", "Polio"),
    ("IPV", "Polio"),
    ("Rotavirus", "Rotavirus"),
    ("Varicella", "Varicella"),
    ("VAR", "Varicella"),
];

/// Case-insensitive vaccine name mapping
#[derive(Debug, Clone)]
pub struct VaccineTable {
    entries: HashMap<String, String>,
}

impl VaccineTable {
    /// Built-in table extended (or overridden) by configured mappings
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut entries: HashMap<String, String> = BUILTIN_VACCINES
            .iter()
            .map(|(raw, normalized)| (key(raw), normalized.to_string()))
            .collect();
        for (raw, normalized) in overrides {
            entries.insert(key(raw), normalized.trim().to_string());
        }
        Self { entries }
    }

    /// Normalized name for a raw vaccine name, if known
    pub fn normalize(&self, raw: &str) -> Option<&str> {
        self.entries.get(&key(raw)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for VaccineTable {
    fn default() -> Self {
        Self::with_overrides(&BTreeMap::new())
    }
}

fn key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_are_case_insensitive() {
        let table = VaccineTable::default();
        assert_eq!(table.normalize("COVID-19"), Some("COVID-19"));
        assert_eq!(table.normalize("covid-19"), Some("COVID-19"));
        assert_eq!(table.normalize(" influenza "), Some("Flu"));
        assert_eq!(table.normalize("hepb"), Some("Hepatitis B"));
    }

    #[test]
    fn test_unknown_name() {
        assert_eq!(VaccineTable::default().normalize("XYZ-123"), None);
    }

    #[test]
    fn test_overrides_win() {
        let mut overrides = BTreeMap::new();
        overrides.insert("Influenza".to_string(), "Influenza".to_string());
        overrides.insert("Mpox".to_string(), "Mpox".to_string());

        let table = VaccineTable::with_overrides(&overrides);
        assert_eq!(table.normalize("influenza"), Some("Influenza"));
        assert_eq!(table.normalize("MPOX"), Some("Mpox"));
        assert_eq!(table.len(), VaccineTable::default().len() + 1);
    }
}
