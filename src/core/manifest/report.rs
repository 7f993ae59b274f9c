//! Error reporting over past runs
//!
//! Backs the `check-errors` command: collects the fatal and per-entity errors
//! of every manifest that started within a time scope.

use super::{Phase, RunManifest};
use crate::domain::ErrorKind;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// How far back `check-errors` looks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorScope {
    LastDay,
    #[default]
    LastWeek,
    LastMonth,
    All,
}

impl ErrorScope {
    /// Earliest run start included in the scope
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ErrorScope::LastDay => Some(now - Duration::days(1)),
            ErrorScope::LastWeek => Some(now - Duration::days(7)),
            ErrorScope::LastMonth => Some(now - Duration::days(30)),
            ErrorScope::All => None,
        }
    }

    pub fn includes(&self, started_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.cutoff(now).map_or(true, |cutoff| started_at >= cutoff)
    }
}

impl FromStr for ErrorScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "last-day" => Ok(ErrorScope::LastDay),
            "last-week" => Ok(ErrorScope::LastWeek),
            "last-month" => Ok(ErrorScope::LastMonth),
            "all" => Ok(ErrorScope::All),
            other => Err(format!(
                "invalid scope '{other}' (expected last-day, last-week, last-month or all)"
            )),
        }
    }
}

impl fmt::Display for ErrorScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorScope::LastDay => "last-day",
            ErrorScope::LastWeek => "last-week",
            ErrorScope::LastMonth => "last-month",
            ErrorScope::All => "all",
        };
        write!(f, "{s}")
    }
}

/// One error found in a manifest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    pub run_id: String,
    pub phase: Phase,
    pub started_at: DateTime<Utc>,

    /// `None` for a phase-level (fatal) error
    pub entity_id: Option<String>,

    pub kind: ErrorKind,
    pub message: String,
}

/// Errors within a scope
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    #[serde(skip)]
    pub scope: ErrorScope,
    pub runs_scanned: usize,
    pub entries: Vec<ErrorEntry>,
}

impl ErrorReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects the errors of manifests started within `scope`
///
/// Entries keep manifest order, fatal error first within a run.
pub fn collect_errors(manifests: &[RunManifest], scope: ErrorScope, now: DateTime<Utc>) -> ErrorReport {
    let mut runs_scanned = 0;
    let mut entries = Vec::new();

    for manifest in manifests.iter().filter(|m| scope.includes(m.started_at, now)) {
        runs_scanned += 1;

        let entry = |entity_id: Option<&str>, kind, message: &str| ErrorEntry {
            run_id: manifest.run_id.clone(),
            phase: manifest.phase,
            started_at: manifest.started_at,
            entity_id: entity_id.map(str::to_string),
            kind,
            message: message.to_string(),
        };

        if let Some(fatal) = &manifest.fatal_error {
            entries.push(entry(None, fatal.kind, &fatal.message));
        }
        for outcome in &manifest.entities {
            if let Some(error) = &outcome.error {
                entries.push(entry(Some(&outcome.entity_id), error.kind, &error.message));
            }
        }
    }

    ErrorReport {
        scope,
        runs_scanned,
        entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::manifest::{EntityOutcome, RecordedError};
    use crate::core::run::RunContext;
    use crate::domain::{EntityConfig, EntityId};
    use chrono::TimeZone;
    use test_case::test_case;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap()
    }

    fn failed_run(days_ago: i64, entity: &str) -> RunManifest {
        let run = RunContext::at(now() - Duration::days(days_ago) + Duration::minutes(1));
        let mut m = RunManifest::new(&run, Phase::Download);
        let entity = EntityConfig::new(EntityId::new(entity).unwrap(), "School", "q.csv");
        m.record(EntityOutcome::failed(
            &entity,
            RecordedError::new(ErrorKind::NetworkError, "connection reset"),
        ));
        m.finish(run.started_at);
        m
    }

    #[test_case("last-day", ErrorScope::LastDay)]
    #[test_case("last-week", ErrorScope::LastWeek)]
    #[test_case("LAST_MONTH", ErrorScope::LastMonth)]
    #[test_case("all", ErrorScope::All)]
    fn test_parse_scope(input: &str, expected: ErrorScope) {
        assert_eq!(input.parse::<ErrorScope>().unwrap(), expected);
    }

    #[test]
    fn test_default_scope_is_last_week() {
        assert_eq!(ErrorScope::default(), ErrorScope::LastWeek);
        assert_eq!(ErrorScope::default().to_string(), "last-week");
    }

    #[test]
    fn test_parse_scope_rejects_unknown() {
        assert!("yesterday".parse::<ErrorScope>().is_err());
    }

    #[test]
    fn test_scopes_filter_by_start() {
        let manifests = vec![failed_run(40, "1"), failed_run(10, "2"), failed_run(3, "3"), failed_run(0, "4")];

        let ids = |scope| {
            collect_errors(&manifests, scope, now())
                .entries
                .into_iter()
                .filter_map(|e| e.entity_id)
                .collect::<Vec<_>>()
        };

        assert_eq!(ids(ErrorScope::LastDay), vec!["4"]);
        assert_eq!(ids(ErrorScope::LastWeek), vec!["3", "4"]);
        assert_eq!(ids(ErrorScope::LastMonth), vec!["2", "3", "4"]);
        assert_eq!(ids(ErrorScope::All), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn test_fatal_error_listed_first() {
        let mut m = failed_run(0, "7");
        m.fail(RecordedError::new(ErrorKind::AuthenticationError, "re-authentication failed"));
        let report = collect_errors(&[m], ErrorScope::All, now());

        assert_eq!(report.runs_scanned, 1);
        assert_eq!(report.entries.len(), 2);
        assert_eq!(report.entries[0].entity_id, None);
        assert_eq!(report.entries[0].kind, ErrorKind::AuthenticationError);
    }

    #[test]
    fn test_clean_runs_yield_no_entries() {
        let run = RunContext::at(now());
        let mut m = RunManifest::new(&run, Phase::Upload);
        m.finish(now());
        let report = collect_errors(&[m], ErrorScope::LastDay, now());
        assert!(report.is_empty());
        assert_eq!(report.runs_scanned, 1);
    }
}
