//! `check-errors` command implementation
//!
//! Lists the errors recorded in run manifests within a time scope.

use crate::config::load_config;
use crate::core::manifest::{collect_errors, ErrorScope, ManifestStore};
use chrono::Utc;
use clap::Args;

/// Arguments for the check-errors command
#[derive(Args, Debug)]
pub struct CheckErrorsArgs {
    /// Time scope: last-day, last-week, last-month or all
    #[arg(long, default_value = "last-week")]
    pub scope: ErrorScope,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckErrorsArgs {
    /// Execute the check-errors command
    ///
    /// Exits 0 when no errors are found and 1 otherwise.
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(scope = %self.scope, "Checking run manifests for errors");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let store = ManifestStore::new(config.paths.manifest_folder());
        let manifests = match store.load_all() {
            Ok(m) => m,
            Err(e) => {
                println!("❌ Failed to read run manifests");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        let report = collect_errors(&manifests, self.scope, Utc::now());

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(if report.is_empty() { 0 } else { 1 });
        }

        println!("🔍 Errors ({}), {} run(s) scanned", self.scope, report.runs_scanned);
        println!();

        if report.is_empty() {
            println!("✅ No errors found.");
            return Ok(0);
        }

        println!(
            "{:<20} {:<10} {:<10} {:<10} {:<22} Message",
            "Started", "Run", "Phase", "School", "Kind"
        );
        println!("{}", "-".repeat(100));
        for entry in &report.entries {
            println!(
                "{:<20} {:<10} {:<10} {:<10} {:<22} {}",
                entry.started_at.format("%Y-%m-%d %H:%M:%S"),
                entry.run_id,
                entry.phase.to_string(),
                entry.entity_id.as_deref().unwrap_or("-"),
                entry.kind.to_string(),
                entry.message
            );
        }
        println!();
        println!("⚠️  {} error(s) found", report.entries.len());

        Ok(1)
    }
}
