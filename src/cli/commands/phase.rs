//! `submit-queries` and `download-and-transform` commands
//!
//! Both phases talk to AISR and need credentials: the username comes from
//! `--username`/`AISR_USERNAME`, the password only from `AISR_PASSWORD`.

use super::print_manifest;
use crate::cli::PASSWORD_ENV_VAR;
use crate::config::{load_config, AppConfig};
use crate::core::workflow::{OrchestratorBuilder, WorkflowOrchestrator};
use crate::domain::{Credentials, ImmunizationError};
use clap::Args;
use tokio::sync::watch;

/// Arguments shared by the registry phases
#[derive(Args, Debug)]
pub struct PhaseArgs {
    /// Only process these school IDs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub school: Vec<String>,
}

impl PhaseArgs {
    /// Execute the `submit-queries` command
    pub async fn submit(
        &self,
        config_path: &str,
        username: Option<&str>,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting submit-queries command");
        let orchestrator = match self.prepare(config_path, username, shutdown_signal) {
            Ok(o) => o,
            Err(code) => return Ok(code),
        };

        println!("🚀 Submitting bulk queries...");
        let manifest = match orchestrator.run_upload().await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "Upload phase failed");
                eprintln!("Upload phase failed: {e}");
                return Ok(5);
            }
        };

        print_manifest(&manifest, orchestrator.manifest_store().folder());
        Ok(manifest.exit_code())
    }

    /// Execute the `download-and-transform` command
    pub async fn download(
        &self,
        config_path: &str,
        username: Option<&str>,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting download-and-transform command");
        let orchestrator = match self.prepare(config_path, username, shutdown_signal) {
            Ok(o) => o,
            Err(code) => return Ok(code),
        };

        println!("🚀 Downloading vaccination records...");
        let manifest = match orchestrator.run_download().await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "Download phase failed");
                eprintln!("Download phase failed: {e}");
                return Ok(5);
            }
        };

        print_manifest(&manifest, orchestrator.manifest_store().folder());
        Ok(manifest.exit_code())
    }

    /// Loads configuration and credentials, returning an exit code on failure
    fn prepare(
        &self,
        config_path: &str,
        username: Option<&str>,
        shutdown_signal: watch::Receiver<bool>,
    ) -> Result<WorkflowOrchestrator, i32> {
        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load configuration");
                eprintln!("Failed to load configuration: {e}");
                return Err(2);
            }
        };

        if let Err(e) = select_schools(&mut config, &self.school) {
            eprintln!("{e}");
            return Err(2);
        }

        let Some(username) = username.filter(|u| !u.trim().is_empty()) else {
            eprintln!("AISR username required: pass --username or set AISR_USERNAME");
            return Err(2);
        };
        let credentials = match Credentials::from_env(username, PASSWORD_ENV_VAR) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                return Err(2);
            }
        };

        OrchestratorBuilder::new(config)
            .credentials(credentials)
            .shutdown_signal(shutdown_signal)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to initialize registry clients");
                eprintln!("Failed to initialize: {e}");
                match e {
                    ImmunizationError::Configuration(_) => 2,
                    _ => 5,
                }
            })
    }
}

/// Restricts the configured schools to `ids`; empty keeps all
pub(crate) fn select_schools(config: &mut AppConfig, ids: &[String]) -> Result<(), String> {
    if ids.is_empty() {
        return Ok(());
    }
    let unknown: Vec<&str> = ids
        .iter()
        .map(String::as_str)
        .filter(|id| config.school(id).is_none())
        .collect();
    if !unknown.is_empty() {
        return Err(format!("Unknown school id(s): {}", unknown.join(", ")));
    }
    config.schools.retain(|s| ids.iter().any(|id| id == s.id.as_str()));
    tracing::info!(schools = ?ids, "Restricting run to selected schools");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathsConfig;
    use crate::domain::{EntityConfig, EntityId};

    fn config() -> AppConfig {
        let schools = ["1001", "2542", "3003"]
            .into_iter()
            .map(|id| EntityConfig::new(EntityId::new(id).unwrap(), "School", "q.csv"))
            .collect();
        AppConfig::new(PathsConfig::new("out", "logs"), schools)
    }

    #[test]
    fn test_select_schools_keeps_config_order() {
        let mut config = config();
        select_schools(&mut config, &["3003".into(), "1001".into()]).unwrap();
        let ids: Vec<&str> = config.schools.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["1001", "3003"]);
    }

    #[test]
    fn test_select_schools_rejects_unknown() {
        let mut config = config();
        let err = select_schools(&mut config, &["9999".into()]).unwrap_err();
        assert!(err.contains("9999"));
        assert_eq!(config.schools.len(), 3);
    }

    #[test]
    fn test_select_schools_empty_keeps_all() {
        let mut config = config();
        select_schools(&mut config, &[]).unwrap();
        assert_eq!(config.schools.len(), 3);
    }
}
