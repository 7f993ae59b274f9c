//! Validate config command implementation
//!
//! Loads the configuration file (with `${VAR}` substitution and
//! `IMMUNIZATION_*` overrides applied) and prints what a run would use.

use crate::config::{load_config, AppConfig};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        match load_config(config_path) {
            Ok(config) => {
                println!("✅ Configuration is valid");
                println!();
                print_summary(&config);
                Ok(0)
            }
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                Ok(2)
            }
        }
    }
}

fn print_summary(config: &AppConfig) {
    println!("Configuration Summary:");
    println!("  Environment: {:?}", config.environment);
    println!("  Log Level: {}", config.application.log_level);
    println!("  Auth URL: {}", config.api.auth_base_url);
    println!("  API URL: {}", config.api.aisr_api_base_url);
    println!("  Concurrency: {}", config.api.concurrency);
    println!("  Max Retries: {}", config.api.retry.max_retries);
    println!("  Output Folder: {}", config.paths.output_folder.display());
    println!("  Logs Folder: {}", config.paths.logs_folder.display());
    if let Some(raw) = &config.paths.raw_folder {
        println!("  Raw Archive: {}", raw.display());
    }
    println!("  Raw Columns: {}", config.transform.columns.join("|"));
    println!("  Output Date Format: {}", config.transform.output_date_format);
    println!("  Incremental: {}", config.incremental.enabled);
    println!("  Schools: {}", config.schools.len());
    for school in &config.schools {
        let marker = if school.bulk_query_file.exists() { "" } else { "  (query file missing)" };
        println!(
            "    - {} {} [{}]{}",
            school.id,
            school.name,
            school.bulk_query_file.display(),
            marker
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_validate_missing_file_is_config_error() {
        let args = ValidateArgs {};
        let code = args.execute("/nonexistent/config.json").await.unwrap();
        assert_eq!(code, 2);
    }

    #[tokio::test]
    async fn test_validate_valid_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "api": {{
                    "auth_base_url": "https://auth.example.org",
                    "aisr_api_base_url": "https://api.example.org"
                }},
                "paths": {{ "output_folder": "out", "logs_folder": "logs" }},
                "schools": [
                    {{ "id": "2542", "name": "Friendly Hills", "bulk_query_file": "q.csv" }}
                ]
            }}"#
        )
        .unwrap();

        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 0);
    }
}
