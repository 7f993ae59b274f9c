//! `transform` command implementation
//!
//! Re-runs the transform and load stages over raw extract files already on
//! disk, such as the archive written by `download-and-transform` when
//! `paths.raw_folder` is set. The registry is not contacted.

use super::phase::select_schools;
use super::print_manifest;
use crate::config::load_config;
use crate::core::workflow::OrchestratorBuilder;
use clap::Args;
use std::path::PathBuf;
use tokio::sync::watch;

/// Arguments for the transform command
#[derive(Args, Debug)]
pub struct TransformArgs {
    /// Folder of raw files named `{school_id}_*.txt` (default: paths.raw_folder)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Only process these school IDs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub school: Vec<String>,
}

impl TransformArgs {
    /// Execute the transform command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting transform command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load configuration: {e}");
                return Ok(2);
            }
        };
        if let Err(e) = select_schools(&mut config, &self.school) {
            eprintln!("{e}");
            return Ok(2);
        }

        let Some(input) = self.input.clone().or_else(|| config.paths.raw_folder.clone()) else {
            eprintln!("No input folder: pass --input or set paths.raw_folder");
            return Ok(2);
        };

        let orchestrator = match OrchestratorBuilder::new(config)
            .shutdown_signal(shutdown_signal)
            .build()
        {
            Ok(o) => o,
            Err(e) => {
                eprintln!("Failed to initialize: {e}");
                return Ok(2);
            }
        };

        println!("🔄 Transforming raw files from {}...", input.display());
        let manifest = match orchestrator.run_transform(&input).await {
            Ok(m) => m,
            Err(e) => {
                tracing::error!(error = %e, "Transform failed");
                eprintln!("Transform failed: {e}");
                return Ok(5);
            }
        };

        print_manifest(&manifest, orchestrator.manifest_store().folder());
        Ok(manifest.exit_code())
    }
}
