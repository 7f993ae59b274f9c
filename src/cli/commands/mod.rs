//! CLI command implementations
//!
//! Exit codes: 0 done, 1 partial, 2 configuration error, 3 authentication or
//! phase failure, 5 fatal error, 130 interrupted.

pub mod check_errors;
pub mod phase;
pub mod transform;
pub mod validate;

use crate::core::manifest::{EntityStatus, RunManifest, RunStatus};

/// Prints the outcome of a phase run
pub(crate) fn print_manifest(manifest: &RunManifest, manifest_folder: &std::path::Path) {
    println!();
    println!("📊 {} Summary:", capitalize(&manifest.phase.to_string()));
    println!("  Run ID: {}", manifest.run_id);
    println!("  Schools: {}", manifest.entities.len());
    println!("  Done: {}", manifest.count(EntityStatus::Done));
    println!("  Failed: {}", manifest.count(EntityStatus::Failed));
    println!("  Not Attempted: {}", manifest.count(EntityStatus::NotAttempted));
    println!("  Records Written: {}", manifest.total_records());
    println!("  Manifests: {}", manifest_folder.display());
    println!();

    if !manifest.outputs.is_empty() {
        println!("📁 Output files:");
        for path in &manifest.outputs {
            println!("  - {}", path.display());
        }
        println!();
    }
    if let Some(path) = &manifest.changes_file {
        println!("🆕 New vaccinations: {}", path.display());
        println!();
    }

    if let Some(error) = &manifest.fatal_error {
        println!("❌ {error}");
        println!();
    }
    let failures: Vec<_> = manifest
        .entities
        .iter()
        .filter_map(|e| e.error.as_ref().map(|err| (e, err)))
        .collect();
    if !failures.is_empty() {
        println!("⚠️  Errors encountered:");
        for (entity, error) in failures {
            println!("  - {} ({}): {}", entity.entity_id, entity.entity_name, error);
        }
        println!();
    }

    if manifest.interrupted {
        println!("⚠️  Run interrupted; remaining schools were not attempted.");
    } else {
        match manifest.status {
            RunStatus::Done => println!("✅ Completed successfully!"),
            RunStatus::Partial => println!("⚠️  Completed with failures"),
            RunStatus::Failed => println!("❌ Failed"),
        }
    }
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("upload"), "Upload");
        assert_eq!(capitalize(""), "");
    }
}
