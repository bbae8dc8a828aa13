// ABOUTME: Validate command - check a migration between Atlas and the self-hosted database
// ABOUTME: Writes a text report; exits non-zero iff any check recorded an error

use crate::validation::{validate_migration, ValidationPlan, ValidationReport};
use anyhow::Result;
use std::path::Path;

/// Run the migration checklist, write the report, and fail on errors
///
/// Warnings (such as count differences) are reported but do not fail the run.
pub async fn validate(plan: &ValidationPlan, report_path: &Path) -> Result<ValidationReport> {
    tracing::info!("Starting validation...");
    tracing::info!("");

    let report = validate_migration(plan).await;
    report.write_to(report_path)?;
    report.log_summary();

    if report.has_errors() {
        tracing::error!("⚠ VALIDATION FAILED");
        tracing::info!("Possible causes:");
        tracing::info!("  - The import has not run yet or failed part-way");
        tracing::info!("  - The mongo or nightscout container is not running");
        tracing::info!("  - Credentials in the connection strings are wrong");
    } else if report.tally().warning > 0 {
        tracing::warn!("⚠ Validation passed with warnings; review {}", report_path.display());
    } else {
        tracing::info!("✅ All checks passed");
    }

    report.into_result(&report_path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_validate_with_unreachable_databases_fails_and_writes_report() {
        let dir = tempdir().unwrap();
        let report_path = dir.path().join("validation.txt");
        let plan = ValidationPlan {
            source_uri: "mongodb://127.0.0.1:9/?serverSelectionTimeoutMS=200".to_string(),
            source_db: "nightscout".to_string(),
            target_uri: "mongodb://127.0.0.1:9/?serverSelectionTimeoutMS=200".to_string(),
            target_db: "nightscout".to_string(),
            status_url: None,
            env: None,
        };

        let result = validate(&plan, &report_path).await;
        assert!(result.is_err());

        let text = std::fs::read_to_string(&report_path).unwrap();
        assert!(text.contains("[ERROR] Source database unreachable"));
        assert!(text.contains("Errors: 2"));
    }
}
