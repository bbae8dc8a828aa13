// ABOUTME: Validation of a migrated deployment and of local configuration
// ABOUTME: Runs the fixed checklist and produces a tallied ValidationReport

pub mod checks;
pub mod report;

pub use report::{CheckResult, CheckStatus, Tally, ValidationReport};

use crate::envfile::EnvFile;
use crate::mongodb::NIGHTSCOUT_COLLECTIONS;

/// Inputs of one migration validation run
#[derive(Debug, Clone)]
pub struct ValidationPlan {
    pub source_uri: String,
    pub source_db: String,
    pub target_uri: String,
    pub target_db: String,
    /// Nightscout status URL; skipped when None
    pub status_url: Option<String>,
    pub env: Option<EnvFile>,
}

/// Run the migration checklist in order
///
/// 1. Ping source and target
/// 2. Compare document counts of the Nightscout collections
/// 3. Authentication heuristics
/// 4. HTTP status of the running application
///
/// Count comparison is skipped when either side is unreachable; the
/// connectivity error already fails the run.
pub async fn validate_migration(plan: &ValidationPlan) -> ValidationReport {
    let mut report = ValidationReport::new("Nightscout Migration Validation");

    tracing::info!("Checking connectivity...");
    let source = checks::check_connectivity(&mut report, "Source", &plan.source_uri).await;
    let target = checks::check_connectivity(&mut report, "Target", &plan.target_uri).await;

    if let (Some(source), Some(target)) = (&source, &target) {
        tracing::info!("Comparing document counts...");
        checks::compare_collection_counts(
            &mut report,
            source,
            &plan.source_db,
            target,
            &plan.target_db,
            NIGHTSCOUT_COLLECTIONS,
        )
        .await;
    }

    tracing::info!("Checking authentication settings...");
    checks::check_auth(&mut report, &plan.target_uri, plan.env.as_ref());

    if let Some(url) = &plan.status_url {
        tracing::info!("Checking application status...");
        checks::check_http(&mut report, url).await;
    }

    report
}
