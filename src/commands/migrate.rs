// ABOUTME: Migrate command - the full Atlas to self-hosted pipeline
// ABOUTME: Export, import, start the app, validate, and optionally set up the tunnel

use crate::commands::{self, compose as compose_cmd};
use crate::compose::{Compose, DB_SERVICE};
use crate::config::Settings;
use crate::envfile::EnvFile;
use crate::interactive::Prompter;
use crate::migration::ImportOptions;
use crate::mongodb::{self as mongo, connect_mongodb};
use crate::utils::{check_required_tools, mask_connection_string, wait_for};
use crate::validation::{ValidationPlan, ValidationReport};
use anyhow::{Context, Result};
use std::path::PathBuf;

/// Everything one migration run needs, resolved up front
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub source_uri: String,
    /// Defaults to the database in the source URI
    pub source_db: Option<String>,
    pub target_uri: String,
    pub work_dir: PathBuf,
    pub drop: bool,
    pub oplog_replay: bool,
    pub parallel_collections: u32,
    pub insertion_workers: u32,
    pub report_path: PathBuf,
    pub setup_tunnel: bool,
    pub domain: Option<String>,
}

const TOTAL_STEPS: usize = 6;

fn step(n: usize, title: &str) {
    tracing::info!("");
    tracing::info!("Step {}/{}: {}", n, TOTAL_STEPS, title);
}

/// Run the migration pipeline with a prompt before each step
///
/// Steps:
/// 1. Start the database container and wait for it to accept connections
/// 2. Export from the source with mongodump
/// 3. Import into the target with mongorestore
/// 4. Start Nightscout and wait for its status endpoint
/// 5. Validate source against target and write the report
/// 6. Set up the Cloudflare tunnel (only with `setup_tunnel`)
///
/// Declining a step skips it; any failing step aborts the run. Nothing is
/// rolled back. Re-running repeats every step.
pub async fn migrate(
    settings: &Settings,
    plan: &MigrationPlan,
    prompter: Prompter,
) -> Result<ValidationReport> {
    mongo::validate_mongodb_url(&plan.source_uri)?;
    mongo::validate_mongodb_url(&plan.target_uri)?;
    check_required_tools(&["mongodump", "mongorestore"])?;

    let source_db = mongo::resolve_database(&plan.source_uri, plan.source_db.as_deref()).await?;
    // mongorestore keeps namespaces, so the target database carries the source name
    let target_db = source_db.clone();
    if settings.mongo.database != source_db {
        tracing::warn!(
            "⚠ Source database '{}' differs from configured '{}'",
            source_db,
            settings.mongo.database
        );
        tracing::warn!("  Nightscout's MONGO_CONNECTION must name '{}'", source_db);
    }

    tracing::info!("Starting migration");
    tracing::info!(
        "  Source: {} (db '{}')",
        mask_connection_string(&plan.source_uri),
        source_db
    );
    tracing::info!(
        "  Target: {} (db '{}')",
        mask_connection_string(&plan.target_uri),
        target_db
    );

    let compose_path = settings.compose_path();
    let compose = if compose_path.exists() {
        Some(Compose::detect(&compose_path)?)
    } else {
        tracing::warn!(
            "⚠ {} not found; container steps will be skipped",
            compose_path.display()
        );
        None
    };

    step(1, "Start the database container");
    if let Some(compose) = &compose {
        if prompter.confirm("Start the MongoDB container?", true)? {
            compose.up(&[DB_SERVICE])?;
            let target_uri = plan.target_uri.clone();
            wait_for(
                "MongoDB",
                settings.health_timeout(),
                settings.health_interval(),
                || {
                    let uri = target_uri.clone();
                    async move { connect_mongodb(&uri).await.is_ok() }
                },
            )
            .await?;
        }
    }

    step(2, "Export from the source");
    let dump_dir = plan.work_dir.join(&source_db);
    if prompter.confirm("Export the source database now?", true)? {
        commands::export(
            &plan.source_uri,
            Some(&source_db),
            &plan.work_dir,
            &[],
            prompter,
        )
        .await?;
    } else if !dump_dir.is_dir() {
        anyhow::bail!(
            "Export skipped but no previous dump exists at {}",
            dump_dir.display()
        );
    } else {
        tracing::info!("  Reusing existing dump at {}", dump_dir.display());
    }

    step(3, "Import into the target");
    if prompter.confirm("Import the dump into the target database?", true)? {
        let options = ImportOptions {
            input_dir: dump_dir.clone(),
            target_uri: plan.target_uri.clone(),
            database: source_db.clone(),
            drop: plan.drop,
            oplog_replay: plan.oplog_replay,
            parallel_collections: plan.parallel_collections,
            insertion_workers: plan.insertion_workers,
        };
        commands::import(&options, prompter).await?;
    }

    step(4, "Start Nightscout");
    let start_app = compose.is_some()
        && prompter.confirm("Start Nightscout and wait until it is healthy?", true)?;
    if start_app {
        compose_cmd::up(settings, true, false).await?;
    }

    step(5, "Validate");
    let env = if settings.env_path().exists() {
        Some(EnvFile::load(&settings.env_path())?)
    } else {
        None
    };
    let validation = ValidationPlan {
        source_uri: plan.source_uri.clone(),
        source_db: source_db.clone(),
        target_uri: plan.target_uri.clone(),
        target_db,
        status_url: compose.as_ref().map(|_| settings.status_url()),
        env,
    };
    let report = commands::validate(&validation, &plan.report_path).await?;

    step(6, "Cloudflare tunnel");
    if plan.setup_tunnel {
        if prompter.confirm("Set up the Cloudflare tunnel now?", true)? {
            commands::tunnel::setup(settings, plan.domain.as_deref(), prompter)
                .context("Tunnel setup failed; the migrated data is unaffected")?;
        }
    } else {
        tracing::info!("  Skipped (pass --tunnel to include it)");
    }

    tracing::info!("");
    tracing::info!("✅ Migration complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_migrate_rejects_bad_source_url() {
        let dir = tempdir().unwrap();
        let plan = MigrationPlan {
            source_uri: "postgres://nope".to_string(),
            source_db: None,
            target_uri: "mongodb://localhost:27017".to_string(),
            work_dir: dir.path().to_path_buf(),
            drop: false,
            oplog_replay: false,
            parallel_collections: 4,
            insertion_workers: 2,
            report_path: dir.path().join("report.txt"),
            setup_tunnel: false,
            domain: None,
        };
        let err = migrate(&Settings::default(), &plan, Prompter::new(true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid MongoDB connection string"));
    }
}
