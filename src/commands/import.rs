// ABOUTME: Import command - restore a dump directory into the self-hosted MongoDB
// ABOUTME: Confirms before --drop since it discards the target's existing documents

use crate::interactive::Prompter;
use crate::migration::{self, ImportOptions};
use crate::mongodb::validate_mongodb_url;
use crate::utils::{check_required_tools, mask_connection_string};
use anyhow::{bail, Result};

/// Restore a mongodump directory into the target database
///
/// Parallelism values are handed to `mongorestore` unchanged. With `drop`
/// set, the user is asked to confirm unless running with `--yes`.
pub async fn import(options: &ImportOptions, prompter: Prompter) -> Result<()> {
    validate_mongodb_url(&options.target_uri)?;
    if options.parallel_collections == 0 || options.insertion_workers == 0 {
        bail!("--parallel and --workers must be at least 1");
    }
    check_required_tools(&["mongorestore"])?;

    if options.drop {
        let prompt = format!(
            "Drop existing collections in '{}' on {} before restoring?",
            options.database,
            mask_connection_string(&options.target_uri)
        );
        if !prompter.confirm(&prompt, false)? {
            bail!("Import cancelled by user");
        }
    }

    tracing::info!("Starting import...");
    migration::import_database(options).await?;
    tracing::info!("✅ Import complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn options() -> ImportOptions {
        ImportOptions {
            input_dir: PathBuf::from("/nonexistent/export/nightscout"),
            target_uri: "mongodb://localhost:27017/nightscout".to_string(),
            database: "nightscout".to_string(),
            drop: false,
            oplog_replay: false,
            parallel_collections: 4,
            insertion_workers: 2,
        }
    }

    #[tokio::test]
    async fn test_import_rejects_zero_workers() {
        let mut opts = options();
        opts.insertion_workers = 0;
        let err = import(&opts, Prompter::new(true)).await.unwrap_err();
        assert!(err.to_string().contains("at least 1"));
    }

    #[tokio::test]
    async fn test_import_rejects_bad_target_url() {
        let mut opts = options();
        opts.target_uri = "mysql://localhost/nightscout".to_string();
        let err = import(&opts, Prompter::new(true)).await.unwrap_err();
        assert!(err.to_string().contains("Invalid MongoDB connection string"));
    }

    #[tokio::test]
    async fn test_import_missing_tool_or_dir_fails() {
        let result = import(&options(), Prompter::new(true)).await;
        assert!(result.is_err());
    }
}
