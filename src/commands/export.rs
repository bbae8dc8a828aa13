// ABOUTME: Export command - dump the Atlas database to a local directory
// ABOUTME: Optionally lets the user pick which collections to include

use crate::interactive::Prompter;
use crate::migration::{self, ExportOptions};
use crate::mongodb::{self as mongo, connect_mongodb, list_collections};
use crate::utils::check_required_tools;
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Turn an interactive pick into the `--collection` list for mongodump
///
/// An empty list means "whole database" to mongodump, so picking every
/// collection maps to it while picking none is an error.
fn collections_to_dump(picked: Vec<String>, available: &[String]) -> Result<Vec<String>> {
    if picked.is_empty() && !available.is_empty() {
        bail!("No collections selected; nothing to export");
    }
    if picked.len() == available.len() {
        return Ok(Vec::new());
    }
    Ok(picked)
}

/// Dump the source database into `output_dir`
///
/// When no collections are named and the run is interactive, the source is
/// queried for its collections and the user picks which to export. Returns
/// the directory holding the dump of the database.
///
/// # Errors
///
/// - invalid connection string
/// - no collection picked in the interactive selection
/// - `mongodump` missing from PATH
/// - any non-zero exit from `mongodump` (no retry, no partial success)
///
/// # Examples
///
/// ```no_run
/// # use nightscout_ops::commands::export;
/// # use nightscout_ops::interactive::Prompter;
/// # async fn example() -> anyhow::Result<()> {
/// let dump_dir = export(
///     "mongodb+srv://ns:pw@cluster0.abc.mongodb.net/nightscout",
///     None,
///     std::path::Path::new("./export"),
///     &[],
///     Prompter::new(true),
/// )
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn export(
    source_uri: &str,
    database: Option<&str>,
    output_dir: &Path,
    collections: &[String],
    prompter: Prompter,
) -> Result<PathBuf> {
    mongo::validate_mongodb_url(source_uri)?;
    check_required_tools(&["mongodump"])?;
    let database = mongo::resolve_database(source_uri, database).await?;

    let collections = if collections.is_empty() && prompter.is_interactive() {
        tracing::info!("Connecting to source to list collections...");
        let client = connect_mongodb(source_uri)
            .await
            .context("Failed to connect to source database")?;
        let available = list_collections(&client, &database).await?;
        let picked = prompter.select_collections(&available)?;
        collections_to_dump(picked, &available)?
    } else {
        collections.to_vec()
    };

    tracing::info!("Starting export...");
    let options = ExportOptions {
        source_uri: source_uri.to_string(),
        database,
        collections,
        output_dir: output_dir.to_path_buf(),
    };
    let dump_dir = migration::export_database(&options).await?;

    tracing::info!("✅ Export complete: {}", dump_dir.display());
    tracing::info!(
        "  Transfer it to the server (e.g. rsync -av {} host:...) if needed",
        dump_dir.display()
    );
    Ok(dump_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_export_rejects_invalid_url() {
        let dir = tempdir().unwrap();
        let err = export("postgresql://x/y", None, dir.path(), &[], Prompter::new(true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid MongoDB connection string"));
    }

    #[test]
    fn test_collection_selection() {
        let available: Vec<String> = ["entries", "treatments", "devicestatus"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let err = collections_to_dump(Vec::new(), &available).unwrap_err();
        assert!(err.to_string().contains("No collections selected"));

        assert!(collections_to_dump(available.clone(), &available)
            .unwrap()
            .is_empty());

        let some = vec!["entries".to_string()];
        assert_eq!(collections_to_dump(some.clone(), &available).unwrap(), some);
    }

    #[tokio::test]
    #[ignore]
    async fn test_export_live() {
        let source = std::env::var("TEST_SOURCE_URL").unwrap();
        let dir = tempdir().unwrap();
        let dump_dir = export(&source, Some("nightscout"), dir.path(), &[], Prompter::new(true))
            .await
            .unwrap();
        assert!(dump_dir.ends_with("nightscout"));
    }
}
