// ABOUTME: Wrapper for mongodump to export a database to a directory or archive
// ABOUTME: One BSON file per collection; a failing dump aborts the run

use crate::error::OpsError;
use crate::utils::mask_connection_string;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// What to export and where
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub source_uri: String,
    pub database: String,
    /// Restrict the dump to these collections; empty means all
    pub collections: Vec<String>,
    pub output_dir: PathBuf,
}

impl ExportOptions {
    /// Build the mongodump argument list
    ///
    /// mongodump only accepts a single --collection, so a multi-collection
    /// restriction is expressed as one run per collection by the caller.
    pub fn args_for(&self, collection: Option<&str>) -> Vec<String> {
        let mut args = vec![
            format!("--uri={}", self.source_uri),
            format!("--db={}", self.database),
            format!("--out={}", self.output_dir.display()),
        ];
        if let Some(collection) = collection {
            args.push(format!("--collection={}", collection));
        }
        args
    }
}

/// Export a database with mongodump into `<output_dir>/<database>/`
///
/// # Returns
///
/// The directory holding the per-collection files.
///
/// # Errors
///
/// Fails on the first non-zero mongodump exit; earlier collections stay on
/// disk and a re-run overwrites them.
pub async fn export_database(options: &ExportOptions) -> Result<PathBuf> {
    tracing::info!(
        "Dumping database '{}' from {} to {}",
        options.database,
        mask_connection_string(&options.source_uri),
        options.output_dir.display()
    );

    std::fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("Failed to create {}", options.output_dir.display()))?;

    if options.collections.is_empty() {
        run_mongodump(&options.args_for(None))?;
    } else {
        for collection in &options.collections {
            tracing::info!("  Dumping collection '{}'...", collection);
            run_mongodump(&options.args_for(Some(collection)))?;
        }
    }

    let dump_dir = options.output_dir.join(&options.database);
    let files = dumped_collections(&dump_dir)?;
    tracing::info!(
        "✓ Dumped {} collection(s) to {}",
        files.len(),
        dump_dir.display()
    );
    Ok(dump_dir)
}

/// Dump a whole database into a single gzip archive file
///
/// # Arguments
///
/// * `source_uri` - Connection string of the database to dump
/// * `database` - Database name passed as `--db`
/// * `archive_path` - File written by `--archive`; the caller owns cleanup on failure
pub async fn dump_archive(
    source_uri: &str,
    database: &str,
    archive_path: &Path,
) -> Result<()> {
    tracing::info!(
        "Dumping database '{}' to archive {}",
        database,
        archive_path.display()
    );

    run_mongodump(&[
        format!("--uri={}", source_uri),
        format!("--db={}", database),
        format!("--archive={}", archive_path.display()),
        "--gzip".to_string(),
    ])?;

    tracing::info!("✓ Archive written");
    Ok(())
}

fn run_mongodump(args: &[String]) -> Result<()> {
    tracing::debug!("Running mongodump with {} argument(s)", args.len());

    let output = Command::new("mongodump")
        .args(args)
        .output()
        .context("Failed to execute mongodump. Are the MongoDB Database Tools installed?")?;

    if !output.status.success() {
        return Err(OpsError::command_failed("mongodump", &output).into());
    }
    Ok(())
}

/// Collection names present in a dump directory (from `<name>.bson` files)
pub fn dumped_collections(dump_dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let entries = std::fs::read_dir(dump_dir)
        .with_context(|| format!("Failed to read dump directory {}", dump_dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("bson") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options() -> ExportOptions {
        ExportOptions {
            source_uri: "mongodb+srv://ns:pw@cluster0.abc.mongodb.net".to_string(),
            database: "nightscout".to_string(),
            collections: Vec::new(),
            output_dir: PathBuf::from("/tmp/export"),
        }
    }

    #[test]
    fn test_args_for_whole_database() {
        assert_eq!(
            options().args_for(None),
            vec![
                "--uri=mongodb+srv://ns:pw@cluster0.abc.mongodb.net",
                "--db=nightscout",
                "--out=/tmp/export",
            ]
        );
    }

    #[test]
    fn test_args_for_single_collection() {
        let args = options().args_for(Some("entries"));
        assert_eq!(args.last().unwrap(), "--collection=entries");
    }

    #[test]
    fn test_dumped_collections_reads_bson_files() {
        let dir = tempdir().unwrap();
        for file in ["entries.bson", "entries.metadata.json", "treatments.bson", "notes.txt"] {
            std::fs::write(dir.path().join(file), b"").unwrap();
        }
        let names = dumped_collections(dir.path()).unwrap();
        assert_eq!(names, vec!["entries", "treatments"]);
    }

    #[test]
    fn test_dumped_collections_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(dumped_collections(&dir.path().join("absent")).is_err());
    }

    #[tokio::test]
    #[ignore]
    async fn test_export_database_live() {
        let url = std::env::var("TEST_SOURCE_URL").unwrap();
        let dir = tempdir().unwrap();
        let opts = ExportOptions {
            source_uri: url,
            database: "nightscout".to_string(),
            collections: Vec::new(),
            output_dir: dir.path().to_path_buf(),
        };

        let dump_dir = export_database(&opts).await.unwrap();
        assert!(dump_dir.exists());
    }
}
