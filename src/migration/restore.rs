// ABOUTME: Wrapper for mongorestore to import a dump into the self-hosted database
// ABOUTME: Drop, oplog replay, and parallelism flags are passed straight through

use crate::error::OpsError;
use crate::utils::mask_connection_string;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// What to import and how
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Directory produced by mongodump for one database
    pub input_dir: PathBuf,
    pub target_uri: String,
    pub database: String,
    /// Drop each collection before restoring it
    pub drop: bool,
    /// Replay the oplog captured alongside the dump
    pub oplog_replay: bool,
    pub parallel_collections: u32,
    pub insertion_workers: u32,
}

impl ImportOptions {
    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            format!("--uri={}", self.target_uri),
            format!("--nsInclude={}.*", self.database),
            format!("--numParallelCollections={}", self.parallel_collections),
            format!(
                "--numInsertionWorkersPerCollection={}",
                self.insertion_workers
            ),
        ];
        if self.drop {
            args.push("--drop".to_string());
        }
        if self.oplog_replay {
            args.push("--oplogReplay".to_string());
        }
        args.push(format!("--dir={}", self.input_dir.display()));
        args
    }
}

/// Restore a mongodump directory into the target database
///
/// The dump directory is expected to be `<out>/<database>`; mongorestore is
/// pointed at its parent so namespaces resolve as `<database>.<collection>`.
pub async fn import_database(options: &ImportOptions) -> Result<()> {
    if !options.input_dir.is_dir() {
        return Err(OpsError::missing_file(
            &options.input_dir,
            "Point --input at a directory produced by `nightscout-ops export`",
        )
        .into());
    }

    tracing::info!(
        "Restoring '{}' from {} into {} (parallel={}, workers={}, drop={}, oplog={})",
        options.database,
        options.input_dir.display(),
        mask_connection_string(&options.target_uri),
        options.parallel_collections,
        options.insertion_workers,
        options.drop,
        options.oplog_replay
    );

    let mut effective = options.clone();
    effective.input_dir = restore_root(&options.input_dir, &options.database);
    if options.oplog_replay {
        check_oplog(&effective.input_dir)?;
    }

    let status = Command::new("mongorestore")
        .args(effective.args())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to execute mongorestore. Are the MongoDB Database Tools installed?")?;

    if !status.success() {
        anyhow::bail!(
            "Data restoration failed ({}).\n\
             \n\
             Common causes:\n\
             - Duplicate key errors (data already exists; consider --drop)\n\
             - Target user lacks write privileges\n\
             - The mongo container is not running or not reachable\n\
             - Input directory is not a mongodump output directory",
            status
        );
    }

    tracing::info!("✓ Data restored successfully");
    Ok(())
}

/// Restore a gzip archive produced by `dump_archive`
pub async fn restore_archive(target_uri: &str, archive_path: &Path, drop: bool) -> Result<()> {
    tracing::info!(
        "Restoring archive {} into {}",
        archive_path.display(),
        mask_connection_string(target_uri)
    );

    let mut cmd = Command::new("mongorestore");
    cmd.arg(format!("--uri={}", target_uri))
        .arg(format!("--archive={}", archive_path.display()))
        .arg("--gzip");
    if drop {
        cmd.arg("--drop");
    }

    let output = cmd
        .output()
        .context("Failed to execute mongorestore. Are the MongoDB Database Tools installed?")?;
    if !output.status.success() {
        return Err(OpsError::command_failed("mongorestore", &output).into());
    }

    tracing::info!("✓ Archive restored");
    Ok(())
}

/// `--oplogReplay` reads the `oplog.bson` that `mongodump --oplog` writes at
/// the top of its output directory
///
/// mongodump only records an oplog for whole-instance dumps of a replica
/// set, and a per-database export never has one, so fail before
/// mongorestore does.
fn check_oplog(root: &Path) -> Result<()> {
    let oplog = root.join("oplog.bson");
    if oplog.is_file() {
        return Ok(());
    }
    Err(OpsError::missing_file(
        oplog,
        "Oplog replay needs a dump taken with `mongodump --oplog`; \
         `nightscout-ops export` dumps a single database without one, so import without --oplog",
    )
    .into())
}

/// Parent of a `<database>` dump directory, or the directory itself when it
/// already contains the database subdirectory
fn restore_root(input_dir: &Path, database: &str) -> PathBuf {
    if input_dir.join(database).is_dir() {
        return input_dir.to_path_buf();
    }
    match (input_dir.file_name(), input_dir.parent()) {
        (Some(name), Some(parent)) if name == database => parent.to_path_buf(),
        _ => input_dir.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn options(drop: bool, oplog: bool) -> ImportOptions {
        ImportOptions {
            input_dir: PathBuf::from("/data/export"),
            target_uri: "mongodb://root:pw@localhost:27017/?authSource=admin".to_string(),
            database: "nightscout".to_string(),
            drop,
            oplog_replay: oplog,
            parallel_collections: 4,
            insertion_workers: 2,
        }
    }

    #[test]
    fn test_args_pass_parallelism_through() {
        let args = options(false, false).args();
        assert!(args.contains(&"--numParallelCollections=4".to_string()));
        assert!(args.contains(&"--numInsertionWorkersPerCollection=2".to_string()));
        assert!(args.contains(&"--nsInclude=nightscout.*".to_string()));
        assert!(!args.contains(&"--drop".to_string()));
        assert!(!args.contains(&"--oplogReplay".to_string()));
        assert_eq!(args.last().unwrap(), "--dir=/data/export");
    }

    #[test]
    fn test_args_toggles() {
        let args = options(true, true).args();
        assert!(args.contains(&"--drop".to_string()));
        assert!(args.contains(&"--oplogReplay".to_string()));
    }

    #[test]
    fn test_restore_root() {
        let dir = tempdir().unwrap();
        let db_dir = dir.path().join("nightscout");
        std::fs::create_dir(&db_dir).unwrap();

        assert_eq!(restore_root(dir.path(), "nightscout"), dir.path());
        assert_eq!(restore_root(&db_dir, "nightscout"), dir.path());
        let other = dir.path().join("elsewhere");
        assert_eq!(restore_root(&other, "nightscout"), other);
    }

    #[tokio::test]
    async fn test_oplog_replay_without_oplog_fails_early() {
        let dir = tempdir().unwrap();
        let db_dir = dir.path().join("nightscout");
        std::fs::create_dir(&db_dir).unwrap();
        std::fs::write(db_dir.join("entries.bson"), b"").unwrap();

        let mut opts = options(false, true);
        opts.input_dir = db_dir;
        let err = import_database(&opts).await.unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("oplog.bson not found"), "{}", msg);
        assert!(msg.contains("import without --oplog"), "{}", msg);
    }

    #[test]
    fn test_check_oplog_accepts_recorded_oplog() {
        let dir = tempdir().unwrap();
        assert!(check_oplog(dir.path()).is_err());
        std::fs::write(dir.path().join("oplog.bson"), b"").unwrap();
        assert!(check_oplog(dir.path()).is_ok());
    }

    #[tokio::test]
    async fn test_import_missing_dir_is_precondition_error() {
        let dir = tempdir().unwrap();
        let mut opts = options(false, false);
        opts.input_dir = dir.path().join("nope");
        let err = import_database(&opts).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
