// ABOUTME: Backup commands: create, list, prune by retention, and restore
// ABOUTME: Creating a backup prunes old ones afterwards when a retention window is set

use crate::backup::{self, display_time, BackupOptions};
use crate::config::Settings;
use crate::interactive::Prompter;
use anyhow::{bail, Result};
use chrono::Local;
use std::path::{Path, PathBuf};

/// Dump, optionally encrypt, checksum, then apply retention
pub async fn create(
    settings: &Settings,
    source_uri: &str,
    database: &str,
    encrypt: bool,
    retention_days: Option<u32>,
) -> Result<PathBuf> {
    let options = BackupOptions {
        source_uri: source_uri.to_string(),
        database: database.to_string(),
        directory: settings.backup_dir(),
        encrypt,
        passphrase_env: settings.backup.passphrase_env.clone(),
    };

    tracing::info!("Creating backup of '{}'...", database);
    let artifact = backup::create_backup(&options).await?;

    let retention = retention_days.unwrap_or(settings.backup.retention_days);
    apply_retention(&options.directory, retention, Some(artifact.path.as_path()))?;

    tracing::info!("✅ Backup complete");
    Ok(artifact.path)
}

pub fn list(directory: &Path) -> Result<()> {
    let backups = backup::list_backups(directory)?;
    if backups.is_empty() {
        println!("No backups in {}", directory.display());
        return Ok(());
    }

    println!();
    println!("{:<21} {:<10} {}", "Created", "Encrypted", "File");
    println!("{}", "─".repeat(72));
    for b in &backups {
        println!(
            "{:<21} {:<10} {}",
            display_time(b.created_at),
            if b.encrypted { "yes" } else { "no" },
            b.path.display()
        );
    }
    println!();
    Ok(())
}

pub fn prune(directory: &Path, retention_days: u32) -> Result<usize> {
    apply_retention(directory, retention_days, None)
}

/// Prune against the local clock, sparing `keep`; returns how many were removed
fn apply_retention(directory: &Path, retention_days: u32, keep: Option<&Path>) -> Result<usize> {
    tracing::info!("Pruning backups older than {} day(s)...", retention_days);
    let now = Local::now().naive_local();
    let removed = backup::prune_backups(directory, retention_days, now, keep)?;
    tracing::info!("✓ Removed {} old backup(s)", removed.len());
    Ok(removed.len())
}

/// Restore a named backup file or, if none is given, one picked from the list
pub async fn restore(
    settings: &Settings,
    target_uri: &str,
    file: Option<&Path>,
    drop: bool,
    prompter: Prompter,
) -> Result<()> {
    let backups = backup::list_backups(&settings.backup_dir())?;

    let chosen = match file {
        Some(path) => match backup::BackupArtifact::from_path(path) {
            Some(artifact) => artifact,
            None => bail!(
                "{} is not a nightscout-ops backup \
                 (expected nightscout-<timestamp>.archive.gz[.enc])",
                path.display()
            ),
        },
        None => prompter.select_backup(&backups)?.clone(),
    };

    if !chosen.path.exists() {
        return Err(crate::error::OpsError::missing_file(
            &chosen.path,
            "List available backups with `nightscout-ops backup list`",
        )
        .into());
    }

    let prompt = format!(
        "Restore {} into the target database{}?",
        chosen.path.display(),
        if drop { " (dropping existing collections)" } else { "" }
    );
    if !prompter.confirm(&prompt, false)? {
        bail!("Restore cancelled by user");
    }

    backup::restore_backup(&chosen, target_uri, drop, &settings.backup.passphrase_env).await?;
    tracing::info!("✅ Restore complete");
    Ok(())
}
