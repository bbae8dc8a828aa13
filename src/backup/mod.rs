// ABOUTME: Timestamped MongoDB backups with optional encryption and checksums
// ABOUTME: Creates, lists, prunes by retention window, and restores archive backups

use crate::error::OpsError;
use crate::migration::{dump_archive, restore_archive};
use crate::utils::check_required_tools;
use anyhow::{bail, Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime, TimeZone};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const PREFIX: &str = "nightscout-";
const ARCHIVE_SUFFIX: &str = ".archive.gz";
const ENCRYPTED_SUFFIX: &str = ".enc";
const CHECKSUM_SUFFIX: &str = ".sha256";
const PARTIAL_SUFFIX: &str = ".partial";
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// One backup file on disk
#[derive(Debug, Clone, PartialEq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub created_at: NaiveDateTime,
    pub encrypted: bool,
}

impl BackupArtifact {
    /// Recognise `nightscout-<timestamp>.archive.gz[.enc]`
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let rest = name.strip_prefix(PREFIX)?;
        let (rest, encrypted) = match rest.strip_suffix(ENCRYPTED_SUFFIX) {
            Some(r) => (r, true),
            None => (rest, false),
        };
        let stamp = rest.strip_suffix(ARCHIVE_SUFFIX)?;
        let created_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;
        Some(Self {
            path: path.to_path_buf(),
            created_at,
            encrypted,
        })
    }

    pub fn checksum_path(&self) -> PathBuf {
        sidecar(&self.path)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn sidecar(path: &Path) -> PathBuf {
    with_suffix(path, CHECKSUM_SUFFIX)
}

/// Best-effort removal of a file that must not survive a failed step
fn discard(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!("⚠ Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Move a finished `.partial` file into place, or delete it if the step
/// that wrote it failed
///
/// Partial names never match [`BackupArtifact::from_path`], so an
/// interrupted write is invisible to listing, pruning, and restore.
fn commit_partial(partial: &Path, target: &Path, outcome: Result<()>) -> Result<()> {
    if let Err(e) = outcome {
        discard(partial);
        return Err(e);
    }
    std::fs::rename(partial, target).with_context(|| {
        format!(
            "Failed to move {} to {}",
            partial.display(),
            target.display()
        )
    })
}

pub fn archive_name(at: NaiveDateTime) -> String {
    format!("{}{}{}", PREFIX, at.format(TIMESTAMP_FORMAT), ARCHIVE_SUFFIX)
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Write `<hash>  <file name>` next to the backup
pub fn write_checksum(path: &Path) -> Result<String> {
    let hash = sha256_file(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    std::fs::write(sidecar(path), format!("{}  {}\n", hash, name))
        .with_context(|| format!("Failed to write checksum for {}", path.display()))?;
    Ok(hash)
}

/// Compare a backup against its sidecar; a missing sidecar is an error
pub fn verify_checksum(path: &Path) -> Result<()> {
    let sidecar = sidecar(path);
    let recorded = std::fs::read_to_string(&sidecar)
        .with_context(|| format!("Failed to read checksum file {}", sidecar.display()))?;
    let expected = recorded.split_whitespace().next().unwrap_or_default();
    let actual = sha256_file(path)?;
    if expected != actual {
        bail!(
            "Checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
    }
    Ok(())
}

fn passphrase(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(p) if !p.is_empty() => Ok(p),
        _ => bail!(
            "Encryption requested but ${} is not set.\n\
             Export the passphrase first, e.g. `export {}=...`",
            env_var,
            env_var
        ),
    }
}

fn run_openssl(args: &[&str], passphrase_env: &str, passphrase: &str) -> Result<()> {
    let output = Command::new("openssl")
        .args(args)
        .arg("-pass")
        .arg(format!("env:{}", passphrase_env))
        .env(passphrase_env, passphrase)
        .output()
        .context("Failed to execute openssl")?;
    if !output.status.success() {
        return Err(OpsError::command_failed("openssl", &output).into());
    }
    Ok(())
}

/// AES-256-CBC encrypt `input` to `output` with a PBKDF2-derived key
pub fn encrypt_file(input: &Path, output: &Path, passphrase_env: &str) -> Result<()> {
    let pass = passphrase(passphrase_env)?;
    run_openssl(
        &[
            "enc",
            "-aes-256-cbc",
            "-pbkdf2",
            "-salt",
            "-in",
            &input.display().to_string(),
            "-out",
            &output.display().to_string(),
        ],
        passphrase_env,
        &pass,
    )
}

pub fn decrypt_file(input: &Path, output: &Path, passphrase_env: &str) -> Result<()> {
    let pass = passphrase(passphrase_env)?;
    run_openssl(
        &[
            "enc",
            "-d",
            "-aes-256-cbc",
            "-pbkdf2",
            "-in",
            &input.display().to_string(),
            "-out",
            &output.display().to_string(),
        ],
        passphrase_env,
        &pass,
    )
}

/// Options for a new backup
#[derive(Debug, Clone)]
pub struct BackupOptions {
    pub source_uri: String,
    pub database: String,
    pub directory: PathBuf,
    pub encrypt: bool,
    pub passphrase_env: String,
}

/// Encrypt a finished archive to `<archive>.enc` and delete the plaintext
///
/// The plaintext is deleted whether or not encryption succeeds, so a failed
/// run never leaves an unencrypted copy behind when one was not asked for.
fn encrypt_archive(archive: &Path, passphrase_env: &str) -> Result<PathBuf> {
    let encrypted = with_suffix(archive, ENCRYPTED_SUFFIX);
    let partial = with_suffix(&encrypted, PARTIAL_SUFFIX);

    let outcome = encrypt_file(archive, &partial, passphrase_env);
    let committed = commit_partial(&partial, &encrypted, outcome);
    let removed = std::fs::remove_file(archive)
        .with_context(|| format!("Failed to remove plaintext {}", archive.display()));
    committed?;
    removed?;
    Ok(encrypted)
}

/// Dump the database to a timestamped archive, optionally encrypt it, and
/// record its checksum
///
/// The dump is written under a `.partial` name and renamed once mongodump
/// succeeds; a failed run leaves no file that looks like a backup.
pub async fn create_backup(options: &BackupOptions) -> Result<BackupArtifact> {
    let mut tools = vec!["mongodump"];
    if options.encrypt {
        tools.push("openssl");
        // Fail before dumping rather than after
        passphrase(&options.passphrase_env)?;
    }
    check_required_tools(&tools)?;

    std::fs::create_dir_all(&options.directory)
        .with_context(|| format!("Failed to create {}", options.directory.display()))?;

    let created_at = Local::now().naive_local();
    let archive = options.directory.join(archive_name(created_at));
    let partial = with_suffix(&archive, PARTIAL_SUFFIX);
    let outcome = dump_archive(&options.source_uri, &options.database, &partial).await;
    commit_partial(&partial, &archive, outcome)?;

    let final_path = if options.encrypt {
        let encrypted = encrypt_archive(&archive, &options.passphrase_env)?;
        tracing::info!("✓ Backup encrypted");
        encrypted
    } else {
        archive
    };

    let hash = write_checksum(&final_path)?;
    tracing::info!("✓ Backup written to {} (sha256 {})", final_path.display(), &hash[..12]);

    BackupArtifact::from_path(&final_path)
        .context("Backup file name does not match the expected pattern")
}

/// Backups in a directory, newest first
pub fn list_backups(directory: &Path) -> Result<Vec<BackupArtifact>> {
    if !directory.exists() {
        return Ok(Vec::new());
    }
    let mut backups = Vec::new();
    for entry in std::fs::read_dir(directory)
        .with_context(|| format!("Failed to read {}", directory.display()))?
    {
        if let Some(artifact) = BackupArtifact::from_path(&entry?.path()) {
            backups.push(artifact);
        }
    }
    backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(backups)
}

/// Delete backups (and their checksum files) older than `retention_days`
///
/// # Arguments
///
/// * `directory` - Backup directory to scan
/// * `retention_days` - Age limit relative to `now`; 0 removes every older backup
/// * `now` - Reference time, usually the local clock
/// * `keep` - A backup that is never removed, such as the one just created
///
/// # Returns
///
/// The removed backup paths. A window reaching past the earliest
/// representable date removes nothing.
pub fn prune_backups(
    directory: &Path,
    retention_days: u32,
    now: NaiveDateTime,
    keep: Option<&Path>,
) -> Result<Vec<PathBuf>> {
    let window = ChronoDuration::days(i64::from(retention_days));
    let Some(cutoff) = now.checked_sub_signed(window) else {
        tracing::debug!("Retention of {} days keeps every backup", retention_days);
        return Ok(Vec::new());
    };
    let mut removed = Vec::new();

    for backup in list_backups(directory)? {
        if backup.created_at >= cutoff || keep == Some(backup.path.as_path()) {
            continue;
        }
        std::fs::remove_file(&backup.path)
            .with_context(|| format!("Failed to remove {}", backup.path.display()))?;
        let checksum = backup.checksum_path();
        if checksum.exists() {
            std::fs::remove_file(&checksum)
                .with_context(|| format!("Failed to remove {}", checksum.display()))?;
        }
        tracing::info!("  Removed {}", backup.path.display());
        removed.push(backup.path);
    }

    Ok(removed)
}

/// Verify, decrypt if needed, and restore a backup into the target
pub async fn restore_backup(
    backup: &BackupArtifact,
    target_uri: &str,
    drop: bool,
    passphrase_env: &str,
) -> Result<()> {
    check_required_tools(&["mongorestore"])?;

    if backup.checksum_path().exists() {
        verify_checksum(&backup.path)?;
        tracing::info!("✓ Checksum verified");
    } else {
        tracing::warn!("⚠ No checksum file for {}, skipping verification", backup.path.display());
    }

    if backup.encrypted {
        check_required_tools(&["openssl"])?;
        // TempDir cleans up the decrypted archive on drop, even on error
        let temp_dir = TempDir::new().context("Failed to create temp directory")?;
        let plain = temp_dir.path().join("restore.archive.gz");
        decrypt_file(&backup.path, &plain, passphrase_env)?;
        restore_archive(target_uri, &plain, drop).await
    } else {
        restore_archive(target_uri, &backup.path, drop).await
    }
}

/// Local time of a backup, for display
pub fn display_time(created_at: NaiveDateTime) -> String {
    match Local.from_local_datetime(&created_at).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    }
}
