// ABOUTME: Env file commands: create from template, check, get/set keys, rotate the API secret
// ABOUTME: All mutations are in-place line substitutions that keep the rest of the file intact

use crate::config::Settings;
use crate::envfile::{generate_secret, EnvFile};
use crate::validation::ValidationReport;
use anyhow::{bail, Result};
use std::path::Path;

/// Create the env file from the template with fresh secrets
///
/// Refuses to overwrite an existing file unless `force` is set, so that a
/// re-run never silently rotates the database password of a live install.
pub fn init(settings: &Settings, domain: Option<&str>, force: bool) -> Result<()> {
    let path = settings.env_path();
    if path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite it, or `env set` to change single keys",
            path.display()
        );
    }

    let env = EnvFile::from_template(&path, domain.or(settings.tunnel.domain.as_deref()))?;
    env.save()?;

    tracing::info!("✓ Created {}", path.display());
    tracing::info!("  API_SECRET and MongoDB password were generated");
    if domain.is_none() && settings.tunnel.domain.is_none() {
        tracing::info!(
            "  Set BASE_URL with: nightscout-ops env set BASE_URL https://<your domain>"
        );
    }
    Ok(())
}

/// Validate the env file, optionally writing the report
pub fn check(settings: &Settings, report_path: Option<&Path>) -> Result<ValidationReport> {
    let env = EnvFile::load(&settings.env_path())?;
    tracing::info!("Checking {}...", env.path().display());

    let report = env.validate();
    report.log_summary();

    let location = match report_path {
        Some(path) => {
            report.write_to(path)?;
            path.display().to_string()
        }
        None => "the log output above".to_string(),
    };
    report.into_result(&location)
}

pub fn set(settings: &Settings, key: &str, value: &str) -> Result<()> {
    if key.is_empty() || key.contains('=') || key.contains(char::is_whitespace) {
        bail!("Invalid env key '{}'", key);
    }
    let mut env = EnvFile::load(&settings.env_path())?;
    if env.set(key, value)? {
        env.save()?;
        tracing::info!("✓ Updated {}", key);
    } else {
        tracing::info!("✓ {} already has that value, file unchanged", key);
    }
    Ok(())
}

pub fn get(settings: &Settings, key: &str) -> Result<String> {
    let env = EnvFile::load(&settings.env_path())?;
    match env.get(key) {
        Some(value) => Ok(value.to_string()),
        None => bail!("{} is not set in {}", key, env.path().display()),
    }
}

/// Replace API_SECRET with a new random value; returns the new secret
///
/// The running app only picks it up after a restart.
pub fn rotate_secret(settings: &Settings, length: usize) -> Result<String> {
    if length < crate::envfile::MIN_API_SECRET_LEN {
        bail!(
            "Secret length {} is below Nightscout's minimum of {}",
            length,
            crate::envfile::MIN_API_SECRET_LEN
        );
    }
    let secret = generate_secret(length);
    set(settings, "API_SECRET", &secret)?;
    tracing::info!("  Restart the app to apply: nightscout-ops compose restart nightscout");
    Ok(secret)
}
