// ABOUTME: Compose commands: render the stack file, start/stop/restart, show status and logs
// ABOUTME: `up` waits for the Nightscout status endpoint before reporting success

use crate::compose::{self, Compose, ComposeFile, ComposeTemplate};
use crate::config::Settings;
use crate::envfile::EnvFile;
use anyhow::{bail, Result};

/// Write the two-service Compose file next to the env file
pub fn render(settings: &Settings, template: &ComposeTemplate, force: bool) -> Result<()> {
    let path = settings.compose_path();
    if path.exists() && !force {
        bail!("{} already exists. Use --force to overwrite it", path.display());
    }
    ComposeFile::from_template(template).write(&path)
}

/// Start the stack and wait until Nightscout answers
///
/// Refuses to start with an env file that fails validation, since a bad
/// API_SECRET makes the app exit immediately.
pub async fn up(settings: &Settings, wait: bool, pull: bool) -> Result<()> {
    let env = EnvFile::load(&settings.env_path())?;
    let env_report = env.validate();
    if env_report.has_errors() {
        env_report.log_summary();
        bail!(
            "{} has errors; fix them (see `nightscout-ops env check`) before starting",
            env.path().display()
        );
    }

    let compose = Compose::detect(&settings.compose_path())?;
    if pull {
        tracing::info!("Pulling images...");
        compose.pull()?;
    }

    tracing::info!("Starting services...");
    compose.up(&[])?;

    if wait {
        compose::wait_healthy(
            &settings.status_url(),
            settings.health_timeout(),
            settings.health_interval(),
        )
        .await?;
        tracing::info!("✅ Nightscout is up at {}", settings.app_url);
    }
    Ok(())
}

pub fn down(settings: &Settings, remove_volumes: bool) -> Result<()> {
    let compose = Compose::detect(&settings.compose_path())?;
    if remove_volumes {
        tracing::warn!("⚠ Removing volumes: the MongoDB data will be deleted");
    }
    compose.down(remove_volumes)
}

pub async fn restart(settings: &Settings, services: &[String], wait: bool) -> Result<()> {
    let compose = Compose::detect(&settings.compose_path())?;
    let services: Vec<&str> = services.iter().map(String::as_str).collect();
    compose.restart(&services)?;
    if wait {
        compose::wait_healthy(
            &settings.status_url(),
            settings.health_timeout(),
            settings.health_interval(),
        )
        .await?;
    }
    Ok(())
}

/// Print a container status table
pub fn ps(settings: &Settings) -> Result<()> {
    let compose = Compose::detect(&settings.compose_path())?;
    let containers = compose.ps()?;

    if containers.is_empty() {
        println!("No containers. Start them with: nightscout-ops compose up");
        return Ok(());
    }

    println!();
    println!("{:<22} {:<12} {:<10} {:<10} {}", "Container", "Service", "State", "Health", "Status");
    println!("{}", "─".repeat(72));
    for c in &containers {
        println!(
            "{:<22} {:<12} {:<10} {:<10} {}",
            c.name,
            c.service,
            c.state,
            if c.health.is_empty() { "-" } else { c.health.as_str() },
            c.status
        );
    }
    println!();
    Ok(())
}

pub fn logs(settings: &Settings, service: Option<&str>, tail: u32, follow: bool) -> Result<()> {
    Compose::detect(&settings.compose_path())?.logs(service, tail, follow)
}
