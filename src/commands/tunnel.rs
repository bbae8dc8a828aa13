// ABOUTME: Tunnel commands: set up a Cloudflare tunnel for the Nightscout domain, run, inspect, delete
// ABOUTME: Setup is idempotent - an existing tunnel and DNS record are reused

use crate::config::Settings;
use crate::envfile::EnvFile;
use crate::interactive::Prompter;
use crate::tunnel::{self, TunnelConfig};
use crate::utils::check_required_tools;
use anyhow::{bail, Result};

/// Log in, create or reuse the tunnel, route DNS, write the config, and
/// point BASE_URL at the public domain
pub fn setup(
    settings: &Settings,
    domain: Option<&str>,
    prompter: Prompter,
) -> Result<TunnelConfig> {
    let domain = prompter.text(
        "Public hostname for Nightscout",
        domain.or(settings.tunnel.domain.as_deref()),
        None,
    )?;
    if domain.contains("://") || domain.contains('/') {
        bail!("Expected a bare hostname such as ns.example.org, got '{}'", domain);
    }
    check_required_tools(&["cloudflared"])?;
    let name = &settings.tunnel.name;

    tracing::info!("Step 1/4: Cloudflare login...");
    tunnel::login()?;

    tracing::info!("Step 2/4: Creating tunnel '{}'...", name);
    let info = tunnel::ensure_tunnel(name)?;

    tracing::info!("Step 3/4: Routing {}...", domain);
    tunnel::route_dns(name, &domain)?;

    tracing::info!("Step 4/4: Writing config...");
    let config = TunnelConfig::new(
        &info.id,
        &domain,
        tunnel::default_credentials_file(&info.id)?,
        &settings.app_url,
    );
    config.write(&settings.tunnel_config_path())?;

    let env_path = settings.env_path();
    if env_path.exists() {
        let mut env = EnvFile::load(&env_path)?;
        if env.set("BASE_URL", &format!("https://{}", domain))? {
            env.save()?;
            tracing::info!("✓ BASE_URL set to https://{}", domain);
        }
    }

    tracing::info!("✅ Tunnel ready. Start it with: nightscout-ops tunnel run");
    Ok(config)
}

pub fn run(settings: &Settings) -> Result<()> {
    tunnel::run(&settings.tunnel_config_path(), &settings.tunnel.name)
}

pub fn info(settings: &Settings) -> Result<()> {
    tunnel::info(&settings.tunnel.name)
}

pub fn delete(settings: &Settings, prompter: Prompter) -> Result<()> {
    let prompt = format!(
        "Delete tunnel '{}'? Nightscout will no longer be reachable through it",
        settings.tunnel.name
    );
    if !prompter.confirm(&prompt, false)? {
        bail!("Delete cancelled by user");
    }
    tunnel::delete(&settings.tunnel.name)?;

    let config_path = settings.tunnel_config_path();
    if config_path.exists() {
        std::fs::remove_file(&config_path)?;
        tracing::info!("✓ Removed {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_rejects_url_as_domain() {
        let err = setup(
            &Settings::default(),
            Some("https://ns.example.org"),
            Prompter::new(true),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bare hostname"));
    }

    #[test]
    fn test_run_looks_for_config_under_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            project_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let err = run(&settings).unwrap_err();
        let expected = dir.path().join("cloudflared/config.yml");
        assert!(err.to_string().contains(&expected.display().to_string()), "{}", err);
    }

    #[test]
    fn test_setup_without_domain_non_interactive_fails() {
        let result = setup(&Settings::default(), None, Prompter::new(true));
        assert!(result.is_err());
    }
}
