// ABOUTME: Cloudflare Tunnel lifecycle via cloudflared and its YAML config
// ABOUTME: Creates or reuses a named tunnel, routes DNS, writes config, runs and deletes it

use crate::error::OpsError;
use crate::utils::check_required_tools;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// The YAML file cloudflared reads with `--config`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TunnelConfig {
    pub tunnel: String,
    #[serde(rename = "credentials-file")]
    pub credentials_file: PathBuf,
    pub ingress: Vec<IngressRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngressRule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub service: String,
}

impl TunnelConfig {
    /// Route `domain` to the local service; everything else gets a 404
    pub fn new(
        tunnel_id: &str,
        domain: &str,
        credentials_file: PathBuf,
        service_url: &str,
    ) -> Self {
        Self {
            tunnel: tunnel_id.to_string(),
            credentials_file,
            ingress: vec![
                IngressRule {
                    hostname: Some(domain.to_string()),
                    service: service_url.to_string(),
                },
                IngressRule {
                    hostname: None,
                    service: "http_status:404".to_string(),
                },
            ],
        }
    }

    pub fn domain(&self) -> Option<&str> {
        self.ingress.iter().find_map(|r| r.hostname.as_deref())
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize tunnel config")
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.to_yaml()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("✓ Wrote tunnel config {}", path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// One entry of `cloudflared tunnel list --output json`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TunnelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub connections: Vec<serde_json::Value>,
}

pub fn parse_tunnel_list(stdout: &str) -> Result<Vec<TunnelInfo>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Vec::new());
    }
    serde_json::from_str(trimmed).context("Failed to parse cloudflared tunnel list output")
}

/// Directory where cloudflared keeps cert.pem and tunnel credentials
pub fn cloudflared_home() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".cloudflared"))
}

pub fn default_credentials_file(tunnel_id: &str) -> Result<PathBuf> {
    Ok(cloudflared_home()?.join(format!("{}.json", tunnel_id)))
}

fn cloudflared(args: &[&str]) -> Result<String> {
    tracing::debug!("Running: cloudflared {}", args.join(" "));
    let output = Command::new("cloudflared")
        .args(args)
        .output()
        .context("Failed to execute cloudflared")?;
    if !output.status.success() {
        return Err(OpsError::command_failed("cloudflared", &output).into());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn cloudflared_interactive(args: &[&str]) -> Result<()> {
    let status = Command::new("cloudflared")
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("Failed to execute cloudflared")?;
    if !status.success() {
        bail!("cloudflared {} exited with {}", args.join(" "), status);
    }
    Ok(())
}

/// Browser login; writes cert.pem unless it already exists
pub fn login() -> Result<()> {
    check_required_tools(&["cloudflared"])?;
    let cert = cloudflared_home()?.join("cert.pem");
    if cert.exists() {
        tracing::info!("✓ Already logged in ({} exists)", cert.display());
        return Ok(());
    }
    tracing::info!("Opening the Cloudflare login flow...");
    cloudflared_interactive(&["tunnel", "login"])
}

pub fn list_tunnels() -> Result<Vec<TunnelInfo>> {
    parse_tunnel_list(&cloudflared(&["tunnel", "list", "--output", "json"])?)
}

/// Return the named tunnel, creating it first if it does not exist
pub fn ensure_tunnel(name: &str) -> Result<TunnelInfo> {
    if let Some(existing) = list_tunnels()?.into_iter().find(|t| t.name == name) {
        tracing::info!("✓ Reusing tunnel '{}' ({})", name, existing.id);
        return Ok(existing);
    }

    tracing::info!("Creating tunnel '{}'...", name);
    cloudflared(&["tunnel", "create", name])?;

    let created = list_tunnels()?
        .into_iter()
        .find(|t| t.name == name)
        .with_context(|| format!("Tunnel '{}' was created but is not listed", name))?;
    tracing::info!("✓ Created tunnel '{}' ({})", name, created.id);
    Ok(created)
}

/// Point a DNS record at the tunnel; an existing record is left in place
pub fn route_dns(name: &str, hostname: &str) -> Result<()> {
    match cloudflared(&["tunnel", "route", "dns", name, hostname]) {
        Ok(_) => {
            tracing::info!("✓ Routed {} to tunnel '{}'", hostname, name);
            Ok(())
        }
        Err(e) if e.to_string().contains("already exists") => {
            tracing::warn!("⚠ DNS record for {} already exists, leaving it", hostname);
            Ok(())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to route {} to '{}'", hostname, name)),
    }
}

/// Run the tunnel in the foreground until interrupted
pub fn run(config_path: &Path, name: &str) -> Result<()> {
    if !config_path.exists() {
        return Err(OpsError::missing_file(
            config_path,
            "Create it with `nightscout-ops tunnel setup`",
        )
        .into());
    }
    check_required_tools(&["cloudflared"])?;
    let config = config_path.display().to_string();
    cloudflared_interactive(&["tunnel", "--config", &config, "run", name])
}

pub fn info(name: &str) -> Result<()> {
    check_required_tools(&["cloudflared"])?;
    cloudflared_interactive(&["tunnel", "info", name])
}

/// Clean up stale connections, then delete the tunnel
pub fn delete(name: &str) -> Result<()> {
    check_required_tools(&["cloudflared"])?;
    cloudflared(&["tunnel", "cleanup", name])?;
    cloudflared(&["tunnel", "delete", "-f", name])?;
    tracing::info!("✓ Deleted tunnel '{}'", name);
    Ok(())
}
