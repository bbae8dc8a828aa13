// ABOUTME: Diagnose command - one report covering tools, env file, containers, database, and endpoints
// ABOUTME: Appends the log tail of any container that is down or unhealthy

use crate::compose::{Compose, ComposeFile, ContainerState};
use crate::config::Settings;
use crate::envfile::EnvFile;
use crate::tunnel::TunnelConfig;
use crate::utils::tool_available;
use crate::validation::{checks, ValidationReport};
use anyhow::Result;
use std::path::Path;

const LOG_TAIL_LINES: u32 = 30;

/// Tools and whether a missing one is an error (true) or a warning
const TOOLS: &[(&str, bool)] = &[
    ("docker", true),
    ("mongodump", false),
    ("mongorestore", false),
    ("cloudflared", false),
    ("openssl", false),
];

fn check_tools(report: &mut ValidationReport) {
    for (tool, required) in TOOLS {
        if tool_available(tool) {
            report.success(format!("{} found in PATH", tool));
        } else if *required {
            report.error(format!("{} not found in PATH", tool));
        } else {
            report.warning(format!("{} not found in PATH (needed for some commands)", tool));
        }
    }
}

fn check_env(report: &mut ValidationReport, settings: &Settings) {
    let path = settings.env_path();
    if !path.exists() {
        report.error(format!(
            "{} missing; create it with `nightscout-ops env init`",
            path.display()
        ));
        return;
    }
    match EnvFile::load(&path) {
        Ok(env) => report.extend(env.validate()),
        Err(e) => report.error(format!("{} unreadable: {:#}", path.display(), e)),
    }
}

/// Classify container states
///
/// # Returns
///
/// The services that are down or unhealthy, whose logs are worth reading.
pub fn classify_containers(
    report: &mut ValidationReport,
    containers: &[ContainerState],
) -> Vec<String> {
    if containers.is_empty() {
        report.error("No containers found; start the stack with `nightscout-ops compose up`");
        return Vec::new();
    }

    let mut suspicious = Vec::new();
    for c in containers {
        if !c.is_running() {
            report.error(format!("Container {} is {} ({})", c.name, c.state, c.status));
            suspicious.push(c.service.clone());
        } else if c.is_unhealthy() {
            report.warning(format!("Container {} is running but unhealthy", c.name));
            suspicious.push(c.service.clone());
        } else {
            report.success(format!("Container {} is running", c.name));
        }
    }
    suspicious
}

fn check_containers(report: &mut ValidationReport, settings: &Settings) -> Vec<(String, String)> {
    let path = settings.compose_path();
    if !path.exists() {
        report.error(format!(
            "{} missing; create it with `nightscout-ops compose render`",
            path.display()
        ));
        return Vec::new();
    }
    match ComposeFile::load(&path) {
        Ok(file) => report.success(format!(
            "{} defines {} service(s)",
            path.display(),
            file.services.len()
        )),
        Err(e) => {
            report.error(format!("{:#}", e));
            return Vec::new();
        }
    }

    let compose = match Compose::detect(&path) {
        Ok(c) => c,
        Err(e) => {
            report.error(format!("Docker Compose unavailable: {:#}", e));
            return Vec::new();
        }
    };

    let containers = match compose.ps() {
        Ok(c) => c,
        Err(e) => {
            report.error(format!("Failed to list containers: {:#}", e));
            return Vec::new();
        }
    };

    classify_containers(report, &containers)
        .into_iter()
        .filter_map(|service| match compose.logs_tail(&service, LOG_TAIL_LINES) {
            Ok(logs) => Some((service, logs)),
            Err(e) => {
                tracing::debug!("Could not read logs for {}: {}", service, e);
                None
            }
        })
        .collect()
}

fn check_tunnel_config(report: &mut ValidationReport, settings: &Settings) -> Option<String> {
    let path = settings.tunnel_config_path();
    if !path.exists() {
        report.warning(format!(
            "No tunnel config at {}; run `nightscout-ops tunnel setup` for public access",
            path.display()
        ));
        return None;
    }
    match TunnelConfig::load(&path) {
        Ok(config) => {
            if config.credentials_file.exists() {
                report.success(format!("Tunnel config {} is valid", path.display()));
            } else {
                report.error(format!(
                    "Tunnel credentials {} missing",
                    config.credentials_file.display()
                ));
            }
            config.domain().map(str::to_string)
        }
        Err(e) => {
            report.error(format!("Tunnel config unreadable: {:#}", e));
            None
        }
    }
}

/// Run every check, write the report, and fail if anything is an error
pub async fn diagnose(settings: &Settings, report_path: &Path) -> Result<ValidationReport> {
    tracing::info!("Running diagnostics...");
    let mut report = ValidationReport::new("Nightscout Diagnostics");

    check_tools(&mut report);
    check_env(&mut report, settings);
    let logs = check_containers(&mut report, settings);

    match settings.target_uri() {
        Ok(target_uri) => {
            checks::check_connectivity(&mut report, "Self-hosted", &target_uri).await;
        }
        Err(e) => report.error(format!("Cannot build the database URI: {:#}", e)),
    }

    checks::check_http(&mut report, &settings.status_url()).await;
    if let Some(domain) = check_tunnel_config(&mut report, settings) {
        checks::check_http(&mut report, &format!("https://{}/api/v1/status", domain)).await;
    }

    let mut text = report.render();
    for (service, tail) in &logs {
        text.push_str(&format!(
            "\nLast {} log lines of {}:\n{}\n",
            LOG_TAIL_LINES, service, tail
        ));
    }
    if let Some(parent) = report_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(report_path, text)?;

    report.log_summary();
    report.into_result(&report_path.display().to_string())
}
