// ABOUTME: Docker Compose wrapper for starting, stopping, and inspecting the stack
// ABOUTME: Detects the compose plugin or standalone binary and parses JSON ps output

pub mod file;

pub use file::{ComposeFile, ComposeTemplate, APP_SERVICE, DB_SERVICE};

use crate::error::OpsError;
use crate::utils::{self, wait_for};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

/// State of one container as reported by `compose ps --format json`
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ContainerState {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Service", default)]
    pub service: String,
    #[serde(rename = "State", default)]
    pub state: String,
    #[serde(rename = "Health", default)]
    pub health: String,
    #[serde(rename = "Status", default)]
    pub status: String,
}

impl ContainerState {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    pub fn is_unhealthy(&self) -> bool {
        self.health.eq_ignore_ascii_case("unhealthy")
    }
}

/// Parse `ps --format json`, which is a JSON array on older Compose v2
/// releases and one object per line on newer ones
pub fn parse_ps_output(stdout: &str) -> Result<Vec<ContainerState>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).context("Failed to parse compose ps output");
    }
    trimmed
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).context("Failed to parse compose ps output line"))
        .collect()
}

/// A compose invocation bound to one compose file
#[derive(Debug, Clone)]
pub struct Compose {
    program: Vec<String>,
    file: PathBuf,
}

impl Compose {
    /// Prefer `docker compose`; fall back to standalone `docker-compose`
    pub fn detect(file: &Path) -> Result<Self> {
        if !file.exists() {
            return Err(OpsError::missing_file(
                file,
                "Generate one with `nightscout-ops compose render`",
            )
            .into());
        }

        let plugin = utils::tool_available("docker")
            && Command::new("docker")
                .args(["compose", "version"])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);

        let program = if plugin {
            vec!["docker".to_string(), "compose".to_string()]
        } else if utils::tool_available("docker-compose") {
            vec!["docker-compose".to_string()]
        } else {
            return Err(OpsError::MissingTools {
                tools: "docker compose, docker-compose".to_string(),
                hint: "Please install Docker Engine with the Compose plugin:\n\
                       - https://docs.docker.com/engine/install/"
                    .to_string(),
            }
            .into());
        };

        tracing::debug!("Using '{}'", program.join(" "));
        Ok(Self::with_program(program, file))
    }

    pub fn with_program(program: Vec<String>, file: &Path) -> Self {
        Self {
            program,
            file: file.to_path_buf(),
        }
    }

    /// Full argument vector for a compose subcommand
    pub fn command_line(&self, args: &[&str]) -> Vec<String> {
        let mut line = self.program.clone();
        line.push("-f".to_string());
        line.push(self.file.display().to_string());
        line.extend(args.iter().map(|a| a.to_string()));
        line
    }

    fn command(&self, args: &[&str]) -> Command {
        let line = self.command_line(args);
        tracing::debug!("Running: {}", line.join(" "));
        let mut cmd = Command::new(&line[0]);
        cmd.args(&line[1..]);
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        let output = self
            .command(args)
            .output()
            .with_context(|| format!("Failed to execute {}", self.program.join(" ")))?;
        if !output.status.success() {
            return Err(OpsError::command_failed(&self.program.join(" "), &output).into());
        }
        Ok(output)
    }

    /// `up -d`, idempotent for already-running services
    pub fn up(&self, services: &[&str]) -> Result<()> {
        let mut args = vec!["up", "-d"];
        args.extend_from_slice(services);
        self.run(&args)?;
        tracing::info!("✓ Services started");
        Ok(())
    }

    /// Stop and remove the containers
    ///
    /// # Arguments
    ///
    /// * `remove_volumes` - Also delete named volumes, including the MongoDB data
    pub fn down(&self, remove_volumes: bool) -> Result<()> {
        let mut args = vec!["down"];
        if remove_volumes {
            args.push("--volumes");
        }
        self.run(&args)?;
        tracing::info!("✓ Services stopped");
        Ok(())
    }

    pub fn restart(&self, services: &[&str]) -> Result<()> {
        let mut args = vec!["restart"];
        args.extend_from_slice(services);
        self.run(&args)?;
        tracing::info!("✓ Services restarted");
        Ok(())
    }

    pub fn pull(&self) -> Result<()> {
        self.run(&["pull"])?;
        tracing::info!("✓ Images pulled");
        Ok(())
    }

    pub fn ps(&self) -> Result<Vec<ContainerState>> {
        let output = self.run(&["ps", "--all", "--format", "json"])?;
        parse_ps_output(&String::from_utf8_lossy(&output.stdout))
    }

    /// Print recent logs straight to the terminal
    pub fn logs(&self, service: Option<&str>, tail: u32, follow: bool) -> Result<()> {
        let tail_arg = format!("--tail={}", tail);
        let mut args = vec!["logs", tail_arg.as_str()];
        if follow {
            args.push("--follow");
        }
        if let Some(service) = service {
            args.push(service);
        }

        let status = self
            .command(&args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .context("Failed to read compose logs")?;
        if !status.success() {
            anyhow::bail!("compose logs exited with {}", status);
        }
        Ok(())
    }

    /// Captured tail of a service's logs, for diagnostics reports
    pub fn logs_tail(&self, service: &str, tail: u32) -> Result<String> {
        let tail_arg = format!("--tail={}", tail);
        let output = self.run(&["logs", "--no-color", tail_arg.as_str(), service])?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Wait until the Nightscout status URL answers 2xx
pub async fn wait_healthy(status_url: &str, timeout: Duration, interval: Duration) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    wait_for("Nightscout", timeout, interval, || {
        let request = client.get(status_url).send();
        async move {
            match request.await {
                Ok(response) => response.status().is_success(),
                Err(e) => {
                    tracing::debug!("Status probe failed: {}", e);
                    false
                }
            }
        }
    })
    .await
    .with_context(|| {
        format!(
            "Nightscout did not become healthy at {}.\n\
             Inspect the logs with `nightscout-ops compose logs nightscout`",
            status_url
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_ps_ndjson() {
        let out = r#"{"Name":"nightscout","Service":"nightscout","State":"running","Health":"","Status":"Up 2 minutes"}
{"Name":"nightscout-mongo","Service":"mongo","State":"exited","Health":"","Status":"Exited (1)"}
"#;
        let containers = parse_ps_output(out).unwrap();
        assert_eq!(containers.len(), 2);
        assert!(containers[0].is_running());
        assert!(!containers[1].is_running());
        assert_eq!(containers[1].service, "mongo");
    }

    #[test]
    fn test_parse_ps_array_with_missing_fields() {
        let out = r#"[{"Name":"nightscout","State":"running","Health":"unhealthy"}]"#;
        let containers = parse_ps_output(out).unwrap();
        assert_eq!(containers.len(), 1);
        assert!(containers[0].is_unhealthy());
        assert_eq!(containers[0].service, "");
    }

    #[test]
    fn test_parse_ps_empty_and_garbage() {
        assert!(parse_ps_output("  \n").unwrap().is_empty());
        assert!(parse_ps_output("not json").is_err());
    }

    #[test]
    fn test_command_line() {
        let compose = Compose::with_program(
            vec!["docker".to_string(), "compose".to_string()],
            Path::new("/srv/ns/docker-compose.yml"),
        );
        assert_eq!(
            compose.command_line(&["up", "-d"]),
            vec!["docker", "compose", "-f", "/srv/ns/docker-compose.yml", "up", "-d"]
        );
    }

    #[test]
    fn test_detect_requires_compose_file() {
        let dir = tempdir().unwrap();
        let err = Compose::detect(&dir.path().join("docker-compose.yml")).unwrap_err();
        assert!(err.to_string().contains("compose render"));
    }

    #[tokio::test]
    async fn test_wait_healthy_times_out_on_closed_port() {
        let result = wait_healthy(
            "http://127.0.0.1:9/api/v1/status",
            Duration::from_millis(100),
            Duration::from_millis(20),
        )
        .await;
        assert!(result.is_err());
    }
}
