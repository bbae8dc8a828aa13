// ABOUTME: Interactive terminal prompts for confirmations, inputs, and selections
// ABOUTME: Every prompt short-circuits to its default when running non-interactively

use crate::backup::{display_time, BackupArtifact};
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm, Input, MultiSelect, Password, Select};

/// Prompt helper that answers with defaults under `--yes`
#[derive(Debug, Clone, Copy)]
pub struct Prompter {
    assume_yes: bool,
}

impl Prompter {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }

    pub fn is_interactive(&self) -> bool {
        !self.assume_yes
    }

    /// Yes/no question; under `--yes` always proceeds
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.assume_yes {
            tracing::debug!("Auto-confirming: {}", prompt);
            return Ok(true);
        }
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .default(default)
            .interact()
            .context("Failed to get confirmation")
    }

    /// Free-text input; a provided value skips the prompt entirely
    pub fn text(
        &self,
        prompt: &str,
        provided: Option<&str>,
        default: Option<&str>,
    ) -> Result<String> {
        if let Some(value) = provided {
            return Ok(value.to_string());
        }
        if self.assume_yes {
            return default
                .map(str::to_string)
                .with_context(|| {
                    format!("No value given for '{}' in non-interactive mode", prompt)
                });
        }

        let theme = ColorfulTheme::default();
        let mut input = Input::<String>::with_theme(&theme).with_prompt(prompt);
        if let Some(default) = default {
            input = input.default(default.to_string());
        }
        input
            .interact_text()
            .with_context(|| format!("Failed to read '{}'", prompt))
    }

    /// Hidden input for connection strings and passphrases
    pub fn secret(&self, prompt: &str, provided: Option<&str>) -> Result<String> {
        if let Some(value) = provided {
            return Ok(value.to_string());
        }
        if self.assume_yes {
            anyhow::bail!("No value given for '{}' in non-interactive mode", prompt);
        }
        Password::with_theme(&ColorfulTheme::default())
            .with_prompt(prompt)
            .interact()
            .with_context(|| format!("Failed to read '{}'", prompt))
    }

    /// Pick collections to export; all are selected by default
    pub fn select_collections(&self, available: &[String]) -> Result<Vec<String>> {
        if self.assume_yes || available.is_empty() {
            return Ok(available.to_vec());
        }

        println!("Select collections to export:");
        println!("(Use arrow keys to navigate, Space to toggle, Enter to confirm)");
        println!();

        let defaults = vec![true; available.len()];
        let picked = MultiSelect::with_theme(&ColorfulTheme::default())
            .items(available)
            .defaults(&defaults)
            .interact()
            .context("Failed to get collection selection")?;

        Ok(picked.into_iter().map(|idx| available[idx].clone()).collect())
    }

    /// Pick a backup to restore; non-interactive runs take the newest
    pub fn select_backup<'a>(&self, backups: &'a [BackupArtifact]) -> Result<&'a BackupArtifact> {
        let newest = backups.first().context("No backups found")?;
        if self.assume_yes {
            return Ok(newest);
        }

        let items: Vec<String> = backups
            .iter()
            .map(|b| {
                format!(
                    "{}{}  {}",
                    display_time(b.created_at),
                    if b.encrypted { " (encrypted)" } else { "" },
                    b.path.display()
                )
            })
            .collect();

        let idx = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Backup to restore")
            .items(&items)
            .default(0)
            .interact()
            .context("Failed to get backup selection")?;
        Ok(&backups[idx])
    }
}
