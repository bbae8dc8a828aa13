// ABOUTME: Tallied validation report of success/warning/error check results
// ABOUTME: Renders a flat text report and decides the run's exit status

use crate::error::OpsError;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt;
use std::path::Path;

/// Outcome class of a single check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckStatus {
    Success,
    Warning,
    Error,
}

impl CheckStatus {
    pub fn label(self) -> &'static str {
        match self {
            CheckStatus::Success => "SUCCESS",
            CheckStatus::Warning => "WARNING",
            CheckStatus::Error => "ERROR",
        }
    }

    fn glyph(self) -> &'static str {
        match self {
            CheckStatus::Success => "✓",
            CheckStatus::Warning => "⚠",
            CheckStatus::Error => "✗",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub status: CheckStatus,
    pub message: String,
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub success: usize,
    pub warning: usize,
    pub error: usize,
}

impl Tally {
    pub fn total(&self) -> usize {
        self.success + self.warning + self.error
    }
}

/// Ordered sequence of check results for one run
#[derive(Debug, Clone)]
pub struct ValidationReport {
    title: String,
    started_at: DateTime<Local>,
    results: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            started_at: Local::now(),
            results: Vec::new(),
        }
    }

    /// Record a result and log it as it happens
    pub fn record(&mut self, status: CheckStatus, message: impl Into<String>) {
        let message = message.into();
        match status {
            CheckStatus::Success => tracing::info!("  {} {}", status.glyph(), message),
            CheckStatus::Warning => tracing::warn!("  {} {}", status.glyph(), message),
            CheckStatus::Error => tracing::error!("  {} {}", status.glyph(), message),
        }
        self.results.push(CheckResult { status, message });
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.record(CheckStatus::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.record(CheckStatus::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.record(CheckStatus::Error, message);
    }

    /// Append every result of another report, keeping order
    pub fn extend(&mut self, other: ValidationReport) {
        self.results.extend(other.results);
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for result in &self.results {
            match result.status {
                CheckStatus::Success => tally.success += 1,
                CheckStatus::Warning => tally.warning += 1,
                CheckStatus::Error => tally.error += 1,
            }
        }
        tally
    }

    pub fn has_errors(&self) -> bool {
        self.results.iter().any(|r| r.status == CheckStatus::Error)
    }

    /// Percentage of checks that passed outright; 100 for an empty report
    pub fn score(&self) -> u8 {
        let tally = self.tally();
        if tally.total() == 0 {
            return 100;
        }
        ((tally.success * 100) / tally.total()) as u8
    }

    pub fn render(&self) -> String {
        let tally = self.tally();
        let mut out = String::new();
        out.push_str(&format!("{}\n", self.title));
        out.push_str(&format!("{}\n", "=".repeat(self.title.chars().count().max(40))));
        out.push_str(&format!(
            "Generated: {}\n\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S %Z")
        ));

        for result in &self.results {
            out.push_str(&format!("[{}] {}\n", result.status, result.message));
        }

        out.push_str("\nSummary\n-------\n");
        out.push_str(&format!("Total checks: {}\n", tally.total()));
        out.push_str(&format!("Success: {}\n", tally.success));
        out.push_str(&format!("Warnings: {}\n", tally.warning));
        out.push_str(&format!("Errors: {}\n", tally.error));
        out.push_str(&format!("Score: {}%\n", self.score()));
        out
    }

    /// Write the rendered report, creating parent directories as needed
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, self.render())
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        tracing::info!("Report written to {}", path.display());
        Ok(())
    }

    /// Log the summary block
    pub fn log_summary(&self) {
        let tally = self.tally();
        tracing::info!("");
        tracing::info!("========================================");
        tracing::info!("{}", self.title);
        tracing::info!("========================================");
        tracing::info!("Total checks: {}", tally.total());
        tracing::info!("✓ Success: {}", tally.success);
        tracing::info!("⚠ Warnings: {}", tally.warning);
        tracing::info!("✗ Errors: {}", tally.error);
        tracing::info!("Score: {}%", self.score());
        tracing::info!("========================================");
    }

    /// Fail the run iff at least one error was recorded
    pub fn into_result(self, report_location: &str) -> Result<Self> {
        let errors = self.tally().error;
        if errors > 0 {
            return Err(OpsError::ValidationFailed {
                errors,
                report: report_location.to_string(),
            }
            .into());
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mixed_report() -> ValidationReport {
        let mut report = ValidationReport::new("Migration Validation");
        report.success("Source reachable");
        report.success("entries: 120 documents on both sides");
        report.warning("treatments: source=10 target=9");
        report.error("Nightscout returned HTTP 502");
        report
    }

    #[test]
    fn test_tally_is_consistent_with_results() {
        let report = mixed_report();
        let tally = report.tally();
        assert_eq!(tally.success, 2);
        assert_eq!(tally.warning, 1);
        assert_eq!(tally.error, 1);
        assert_eq!(tally.total(), report.results().len());
    }

    #[test]
    fn test_errors_fail_the_run() {
        let report = mixed_report();
        assert!(report.has_errors());
        let err = report.into_result("report.txt").unwrap_err();
        assert!(err.to_string().contains("1 error(s)"));
    }

    #[test]
    fn test_warnings_do_not_fail_the_run() {
        let mut report = ValidationReport::new("Env check");
        report.success("API_SECRET length ok");
        report.warning("DISPLAY_UNITS not set");
        assert!(!report.has_errors());
        assert!(report.into_result("report.txt").is_ok());
    }

    #[test]
    fn test_empty_report_passes_with_full_score() {
        let report = ValidationReport::new("Nothing");
        assert_eq!(report.tally().total(), 0);
        assert_eq!(report.score(), 100);
        assert!(report.into_result("-").is_ok());
    }

    #[test]
    fn test_score() {
        assert_eq!(mixed_report().score(), 50);
    }

    #[test]
    fn test_extend_keeps_order() {
        let mut first = ValidationReport::new("All");
        first.success("a");
        let mut second = ValidationReport::new("Part");
        second.error("b");
        second.warning("c");
        first.extend(second);

        let messages: Vec<&str> = first.results().iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
        assert_eq!(first.title(), "All");
    }

    #[test]
    fn test_render_and_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reports/validation.txt");
        let report = mixed_report();
        report.write_to(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Migration Validation\n"));
        assert!(text.contains("[SUCCESS] Source reachable"));
        assert!(text.contains("[WARNING] treatments: source=10 target=9"));
        assert!(text.contains("[ERROR] Nightscout returned HTTP 502"));
        assert!(text.contains("Total checks: 4"));
        assert!(text.contains("Score: 50%"));
    }
}
