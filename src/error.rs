// ABOUTME: Typed errors for the failure classes callers need to tell apart
// ABOUTME: Missing preconditions, failed external commands, and failed validation runs

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsError {
    /// One or more external tools are not on PATH
    #[error("Missing required tools: {tools}\n\n{hint}")]
    MissingTools { tools: String, hint: String },

    /// A file the operation depends on does not exist
    #[error("{} not found.\n{hint}", path.display())]
    MissingFile { path: PathBuf, hint: String },

    /// An external command exited unsuccessfully
    #[error("{program} failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        status: String,
        stderr: String,
    },

    /// A validation run recorded at least one error
    #[error("Validation failed with {errors} error(s); see {report}")]
    ValidationFailed { errors: usize, report: String },
}

impl OpsError {
    pub fn missing_file(path: impl Into<PathBuf>, hint: impl Into<String>) -> Self {
        OpsError::MissingFile {
            path: path.into(),
            hint: hint.into(),
        }
    }

    pub fn command_failed(program: &str, output: &std::process::Output) -> Self {
        OpsError::CommandFailed {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}
