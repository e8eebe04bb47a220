//! Failure taxonomy for a production run.
//!
//! Functions keep returning `anyhow::Result` so call sites can attach
//! context; the typed variants below travel inside the `anyhow::Error` and
//! can be recovered with `err.downcast_ref::<BuildError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BuildError {
    /// Required template or profile data is missing.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// An external process exited non-zero.
    #[error("{context} (exit code {code}){}", stderr_suffix(.stderr))]
    ExternalTool {
        program: String,
        context: String,
        code: i32,
        stderr: String,
    },

    /// An expected path is absent or unusable.
    #[error("{reason}: {}", .path.display())]
    Filesystem { path: PathBuf, reason: String },

    /// Host configuration could not be put back after a temporary mutation.
    #[error("failed to restore {}: {reason}", .path.display())]
    StateRestore { path: PathBuf, reason: String },
}

impl BuildError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn filesystem(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{}", trimmed)
    }
}
