//! Remote command error types.

use std::time::Duration;

use thiserror::Error;

pub type ExecResult<T> = Result<T, ExecError>;

/// Errors from running a remote command.
///
/// None of these say whether the command took effect: a connection can
/// drop after the command started, and a failed command may have done
/// part of its work.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command channel could not be opened.
    #[error("connection error: {0}")]
    Connection(String),

    /// The command ran but terminated abnormally or with a non-zero status.
    #[error("execution error: {message}")]
    Execution {
        message: String,
        stdout: String,
        stderr: String,
    },

    #[error("command timed out after {0:?}")]
    Timeout(Duration),
}

impl ExecError {
    /// Standard output captured before the command failed, if any.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Execution { stdout, .. } => non_blank(stdout),
            _ => None,
        }
    }

    /// Standard error captured before the command failed, if any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Execution { stderr, .. } => non_blank(stderr),
            _ => None,
        }
    }
}

fn non_blank(output: &str) -> Option<&str> {
    Some(output.trim()).filter(|s| !s.is_empty())
}
