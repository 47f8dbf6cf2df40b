//! RecordingExecutor — records commands instead of running them.
//!
//! Stands in for a real pod in tests: every call is appended to a log,
//! and the executor can be told to fail so callers' error handling can be
//! exercised.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ExecError, ExecResult};
use crate::executor::{CommandExecutor, ExecOutput, ExecTarget};

/// A command the executor was asked to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub target: ExecTarget,
    pub command: String,
}

#[derive(Clone)]
enum Failure {
    Connection(String),
    Command { message: String, stderr: String },
}

impl Failure {
    fn to_error(&self) -> ExecError {
        match self {
            Self::Connection(message) => ExecError::Connection(message.clone()),
            Self::Command { message, stderr } => ExecError::Execution {
                message: message.clone(),
                stdout: String::new(),
                stderr: stderr.clone(),
            },
        }
    }
}

#[derive(Default)]
struct Inner {
    calls: Vec<RecordedCommand>,
    failure: Option<Failure>,
}

#[derive(Default)]
pub struct RecordingExecutor {
    inner: Mutex<Inner>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// An executor whose every command fails with a connection error.
    pub fn failing(message: &str) -> Self {
        let executor = Self::default();
        executor.lock().failure = Some(Failure::Connection(message.to_string()));
        executor
    }

    /// An executor whose every command runs and exits abnormally, leaving
    /// `stderr` behind.
    pub fn failing_command(message: &str, stderr: &str) -> Self {
        let executor = Self::default();
        executor.lock().failure = Some(Failure::Command {
            message: message.to_string(),
            stderr: stderr.to_string(),
        });
        executor
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All commands received so far, in order.
    pub fn calls(&self) -> Vec<RecordedCommand> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn exec(&self, target: &ExecTarget, command: &str) -> ExecResult<ExecOutput> {
        let mut inner = self.lock();
        inner.calls.push(RecordedCommand {
            target: target.clone(),
            command: command.to_string(),
        });
        debug!(%target, calls = inner.calls.len(), "recorded remote command");
        match &inner.failure {
            Some(failure) => Err(failure.to_error()),
            None => Ok(ExecOutput::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let exec = RecordingExecutor::new();
        let target = ExecTarget::new("default", "orders-0");

        exec.exec(&target, "echo one").await.unwrap();
        exec.exec(&target, "echo two").await.unwrap();

        let calls = exec.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].command, "echo one");
        assert_eq!(calls[1].target, target);
    }

    #[tokio::test]
    async fn failing_executor_still_records() {
        let exec = RecordingExecutor::failing("pod unreachable");
        let err = exec
            .exec(&ExecTarget::new("default", "orders-0"), "true")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Connection(ref m) if m == "pod unreachable"));
        assert_eq!(exec.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_command_carries_stderr() {
        let exec = RecordingExecutor::failing_command("exit code 7", "curl: (7) Failed to connect");
        let err = exec
            .exec(&ExecTarget::new("default", "orders-0"), "curl x")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::Execution { ref message, .. } if message == "exit code 7"));
        assert_eq!(err.stderr(), Some("curl: (7) Failed to connect"));
    }
}
