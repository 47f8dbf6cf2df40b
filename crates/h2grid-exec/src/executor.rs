//! The `CommandExecutor` trait.

use std::fmt;

use async_trait::async_trait;

use crate::error::ExecResult;

/// The pod (and optionally container) a command runs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    /// Container name; `None` uses the pod's only container.
    pub container: Option<String>,
}

impl ExecTarget {
    pub fn new(namespace: impl Into<String>, pod: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            pod: pod.into(),
            container: None,
        }
    }

    pub fn with_container(self, container: impl Into<String>) -> Self {
        Self {
            container: Some(container.into()),
            ..self
        }
    }
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.pod)?;
        if let Some(c) = &self.container {
            write!(f, "[{c}]")?;
        }
        Ok(())
    }
}

/// Captured output of a command that completed successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs a shell command inside a running instance.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` through `/bin/sh -c` in `target`, block until it
    /// terminates, and return its output.
    async fn exec(&self, target: &ExecTarget, command: &str) -> ExecResult<ExecOutput>;
}
