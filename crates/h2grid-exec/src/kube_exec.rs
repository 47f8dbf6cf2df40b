//! KubeExecutor — runs commands through the pod `exec` sub-resource.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::AttachParams;
use kube::{Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::{ExecError, ExecResult};
use crate::executor::{CommandExecutor, ExecOutput, ExecTarget};

/// Default upper bound on a single remote command.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(300);

/// Executes shell commands in pods via the Kubernetes API.
#[derive(Clone)]
pub struct KubeExecutor {
    client: Client,
    timeout: Duration,
}

impl KubeExecutor {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_EXEC_TIMEOUT,
        }
    }

    /// Builder method: bound how long one command may run.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self { timeout, ..self }
    }

    async fn run(&self, target: &ExecTarget, command: &str) -> ExecResult<ExecOutput> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &target.namespace);
        let mut params = AttachParams::default()
            .stdin(false)
            .stdout(true)
            .stderr(true);
        if let Some(container) = &target.container {
            params = params.container(container.clone());
        }

        let mut attached = pods
            .exec(&target.pod, ["/bin/sh", "-c", command], &params)
            .await
            .map_err(|e| ExecError::Connection(format!("{target}: {e}")))?;

        let stdout = read_stream(attached.stdout());
        let stderr = read_stream(attached.stderr());
        let status = attached.take_status();
        let (stdout, stderr) = tokio::join!(stdout, stderr);
        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|e| ExecError::Connection(format!("{target}: {e}")))?;

        let stdout = stdout.map_err(|e| ExecError::Connection(format!("{target}: {e}")))?;
        let stderr = stderr.map_err(|e| ExecError::Connection(format!("{target}: {e}")))?;
        check_status(status, ExecOutput { stdout, stderr })
    }
}

#[async_trait]
impl CommandExecutor for KubeExecutor {
    async fn exec(&self, target: &ExecTarget, command: &str) -> ExecResult<ExecOutput> {
        debug!(%target, "exec remote command");
        tokio::time::timeout(self.timeout, self.run(target, command))
            .await
            .map_err(|_| ExecError::Timeout(self.timeout))?
    }
}

/// Drain an optional output stream. Invalid UTF-8 is replaced rather than
/// rejected.
async fn read_stream(reader: Option<impl AsyncRead + Unpin>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Map the channel's termination status onto a result.
fn check_status(status: Option<Status>, output: ExecOutput) -> ExecResult<ExecOutput> {
    match status {
        Some(s) if s.status.as_deref() == Some("Success") => Ok(output),
        Some(s) => Err(ExecError::Execution {
            message: s
                .message
                .or(s.reason)
                .unwrap_or_else(|| "command failed".to_string()),
            stdout: output.stdout,
            stderr: output.stderr,
        }),
        None => Err(ExecError::Execution {
            message: "channel closed without a termination status".to_string(),
            stdout: output.stdout,
            stderr: output.stderr,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output() -> ExecOutput {
        ExecOutput {
            stdout: "adding: opt/h2-data/".to_string(),
            stderr: String::new(),
        }
    }

    #[test]
    fn success_status_returns_output() {
        let status = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };
        assert_eq!(check_status(Some(status), output()).unwrap(), output());
    }

    #[test]
    fn failure_status_keeps_output() {
        let status = Status {
            status: Some("Failure".to_string()),
            message: Some("command terminated with non-zero exit code".to_string()),
            reason: Some("NonZeroExitCode".to_string()),
            ..Default::default()
        };
        match check_status(Some(status), output()) {
            Err(ExecError::Execution { message, stdout, .. }) => {
                assert!(message.contains("non-zero exit code"));
                assert_eq!(stdout, "adding: opt/h2-data/");
            }
            other => panic!("expected execution error, got {other:?}"),
        }
    }

    #[test]
    fn missing_status_is_an_execution_error() {
        assert!(matches!(
            check_status(None, output()),
            Err(ExecError::Execution { .. })
        ));
    }

    #[tokio::test]
    async fn read_stream_tolerates_absent_stream() {
        let empty: Option<&[u8]> = None;
        assert_eq!(read_stream(empty).await.unwrap(), "");
        assert_eq!(read_stream(Some(&b"ok\n"[..])).await.unwrap(), "ok\n");
    }
}
