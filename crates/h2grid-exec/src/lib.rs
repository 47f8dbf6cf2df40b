//! h2grid-exec — remote command invoker.
//!
//! Runs a single shell command inside a running pod and returns what it
//! printed. Used only for the controller's one-shot actions (backup,
//! clustering bootstrap), so there is no session reuse: every call opens
//! its own channel, streams `/bin/sh -c <command>`, and waits for the
//! termination status.
//!
//! # Components
//!
//! - **`executor`** — the `CommandExecutor` trait and its request/response types
//! - **`kube_exec`** — pod `exec` over the Kubernetes API (WebSocket)
//! - **`recording`** — an executor that records commands instead of running them (for testing)

pub mod error;
pub mod executor;
pub mod kube_exec;
pub mod recording;

pub use error::{ExecError, ExecResult};
pub use executor::{CommandExecutor, ExecOutput, ExecTarget};
pub use kube_exec::KubeExecutor;
pub use recording::RecordingExecutor;
