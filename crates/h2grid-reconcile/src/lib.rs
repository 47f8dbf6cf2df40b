//! h2grid-reconcile — the convergence engine for `H2Database` resources.
//!
//! One call to [`Reconciler::reconcile`] is one convergence pass: read the
//! desired state, create or correct the child `Deployment` and `Service`,
//! mirror pod names into status, and fire at most one backup and one
//! clustering bootstrap command.
//!
//! # Components
//!
//! - **`synth`** — pure builders for the child workload and service
//! - **`projector`** — pod list → `status.nodes`
//! - **`oneshot`** — backup/clustering request state machines, idempotency keys, shell commands
//! - **`engine`** — the ordered reconcile pass
//! - **`config`** — operator configuration (TOML)
//!
//! # One-shot actions
//!
//! ```text
//! backupTarget:   <url> ──fire once──▶ skip
//! clusteringMode: yes   ──fire once──▶ issued   (size 2, exactly 2 pods)
//! ```
//!
//! Before a command fires, an `Attempted` entry keyed by
//! `sha256(action, request)` is written to status. Until that entry is
//! marked completed, a pass that finds the key only completes the spec
//! transition.

pub mod config;
pub mod engine;
pub mod error;
pub mod oneshot;
pub mod projector;
pub mod synth;

pub use config::OperatorConfig;
pub use engine::{ReconcileOutcome, Reconciler};
pub use error::{ReconcileError, ReconcileResult};
