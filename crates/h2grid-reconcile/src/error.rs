//! Reconcile error types.

use thiserror::Error;

use h2grid_store::StoreError;

/// Errors that abort a convergence pass.
///
/// Remote command failures are deliberately absent: one-shot actions log
/// and record them, they never fail the pass.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("resource has no {0}")]
    MissingMetadata(&'static str),
}

impl ReconcileError {
    /// True when the pass lost a race with another writer.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }
}

pub type ReconcileResult<T> = Result<T, ReconcileError>;
