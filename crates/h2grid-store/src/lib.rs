//! h2grid-store — resource store access for the h2grid controller.
//!
//! The reconciler talks to the orchestration platform only through the
//! [`ResourceStore`] trait: typed get/create/replace/list calls for the
//! `H2Database` record, its `Deployment` and `Service`, and its pods.
//!
//! # Backends
//!
//! - [`KubeStore`] — the Kubernetes API server, via `kube::Api`.
//! - [`MemoryStore`] — an in-process store emulating `resourceVersion`
//!   checks and spec generations (for testing).
//!
//! Every replace carries the `resourceVersion` of the object it was based
//! on; a stale write fails with [`StoreError::Conflict`] instead of
//! overwriting a concurrent change.

pub mod error;
pub mod kube_store;
pub mod memory;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use kube_store::KubeStore;
pub use memory::MemoryStore;
pub use store::{key_of, label_selector, ResourceStore};
