//! h2grid-api — resource types for the h2grid controller.
//!
//! Defines the `H2Database` custom resource (`h2.example.com/v1alpha1`),
//! its spec and status, the one-shot action ledger kept in status, and
//! the label set that binds a database to its child workload and service.
//!
//! # Wire format
//!
//! ```yaml
//! apiVersion: h2.example.com/v1alpha1
//! kind: H2Database
//! metadata: { name: orders, namespace: default }
//! spec:
//!   size: 2
//!   backupTarget: skip          # or a URL to POST one backup to
//!   clusteringMode: "no"        # no | yes | issued
//! status:
//!   nodes: [orders-5d9c-abcde, orders-5d9c-fghij]
//! ```

pub mod labels;
pub mod types;

pub use labels::{labels_for, APP_LABEL, APP_LABEL_VALUE, INSTANCE_LABEL};
pub use types::*;
