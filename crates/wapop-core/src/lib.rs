//! Node reconciliation core for the wireless access point operator.
//!
//! Each pass decides whether a node's access point role should be enabled, fingerprints
//! every input of that decision and launches a one-shot actuation job only when the
//! fingerprint drifts from the one recorded on the node's `AccessPoint` status.

pub mod config;
pub mod crd;
pub mod error;
pub mod fingerprint;
pub mod job;
pub mod mapper;
pub mod policy;
pub mod reconcile;
pub mod store;

pub use config::{OperatorConfig, SETTINGS_NAME};
pub use crd::{AccessPoint, AccessPointSpec, AccessPointStatus};
pub use error::{ConfigError, ReconcileError};
pub use fingerprint::{DecisionInputs, Fingerprint, FingerprintError};
pub use policy::{PolicyError, Selector};
pub use reconcile::{PassOutcome, Reconciler};
pub use store::{ClusterStore, KubeStore, MemStore, StoreError, StoreResult};
