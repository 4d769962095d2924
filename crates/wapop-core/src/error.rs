use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::fingerprint::FingerprintError;
use crate::policy::PolicyError;
use crate::store::StoreError;

/// Failure of a single reconciliation pass. Every variant aborts the pass without
/// committing a fingerprint; retries belong to the controller's error policy.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("malformed policy: {0}")]
    MalformedPolicy(#[from] PolicyError),
    #[error("serialization error: {0}")]
    Serialization(#[from] FingerprintError),
    #[error("object is missing {0}")]
    MissingField(&'static str),
    #[error("reconciliation pass exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read operator namespace from {path:?}: {source}")]
    NamespaceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("operator namespace file {0:?} is empty")]
    NamespaceEmpty(PathBuf),
}
