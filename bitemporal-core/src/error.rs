//! Error taxonomy (§7). `InputError` is intentionally not part of
//! `VersioningError` — it is never fatal, the Version Manager only logs it
//! and passes the offending node through untouched.

use thiserror::Error;

use crate::models::VersioningMode;

/// A graph query failed after exhausting `execute_query_with_retry`'s attempts.
#[derive(Debug, Error)]
#[error("graph backend operation failed after {attempts} attempt(s): {message}")]
pub struct BackendError {
    pub attempts: u32,
    pub message: String,
}

impl BackendError {
    pub fn new(attempts: u32, message: impl Into<String>) -> Self {
        Self { attempts, message: message.into() }
    }
}

/// A vector index reported failed ids after all in-line retries (§4.C step 6).
#[derive(Debug, Error)]
#[error("vector index {index} failed to apply update for source {source_id}: {} id(s) still failing", failed_ids.len())]
pub struct IndexError {
    pub index: crate::models::VectorIndexKind,
    pub source_id: String,
    pub failed_ids: Vec<String>,
}

/// An invalid `VersioningConfig` was constructed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("versioning mode {mode:?} requires an at_timestamp but none was supplied")]
    MissingTimestamp { mode: VersioningMode },
}

/// Malformed node metadata (e.g. a source node missing `source_id`). Never
/// propagated as a hard failure — logged as a warning by the caller and the
/// node is yielded untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct InputError(pub String);

/// Top-level error type surfaced by the engine's fallible operations.
#[derive(Debug, Error)]
pub enum VersioningError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
