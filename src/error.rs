//! Error types for store operations
//!
//! Each layer has its own error enum (`BridgeError`, `ApiError`,
//! `FilterError`); [`StoreError`] is the taxonomy every store operation
//! returns.

use thiserror::Error;

use crate::api::ApiError;
use crate::bridge::{BridgeError, Capability};
use crate::filter::FilterError;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Version not found: {0}")]
    VersionNotFound(String),

    #[error("Path rejected by filters: {0}")]
    FilterRejected(String),

    #[error("Capability unsupported for {operation}: requires {required:?}, bridge offers {available:?}")]
    CapabilityUnsupported {
        operation: String,
        required: Vec<Capability>,
        available: Vec<Capability>,
    },

    #[error("Invalid manifest at {path}: {reason}")]
    InvalidManifest { path: String, reason: String },

    #[error("Invalid lockfile at {path}: {reason}")]
    InvalidLockfile { path: String, reason: String },

    #[error("Version conflict: persisted {persisted:?}, provided {provided:?}")]
    VersionConflict {
        persisted: Vec<String>,
        provided: Vec<String>,
    },

    #[error("File {path} for version {version} not found locally")]
    NotFoundLocally { version: String, path: String },

    #[error("API fallback failed for {version}/{path}: {reason}")]
    ApiFallbackFailed {
        version: String,
        path: String,
        reason: String,
        status: Option<u16>,
    },

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl StoreError {
    /// HTTP status attached to a remote failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ApiFallbackFailed { status, .. } => *status,
            Self::Api(e) => e.status,
            _ => None,
        }
    }
}
