//! Dataset API collaborator
//!
//! The store consumes the remote dataset through three operations:
//! listing versions, fetching a version's file tree, and fetching a file.
//! [`UcdClient`] talks to the HTTP API; [`SimulatedUcdApi`] serves the
//! same data from memory.

pub mod client;
pub mod simulated;

pub use client::UcdClient;
pub use simulated::SimulatedUcdApi;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::TreeNode;

/// A failed API call. `status` is set when the server answered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(path: &str) -> Self {
        Self::new(Some(404), format!("not found: {}", path))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionType {
    Stable,
    Draft,
    #[serde(other)]
    Unknown,
}

/// One entry of the remote version listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnicodeVersionInfo {
    pub version: String,
    #[serde(rename = "type")]
    pub kind: VersionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation_url: Option<String>,
}

impl UnicodeVersionInfo {
    pub fn stable(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            kind: VersionType::Stable,
            date: None,
            documentation_url: None,
        }
    }
}

#[async_trait]
pub trait UcdApi: Send + Sync {
    async fn list_versions(&self) -> Result<Vec<UnicodeVersionInfo>, ApiError>;

    /// File tree of a version, relative to that version's UCD root.
    async fn get_file_tree(&self, version: &str) -> Result<Vec<TreeNode>, ApiError>;

    /// Content of a file addressed by its full remote path.
    async fn get_file(&self, path: &str) -> Result<String, ApiError>;
}
