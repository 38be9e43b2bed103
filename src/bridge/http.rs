//! Read-only HTTP bridge
//!
//! Exposes a remote file tree as a bridge. Supports `read`, `exists` and
//! `listdir`; `listdir` expects the server to answer a JSON array of
//! [`TreeNode`] entries for directory paths.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;

use super::{BridgeError, Capabilities, Capability, StorageBridge};
use crate::tree::TreeNode;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct HttpBridge {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBridge {
    pub fn new(base_url: impl Into<String>) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent(concat!("ucd-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(http_error)?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

fn http_error(err: reqwest::Error) -> BridgeError {
    BridgeError::Http {
        status: err.status().map(|s| s.as_u16()),
        message: err.to_string(),
    }
}

fn status_error(status: StatusCode, path: &str) -> BridgeError {
    if status == StatusCode::NOT_FOUND {
        BridgeError::NotFound(path.to_string())
    } else {
        BridgeError::Http {
            status: Some(status.as_u16()),
            message: format!("request for {} failed with {}", path, status),
        }
    }
}

/// Drop nested children so a non-recursive listing only reports one level.
fn strip_children(nodes: &mut [TreeNode]) {
    for node in nodes {
        node.children = None;
    }
}

#[async_trait]
impl StorageBridge for HttpBridge {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ_ONLY
    }

    async fn read(&self, path: &str) -> Result<String, BridgeError> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), path));
        }
        response.text().await.map_err(http_error)
    }

    async fn write(&self, _path: &str, _content: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported(Capability::Write))
    }

    async fn exists(&self, path: &str) -> Result<bool, BridgeError> {
        let response = self
            .client
            .head(self.url(path))
            .send()
            .await
            .map_err(http_error)?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(status_error(s, path)),
        }
    }

    async fn mkdir(&self, _path: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported(Capability::Mkdir))
    }

    async fn listdir(&self, path: &str, recursive: bool) -> Result<Vec<TreeNode>, BridgeError> {
        let response = self
            .client
            .get(self.url(path))
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(http_error)?;
        if !response.status().is_success() {
            return Err(status_error(response.status(), path));
        }
        let mut nodes: Vec<TreeNode> = response
            .json()
            .await
            .map_err(|e| BridgeError::InvalidListing(e.to_string()))?;
        if !recursive {
            strip_children(&mut nodes);
        }
        Ok(nodes)
    }

    async fn remove(&self, _path: &str) -> Result<(), BridgeError> {
        Err(BridgeError::Unsupported(Capability::Remove))
    }
}
