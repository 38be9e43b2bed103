//! HTTP client for the dataset API

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::{ApiError, UcdApi, UnicodeVersionInfo};
use crate::tree::TreeNode;

pub const DEFAULT_API_BASE_URL: &str = "https://api.ucdjs.dev";

#[derive(Debug, Clone)]
pub struct UcdClient {
    base_url: String,
    client: reqwest::Client,
}

impl UcdClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ucd-store/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport_error)?;
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

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, ApiError> {
        let url = self.endpoint(path);
        log::debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::new(
                Some(status.as_u16()),
                error_message(&body).unwrap_or_else(|| format!("{} returned {}", url, status)),
            ));
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.get(path)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::new(None, format!("invalid response for {}: {}", path, e)))
    }
}

fn transport_error(err: reqwest::Error) -> ApiError {
    ApiError::new(err.status().map(|s| s.as_u16()), err.to_string())
}

/// Pull the `message` field out of a JSON error body.
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value.get("message")?.as_str().map(str::to_string)
}

#[async_trait]
impl UcdApi for UcdClient {
    async fn list_versions(&self) -> Result<Vec<UnicodeVersionInfo>, ApiError> {
        self.get_json("versions").await
    }

    async fn get_file_tree(&self, version: &str) -> Result<Vec<TreeNode>, ApiError> {
        self.get_json(&format!("versions/{}/file-tree", version)).await
    }

    async fn get_file(&self, path: &str) -> Result<String, ApiError> {
        self.get(&format!("files/{}", path.trim_start_matches('/')))
            .await?
            .text()
            .await
            .map_err(transport_error)
    }
}
