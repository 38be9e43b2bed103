//! Store configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::client::DEFAULT_API_BASE_URL;
use crate::concurrency::{clamp_concurrency, DEFAULT_CONCURRENCY};
use crate::filter::FilterConfig;
use crate::version::UnicodeVersion;

pub const DEFAULT_LOCKFILE_NAME: &str = ".ucd-store.lock";
pub const DEFAULT_MANIFEST_NAME: &str = ".ucd-store.json";

/// Configuration for a store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// Root directory of the mirror
    pub base_path: PathBuf,

    /// Base URL of the dataset API
    pub api_base_url: String,

    /// Lockfile name, relative to the base path
    pub lockfile_name: String,

    /// Legacy manifest name, relative to the base path
    pub manifest_name: String,

    /// Default number of in-flight downloads or hash computations
    pub concurrency: usize,

    /// First version whose remote layout nests files under `ucd/`
    pub ucd_folder_threshold: UnicodeVersion,

    /// Store-wide include/exclude filters
    pub filters: FilterConfig,

    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./ucd-files"),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            lockfile_name: DEFAULT_LOCKFILE_NAME.to_string(),
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            ucd_folder_threshold: UnicodeVersion::default(),
            filters: FilterConfig::default(),
            request_timeout_secs: 30,
        }
    }
}

impl StoreConfig {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `UCD_STORE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("UCD_STORE_API_URL") {
            config.api_base_url = url;
        }
        if let Ok(path) = std::env::var("UCD_STORE_BASE_PATH") {
            config.base_path = PathBuf::from(path);
        }
        if let Ok(value) = std::env::var("UCD_STORE_CONCURRENCY") {
            match value.parse::<usize>() {
                Ok(n) => config.concurrency = clamp_concurrency(n),
                Err(_) => log::warn!("Ignoring invalid UCD_STORE_CONCURRENCY value: {}", value),
            }
        }
        config
    }

    pub fn with_filters(mut self, filters: FilterConfig) -> Self {
        self.filters = filters;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
