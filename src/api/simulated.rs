//! In-memory dataset API
//!
//! Serves versions, trees and file contents from memory. Failures can be
//! injected per remote path, and every request is counted, which makes it
//! the remote side of choice for tests and offline fixtures.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;

use super::{ApiError, UcdApi, UnicodeVersionInfo};
use crate::tree::{tree_from_paths, TreeNode};
use crate::version::{remote_file_path, UnicodeVersion};

#[derive(Debug, Default)]
struct SimulatedState {
    versions: Vec<UnicodeVersionInfo>,
    trees: HashMap<String, Vec<TreeNode>>,
    files: HashMap<String, String>,
    failures: HashMap<String, ApiError>,
    failing_trees: HashSet<String>,
    versions_failure: Option<ApiError>,
    requested: Vec<String>,
}

#[derive(Debug, Default)]
pub struct SimulatedUcdApi {
    state: RwLock<SimulatedState>,
    threshold: UnicodeVersion,
    latency: Option<Duration>,
    file_requests: AtomicUsize,
    tree_requests: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl SimulatedUcdApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `ucd/` folder threshold when laying out file paths.
    pub fn with_ucd_threshold(mut self, threshold: UnicodeVersion) -> Self {
        self.threshold = threshold;
        self
    }

    /// Delay every file request, so concurrent requests overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Publish a version with the given `(relative path, content)` files.
    pub fn add_version(&self, version: &str, files: &[(&str, &str)]) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !state.versions.iter().any(|v| v.version == version) {
            state.versions.push(UnicodeVersionInfo::stable(version));
        }

        let paths: Vec<&str> = files.iter().map(|(path, _)| *path).collect();
        state.trees.insert(version.to_string(), tree_from_paths(&paths));
        for (path, content) in files {
            let remote = remote_file_path(version, path, self.threshold);
            state.files.insert(remote, (*content).to_string());
        }
    }

    /// Stop listing a version. Its tree and files stay reachable.
    pub fn unlist_version(&self, version: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.versions.retain(|v| v.version != version);
    }

    /// Replace the content of one file of a version.
    pub fn set_file(&self, version: &str, path: &str, content: &str) {
        let remote = remote_file_path(version, path, self.threshold);
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.files.insert(remote, content.to_string());
    }

    /// Make requests for a relative file path of a version fail with `status`.
    pub fn fail_file(&self, version: &str, path: &str, status: u16) {
        let remote = remote_file_path(version, path, self.threshold);
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        let error = ApiError::new(Some(status), format!("simulated failure for {}", remote));
        state.failures.insert(remote, error);
    }

    pub fn fail_tree(&self, version: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.failing_trees.insert(version.to_string());
    }

    pub fn fail_versions(&self, status: u16) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.versions_failure = Some(ApiError::new(Some(status), "simulated version listing failure"));
    }

    pub fn file_requests(&self) -> usize {
        self.file_requests.load(Ordering::SeqCst)
    }

    pub fn tree_requests(&self) -> usize {
        self.tree_requests.load(Ordering::SeqCst)
    }

    /// Highest number of file requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Remote paths requested so far, in request order.
    pub fn requested_paths(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.requested.clone()
    }

    /// Remote file contents keyed by remote path.
    pub fn files(&self) -> BTreeMap<String, String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.files.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

#[async_trait]
impl UcdApi for SimulatedUcdApi {
    async fn list_versions(&self) -> Result<Vec<UnicodeVersionInfo>, ApiError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if let Some(error) = &state.versions_failure {
            return Err(error.clone());
        }
        Ok(state.versions.clone())
    }

    async fn get_file_tree(&self, version: &str) -> Result<Vec<TreeNode>, ApiError> {
        self.tree_requests.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        if state.failing_trees.contains(version) {
            return Err(ApiError::new(Some(500), format!("simulated tree failure for {}", version)));
        }
        state
            .trees
            .get(version)
            .cloned()
            .ok_or_else(|| ApiError::not_found(version))
    }

    async fn get_file(&self, path: &str) -> Result<String, ApiError> {
        self.file_requests.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let result = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            state.requested.push(path.to_string());
            match state.failures.get(path) {
                Some(error) => Err(error.clone()),
                None => state
                    .files
                    .get(path)
                    .cloned()
                    .ok_or_else(|| ApiError::not_found(path)),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
