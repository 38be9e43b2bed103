//! Persisted store state: lockfile, legacy manifest and snapshots
//!
//! All three are JSON documents written through the bridge. Updates are
//! whole-file rewrites; callers merge in memory before writing.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bridge::{require, Bridge, BridgeError, Capability, StorageBridge};
use crate::error::{Result, StoreError};
use crate::filter::FilterConfig;

pub const LOCKFILE_VERSION: u32 = 1;

pub const SNAPSHOT_FILE_NAME: &str = "snapshot.json";

/// Where the snapshot of a version lives, relative to the store root.
pub fn snapshot_path(version: &str) -> String {
    format!("{}/{}", version, SNAPSHOT_FILE_NAME)
}

/// Lockfile record for one version.
///
/// `file_count == 0` means the version is recorded but not mirrored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionEntry {
    pub path: String,
    pub file_count: u64,
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VersionEntry {
    pub fn pending(version: &str) -> Self {
        let now = Utc::now();
        Self {
            path: snapshot_path(version),
            file_count: 0,
            total_size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_mirrored(&self) -> bool {
        self.file_count > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lockfile {
    pub lockfile_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub versions: BTreeMap<String, VersionEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterConfig>,
}

impl Default for Lockfile {
    fn default() -> Self {
        Self::new()
    }
}

impl Lockfile {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            lockfile_version: LOCKFILE_VERSION,
            created_at: now,
            updated_at: now,
            versions: BTreeMap::new(),
            filters: None,
        }
    }

    /// A lockfile recording `versions` as not yet mirrored.
    pub fn with_versions(versions: &[String]) -> Self {
        let mut lockfile = Self::new();
        for version in versions {
            lockfile.ensure_version(version);
        }
        lockfile
    }

    /// Recorded versions, sorted.
    pub fn version_keys(&self) -> Vec<String> {
        self.versions.keys().cloned().collect()
    }

    pub fn needs_mirror(&self, version: &str) -> bool {
        self.versions.get(version).map_or(true, |e| !e.is_mirrored())
    }

    /// Add a pending entry unless the version is already recorded.
    pub fn ensure_version(&mut self, version: &str) -> bool {
        if self.versions.contains_key(version) {
            return false;
        }
        self.versions
            .insert(version.to_string(), VersionEntry::pending(version));
        self.touch();
        true
    }

    /// Keep exactly `versions`: drop others, add pending entries for new ones.
    pub fn retain_versions(&mut self, versions: &[String]) {
        self.versions.retain(|k, _| versions.contains(k));
        for version in versions {
            self.ensure_version(version);
        }
        self.touch();
    }

    pub fn remove_version(&mut self, version: &str) -> Option<VersionEntry> {
        let removed = self.versions.remove(version);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Record the outcome of mirroring a version.
    pub fn record_mirror(&mut self, version: &str, file_count: u64, total_size: u64) {
        let now = Utc::now();
        let entry = self
            .versions
            .entry(version.to_string())
            .or_insert_with(|| VersionEntry::pending(version));
        entry.path = snapshot_path(version);
        entry.file_count = file_count;
        entry.total_size = total_size;
        entry.updated_at = now;
        self.updated_at = now;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Per-file record inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFile {
    /// Hash of the content without volatile header lines
    pub hash: String,
    /// Hash of the raw content
    pub file_hash: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub unicode_version: String,
    pub files: BTreeMap<String, SnapshotFile>,
}

impl Snapshot {
    pub fn new(version: &str) -> Self {
        Self {
            unicode_version: version.to_string(),
            files: BTreeMap::new(),
        }
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(|f| f.size).sum()
    }
}

/// Read a persisted JSON document, mapping "absent" and "empty" to `invalid`.
async fn read_document(
    bridge: &Bridge,
    path: &str,
    invalid: impl Fn(String) -> StoreError,
) -> Result<String> {
    require(bridge, "read", &[Capability::Read])?;
    let content = match bridge.read(path).await {
        Ok(content) => content,
        Err(BridgeError::NotFound(_)) => return Err(invalid("file does not exist".to_string())),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Err(invalid("file is empty".to_string()));
    }
    Ok(content)
}

async fn write_document<T: Serialize>(bridge: &Bridge, path: &str, value: &T) -> Result<()> {
    require(bridge, "write", &[Capability::Write])?;
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::SerializationError(e.to_string()))?;
    bridge.write(path, &json).await?;
    Ok(())
}

pub async fn read_lockfile(bridge: &Bridge, path: &str) -> Result<Lockfile> {
    let invalid = |reason: String| StoreError::InvalidLockfile {
        path: path.to_string(),
        reason,
    };
    let content = read_document(bridge, path, invalid).await?;
    let lockfile: Lockfile = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    if lockfile.lockfile_version != LOCKFILE_VERSION {
        return Err(invalid(format!(
            "unsupported lockfileVersion {}",
            lockfile.lockfile_version
        )));
    }
    Ok(lockfile)
}

pub async fn write_lockfile(bridge: &Bridge, path: &str, lockfile: &Lockfile) -> Result<()> {
    log::debug!("Writing lockfile {} ({} versions)", path, lockfile.versions.len());
    write_document(bridge, path, lockfile).await
}

/// Serialize `versions` as the legacy `{ "<v>": "<v>" }` manifest.
pub async fn write_manifest(bridge: &Bridge, path: &str, versions: &[String]) -> Result<()> {
    let manifest: BTreeMap<&str, &str> = versions
        .iter()
        .map(|v| (v.as_str(), v.as_str()))
        .collect();
    write_document(bridge, path, &manifest).await
}

/// Read the legacy manifest, returning its versions sorted.
pub async fn read_manifest(bridge: &Bridge, path: &str) -> Result<Vec<String>> {
    let invalid = |reason: String| StoreError::InvalidManifest {
        path: path.to_string(),
        reason,
    };
    let content = read_document(bridge, path, invalid).await?;
    let manifest: BTreeMap<String, String> =
        serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;

    if let Some((key, value)) = manifest.iter().find(|(k, v)| k != v) {
        return Err(invalid(format!("entry {} maps to {}", key, value)));
    }
    Ok(manifest.into_keys().collect())
}

pub async fn read_snapshot(bridge: &Bridge, path: &str) -> Result<Snapshot> {
    let invalid = |reason: String| StoreError::InvalidLockfile {
        path: path.to_string(),
        reason: format!("invalid snapshot: {}", reason),
    };
    let content = read_document(bridge, path, invalid).await?;
    serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))
}

pub async fn write_snapshot(bridge: &Bridge, path: &str, snapshot: &Snapshot) -> Result<()> {
    write_document(bridge, path, snapshot).await
}
