//! Bulk download of version file sets into the bridge
//!
//! For every target version the expected file list comes from the remote
//! tree, filtered. Files already stored are skipped unless `force` is set;
//! the rest are fetched under a bounded concurrency limit. Each file's
//! outcome is recorded on its own, so a failed download never aborts the
//! rest of the batch. Afterwards the version's snapshot and lockfile entry
//! are rewritten.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::bridge::{require, BridgeError, Capability, StorageBridge};
use crate::concurrency::run_bounded;
use crate::context::StoreContext;
use crate::error::{Result, StoreError};
use crate::filter::PathFilter;
use crate::hash::{content_hash, file_hash};
use crate::lockfile::{read_snapshot, snapshot_path, write_snapshot, Snapshot, SnapshotFile};
use crate::ops::files::{read_remote, remote_tree};
use crate::tree::{flatten_tree, join_path};

#[derive(Debug, Clone, Default)]
pub struct MirrorOptions {
    /// Versions to mirror; all managed versions when `None`
    pub versions: Option<Vec<String>>,
    /// Re-download files that are already stored
    pub force: bool,
    /// In-flight download limit; the store default when `None`
    pub concurrency: Option<usize>,
    /// Per-call filter, ANDed with the store's global filter
    pub filter: Option<PathFilter>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorCounts {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_files: usize,
}

impl MirrorCounts {
    fn add(&mut self, other: &MirrorCounts) {
        self.downloaded += other.downloaded;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.total_files += other.total_files;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorFiles {
    pub downloaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorFileError {
    pub file: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Rates in percent of the version's expected files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorMetrics {
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub failure_rate: f64,
}

impl MirrorMetrics {
    fn from_counts(counts: &MirrorCounts) -> Self {
        if counts.total_files == 0 {
            return Self::default();
        }
        let total = counts.total_files as f64;
        let percent = |n: usize| (n as f64 / total * 10_000.0).round() / 100.0;
        Self {
            success_rate: percent(counts.downloaded + counts.skipped),
            cache_hit_rate: percent(counts.skipped),
            failure_rate: percent(counts.failed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMirrorReport {
    pub version: String,
    pub counts: MirrorCounts,
    pub files: MirrorFiles,
    pub errors: Vec<MirrorFileError>,
    pub metrics: MirrorMetrics,
    /// Bytes held locally for the version after mirroring
    pub total_size: u64,
    pub duration_ms: u64,
}

/// A version whose file list could not be mirrored at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MirrorVersionError {
    pub version: String,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorSummary {
    pub versions_processed: usize,
    pub versions_failed: usize,
    pub counts: MirrorCounts,
    pub total_size: u64,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorReport {
    pub versions: BTreeMap<String, VersionMirrorReport>,
    pub failed_versions: Vec<MirrorVersionError>,
    pub summary: MirrorSummary,
}

impl MirrorReport {
    pub fn version(&self, version: &str) -> Option<&VersionMirrorReport> {
        self.versions.get(version)
    }

    pub fn is_version_failed(&self, version: &str) -> bool {
        self.failed_versions.iter().any(|f| f.version == version)
    }
}

enum Outcome {
    Downloaded(SnapshotFile),
    Skipped(SnapshotFile),
    Failed { reason: String, status: Option<u16> },
}

fn snapshot_entry(content: &str) -> SnapshotFile {
    SnapshotFile {
        hash: content_hash(content),
        file_hash: file_hash(content),
        size: content.len() as u64,
    }
}

/// Mirror the target versions into the bridge.
///
/// A version whose file list cannot be fetched or stored is recorded in
/// `failed_versions` and the batch moves on. The call fails only on missing
/// capabilities or when every target version failed.
pub async fn mirror(ctx: &StoreContext, options: &MirrorOptions) -> Result<MirrorReport> {
    require(
        ctx.bridge(),
        "mirror",
        &[Capability::Read, Capability::Write, Capability::Exists, Capability::Mkdir],
    )?;

    let targets = match &options.versions {
        Some(versions) => versions.clone(),
        None => ctx.versions().to_vec(),
    };
    for version in &targets {
        ctx.ensure_version(version)?;
    }

    let started = Instant::now();
    let mut report = MirrorReport::default();
    let mut first_failure = None;

    for version in &targets {
        match mirror_version(ctx, version, options).await {
            Ok(version_report) => {
                report.summary.counts.add(&version_report.counts);
                report.summary.total_size += version_report.total_size;
                report.summary.versions_processed += 1;
                report.versions.insert(version.clone(), version_report);
            }
            Err(e @ StoreError::CapabilityUnsupported { .. }) => return Err(e),
            Err(e) => {
                log::warn!("Failed to mirror version {}: {}", version, e);
                report.summary.versions_failed += 1;
                report.failed_versions.push(MirrorVersionError {
                    version: version.clone(),
                    reason: e.to_string(),
                    status: e.status(),
                });
                first_failure.get_or_insert(e);
            }
        }
    }

    if report.versions.is_empty() {
        if let Some(e) = first_failure {
            return Err(e);
        }
    }

    report.summary.duration_ms = started.elapsed().as_millis() as u64;
    log::info!(
        "Mirrored {} versions: {} downloaded, {} skipped, {} failed",
        report.summary.versions_processed,
        report.summary.counts.downloaded,
        report.summary.counts.skipped,
        report.summary.counts.failed
    );
    Ok(report)
}

async fn mirror_version(
    ctx: &StoreContext,
    version: &str,
    options: &MirrorOptions,
) -> Result<VersionMirrorReport> {
    let started = Instant::now();
    let chain = ctx.filter_chain(options.filter.as_ref());
    let expected = flatten_tree(&chain.filter_tree(&remote_tree(ctx, version).await?));
    log::debug!("Mirroring {} ({} expected files)", version, expected.len());

    ctx.bridge().mkdir(version).await?;
    let previous = read_snapshot(ctx.bridge(), &snapshot_path(version)).await.ok();
    let concurrency = options.concurrency.unwrap_or_else(|| ctx.concurrency());

    let outcomes = run_bounded(expected.clone(), concurrency, |file: String| {
        let previous = previous.as_ref();
        async move {
            let outcome = mirror_file(ctx, version, &file, options.force, previous).await;
            (file, outcome)
        }
    })
    .await;

    let mut counts = MirrorCounts {
        total_files: expected.len(),
        ..MirrorCounts::default()
    };
    let mut files = MirrorFiles::default();
    let mut errors = Vec::new();
    let mut snapshot = Snapshot::new(version);

    for (file, outcome) in outcomes {
        match outcome {
            Outcome::Downloaded(entry) => {
                counts.downloaded += 1;
                files.downloaded.push(file.clone());
                snapshot.files.insert(file, entry);
            }
            Outcome::Skipped(entry) => {
                counts.skipped += 1;
                files.skipped.push(file.clone());
                snapshot.files.insert(file, entry);
            }
            Outcome::Failed { reason, status } => {
                log::warn!("Failed to mirror {}/{}: {}", version, file, reason);
                counts.failed += 1;
                files.failed.push(file.clone());
                errors.push(MirrorFileError { file, reason, status });
            }
        }
    }

    write_snapshot(ctx.bridge(), &snapshot_path(version), &snapshot).await?;

    let total_size = snapshot.total_size();
    let mut lockfile = ctx.load_lockfile().await?;
    lockfile.record_mirror(version, snapshot.files.len() as u64, total_size);
    ctx.save_lockfile(&lockfile).await?;

    Ok(VersionMirrorReport {
        version: version.to_string(),
        metrics: MirrorMetrics::from_counts(&counts),
        counts,
        files,
        errors,
        total_size,
        duration_ms: started.elapsed().as_millis() as u64,
    })
}

async fn mirror_file(
    ctx: &StoreContext,
    version: &str,
    file: &str,
    force: bool,
    previous: Option<&Snapshot>,
) -> Outcome {
    let local_path = join_path(version, file);

    if !force {
        match ctx.bridge().exists(&local_path).await {
            Ok(true) => {
                if let Some(entry) = previous.and_then(|s| s.files.get(file)) {
                    return Outcome::Skipped(entry.clone());
                }
                match ctx.bridge().read(&local_path).await {
                    Ok(content) => return Outcome::Skipped(snapshot_entry(&content)),
                    Err(e) => log::debug!("Re-downloading unreadable {}: {}", local_path, e),
                }
            }
            Ok(false) => {}
            Err(e) => log::debug!("Could not probe {}: {}", local_path, e),
        }
    }

    let content = match read_remote(ctx, version, file).await {
        Ok(content) => content,
        Err(StoreError::ApiFallbackFailed { reason, status, .. }) => {
            return Outcome::Failed { reason, status };
        }
        Err(e) => {
            return Outcome::Failed {
                reason: e.to_string(),
                status: e.status(),
            };
        }
    };

    if let Err(e) = write_local(ctx, &local_path, &content).await {
        return Outcome::Failed {
            reason: e.to_string(),
            status: None,
        };
    }
    Outcome::Downloaded(snapshot_entry(&content))
}

async fn write_local(ctx: &StoreContext, path: &str, content: &str) -> std::result::Result<(), BridgeError> {
    if let Some((parent, _)) = path.rsplit_once('/') {
        ctx.bridge().mkdir(parent).await?;
    }
    ctx.bridge().write(path, content).await
}
