//! Version synchronisation
//!
//! Reconciles the versions the API currently offers with the lockfile,
//! mirrors the versions that still need files, and optionally prunes
//! versions the API dropped and local files no longer expected.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bridge::{require, Capability, StorageBridge};
use crate::context::StoreContext;
use crate::error::{Result, StoreError};
use crate::filter::PathFilter;
use crate::lockfile::{read_snapshot, snapshot_path, write_manifest, write_snapshot};
use crate::ops::files::{local_tree, remote_tree};
use crate::ops::mirror::{mirror, MirrorOptions, MirrorReport};
use crate::tree::{flatten_tree, join_path};

#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Versions to sync; all managed versions when `None`
    pub versions: Option<Vec<String>>,
    /// Re-mirror every available target, not just those missing files
    pub force: bool,
    pub concurrency: Option<usize>,
    pub filter: Option<PathFilter>,
    /// Drop versions the API no longer lists from the lockfile
    pub remove_unavailable: bool,
    /// Also delete the directories of dropped versions
    pub delete_unavailable_files: bool,
    /// Delete local files absent from the filtered remote file set
    pub clean_orphaned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub unchanged: Vec<String>,
    /// Recorded versions the API no longer lists, kept because
    /// `remove_unavailable` was not set
    pub unavailable: Vec<String>,
    /// Versions the store manages after the sync
    pub versions: Vec<String>,
    pub removed_files: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mirror_report: Option<MirrorReport>,
    pub timestamp: DateTime<Utc>,
}

/// Synchronise the store with the versions the API offers.
pub async fn sync(ctx: &mut StoreContext, options: &SyncOptions) -> Result<SyncResult> {
    require(
        ctx.bridge(),
        "sync",
        &[Capability::Read, Capability::Write, Capability::Exists, Capability::Mkdir],
    )?;
    if options.clean_orphaned {
        require(ctx.bridge(), "sync", &[Capability::Listdir, Capability::Remove])?;
    }

    let remote = ctx.api().list_versions().await?;
    let available: HashSet<&str> = remote.iter().map(|v| v.version.as_str()).collect();

    let targets = match &options.versions {
        Some(versions) => {
            let mut seen = HashSet::new();
            versions
                .iter()
                .filter(|v| seen.insert(v.as_str()))
                .cloned()
                .collect::<Vec<_>>()
        }
        None => ctx.versions().to_vec(),
    };
    if let Some(unknown) = targets
        .iter()
        .find(|v| !ctx.has_version(v) && !available.contains(v.as_str()))
    {
        return Err(StoreError::VersionNotFound(unknown.clone()));
    }

    let mut lockfile = ctx.load_lockfile().await?;
    let mut added = Vec::new();
    let mut removed = Vec::new();
    let mut unchanged = Vec::new();
    let mut unavailable = Vec::new();

    for version in &targets {
        if available.contains(version.as_str()) {
            if lockfile.needs_mirror(version) {
                added.push(version.clone());
            } else {
                unchanged.push(version.clone());
            }
        } else if options.remove_unavailable {
            removed.push(version.clone());
        } else {
            unavailable.push(version.clone());
        }
    }

    for version in &added {
        lockfile.ensure_version(version);
    }
    for version in &removed {
        lockfile.remove_version(version);
    }
    ctx.save_lockfile(&lockfile).await?;
    write_manifest(ctx.bridge(), ctx.manifest_path(), &lockfile.version_keys()).await?;

    let mut managed: Vec<String> = ctx
        .versions()
        .iter()
        .filter(|v| !removed.contains(v))
        .cloned()
        .collect();
    managed.extend(added.iter().cloned());
    ctx.set_versions(managed);

    log::info!(
        "Sync: {} added, {} unchanged, {} removed, {} unavailable",
        added.len(),
        unchanged.len(),
        removed.len(),
        unavailable.len()
    );

    if options.delete_unavailable_files && !removed.is_empty() {
        require(ctx.bridge(), "sync", &[Capability::Remove])?;
        for version in &removed {
            if ctx.bridge().exists(version).await? {
                log::info!("Deleting files of unavailable version {}", version);
                ctx.bridge().remove(version).await?;
            }
        }
    }

    let mut to_mirror = added.clone();
    if options.force {
        to_mirror.extend(unchanged.iter().cloned());
    }
    let mirror_report = if to_mirror.is_empty() {
        None
    } else {
        let mirror_options = MirrorOptions {
            versions: Some(to_mirror),
            force: options.force,
            concurrency: options.concurrency,
            filter: options.filter.clone(),
        };
        Some(mirror(ctx, &mirror_options).await?)
    };

    let mut removed_files = BTreeMap::new();
    if options.clean_orphaned {
        let failed = |v: &str| {
            mirror_report
                .as_ref()
                .map_or(false, |report| report.is_version_failed(v))
        };
        for version in added.iter().chain(unchanged.iter()).filter(|v| !failed(v.as_str())) {
            let orphans = clean_orphans(ctx, version, options.filter.as_ref()).await?;
            if !orphans.is_empty() {
                removed_files.insert(version.clone(), orphans);
            }
        }
    }

    Ok(SyncResult {
        added,
        removed,
        unchanged,
        unavailable,
        versions: ctx.versions().to_vec(),
        removed_files,
        mirror_report,
        timestamp: Utc::now(),
    })
}

/// Delete local files of `version` that the filtered remote tree does not
/// list, then drop them from the snapshot and the lockfile totals.
/// Returns the deleted paths, sorted.
async fn clean_orphans(
    ctx: &StoreContext,
    version: &str,
    filter: Option<&PathFilter>,
) -> Result<Vec<String>> {
    let local = match local_tree(ctx, version).await? {
        Some(nodes) => flatten_tree(&nodes),
        None => return Ok(Vec::new()),
    };
    let chain = ctx.filter_chain(filter);
    let expected: BTreeSet<String> = flatten_tree(&chain.filter_tree(&remote_tree(ctx, version).await?))
        .into_iter()
        .collect();

    let mut orphans = Vec::new();
    for file in local {
        if expected.contains(&file) {
            continue;
        }
        ctx.bridge().remove(&join_path(version, &file)).await?;
        log::debug!("Removed orphaned file {}/{}", version, file);
        orphans.push(file);
    }
    if orphans.is_empty() {
        return Ok(orphans);
    }
    log::info!("Removed {} orphaned files from {}", orphans.len(), version);

    let path = snapshot_path(version);
    if ctx.bridge().exists(&path).await? {
        let mut snapshot = read_snapshot(ctx.bridge(), &path).await?;
        for file in &orphans {
            snapshot.files.remove(file);
        }
        write_snapshot(ctx.bridge(), &path, &snapshot).await?;

        let mut lockfile = ctx.load_lockfile().await?;
        lockfile.record_mirror(version, snapshot.files.len() as u64, snapshot.total_size());
        ctx.save_lockfile(&lockfile).await?;
    }
    Ok(orphans)
}
