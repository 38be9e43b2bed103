//! Local audit of mirrored versions against their snapshots

use std::collections::BTreeSet;

use serde::Serialize;

use crate::bridge::{require, Capability};
use crate::context::StoreContext;
use crate::error::Result;
use crate::hash::file_hash;
use crate::lockfile::{read_snapshot, snapshot_path, Snapshot};
use crate::ops::files::{local_tree, read_local};
use crate::tree::flatten_tree;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionAnalysis {
    pub version: String,
    /// Files stored locally, snapshot excluded
    pub file_count: usize,
    /// Bytes stored locally, snapshot excluded
    pub total_size: u64,
    pub snapshot_present: bool,
    /// In the snapshot but not stored
    pub missing: Vec<String>,
    /// Stored but not in the snapshot
    pub orphaned: Vec<String>,
    /// Stored with content differing from the snapshot
    pub modified: Vec<String>,
    pub complete: bool,
}

/// Audit the given versions, or every managed version when `None`.
pub async fn analyze(ctx: &StoreContext, versions: Option<&[String]>) -> Result<Vec<VersionAnalysis>> {
    require(ctx.bridge(), "analyze", &[Capability::Read, Capability::Exists, Capability::Listdir])?;

    let targets = versions.unwrap_or_else(|| ctx.versions()).to_vec();
    for version in &targets {
        ctx.ensure_version(version)?;
    }

    let mut analyses = Vec::with_capacity(targets.len());
    for version in &targets {
        analyses.push(analyze_version(ctx, version).await?);
    }
    Ok(analyses)
}

async fn analyze_version(ctx: &StoreContext, version: &str) -> Result<VersionAnalysis> {
    let stored: BTreeSet<String> = match local_tree(ctx, version).await? {
        Some(nodes) => flatten_tree(&nodes).into_iter().collect(),
        None => BTreeSet::new(),
    };
    let snapshot = read_snapshot(ctx.bridge(), &snapshot_path(version)).await.ok();
    let snapshot_present = snapshot.is_some();
    let snapshot = snapshot.unwrap_or_else(|| Snapshot::new(version));
    let recorded: BTreeSet<String> = snapshot.files.keys().cloned().collect();

    let missing: Vec<String> = recorded.difference(&stored).cloned().collect();
    let orphaned: Vec<String> = stored.difference(&recorded).cloned().collect();

    let mut total_size = 0;
    let mut modified = Vec::new();
    for file in &stored {
        let Some(content) = read_local(ctx, version, file).await? else {
            continue;
        };
        total_size += content.len() as u64;
        if let Some(entry) = snapshot.files.get(file) {
            if entry.file_hash != file_hash(&content) {
                modified.push(file.clone());
            }
        }
    }

    let complete = snapshot_present && missing.is_empty() && modified.is_empty();
    log::debug!(
        "Analyzed {}: {} files, {} missing, {} orphaned, {} modified",
        version,
        stored.len(),
        missing.len(),
        orphaned.len(),
        modified.len()
    );

    Ok(VersionAnalysis {
        version: version.to_string(),
        file_count: stored.len(),
        total_size,
        snapshot_present,
        missing,
        orphaned,
        modified,
        complete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::api::SimulatedUcdApi;
    use crate::bridge::{Bridge, NodeBridge};
    use crate::config::StoreConfig;
    use crate::ops::mirror::{mirror, MirrorOptions};

    fn context(dir: &tempfile::TempDir) -> StoreContext {
        let api = SimulatedUcdApi::new();
        api.add_version("16.0.0", &[("Blocks.txt", "blocks"), ("emoji/emoji-data.txt", "emoji")]);
        StoreContext::new(
            StoreConfig::new(dir.path()),
            Arc::new(api),
            Bridge::Node(NodeBridge::new(dir.path())),
            vec!["16.0.0".to_string()],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_mirror_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        mirror(&ctx, &MirrorOptions::default()).await.unwrap();

        let analyses = analyze(&ctx, None).await.unwrap();
        assert_eq!(analyses.len(), 1);
        let analysis = &analyses[0];
        assert!(analysis.complete);
        assert_eq!(analysis.file_count, 2);
        assert_eq!(analysis.total_size, 11);
    }

    #[tokio::test]
    async fn test_reports_drift() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);
        mirror(&ctx, &MirrorOptions::default()).await.unwrap();

        std::fs::remove_file(dir.path().join("16.0.0/emoji/emoji-data.txt")).unwrap();
        std::fs::write(dir.path().join("16.0.0/Blocks.txt"), "edited").unwrap();
        std::fs::write(dir.path().join("16.0.0/Extra.txt"), "extra").unwrap();

        let analysis = analyze(&ctx, None).await.unwrap().remove(0);
        assert!(!analysis.complete);
        assert_eq!(analysis.missing, vec!["emoji/emoji-data.txt"]);
        assert_eq!(analysis.orphaned, vec!["Extra.txt"]);
        assert_eq!(analysis.modified, vec!["Blocks.txt"]);
    }

    #[tokio::test]
    async fn test_unmirrored_version() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(&dir);

        let analysis = analyze(&ctx, None).await.unwrap().remove(0);
        assert!(!analysis.snapshot_present);
        assert!(!analysis.complete);
        assert_eq!(analysis.file_count, 0);
    }
}
