//! Version conflict resolution
//!
//! Reconciles the versions a caller asks for with the versions recorded in
//! the lockfile, using one of three strategies:
//!
//! - `strict`: both sides must hold the same set of versions.
//! - `merge`: the union of both sides becomes the recorded set.
//! - `overwrite`: the provided versions replace the recorded set.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::bridge::Bridge;
use crate::error::{Result, StoreError};
use crate::lockfile::{write_lockfile, write_manifest, Lockfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    #[default]
    Strict,
    Merge,
    Overwrite,
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Strict => "strict",
            Self::Merge => "merge",
            Self::Overwrite => "overwrite",
        };
        f.write_str(name)
    }
}

impl FromStr for ConflictStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "strict" => Ok(Self::Strict),
            "merge" => Ok(Self::Merge),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown conflict strategy: {}", other)),
        }
    }
}

/// Outcome of reconciling two version lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub versions: Vec<String>,
    /// Whether the recorded set has to be rewritten
    pub changed: bool,
}

fn dedup(versions: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    versions
        .iter()
        .filter(|v| seen.insert(v.as_str()))
        .cloned()
        .collect()
}

fn same_set(a: &[String], b: &[String]) -> bool {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    a == b
}

/// Reconcile `provided` against `persisted` without touching storage.
pub fn reconcile(
    strategy: ConflictStrategy,
    provided: &[String],
    persisted: &[String],
) -> Result<Resolution> {
    let provided = dedup(provided);
    let persisted = dedup(persisted);

    match strategy {
        ConflictStrategy::Strict => {
            if !same_set(&provided, &persisted) {
                return Err(StoreError::VersionConflict { persisted, provided });
            }
            Ok(Resolution {
                versions: persisted,
                changed: false,
            })
        }
        ConflictStrategy::Merge => {
            let mut versions = persisted.clone();
            for version in &provided {
                if !versions.contains(version) {
                    versions.push(version.clone());
                }
            }
            let changed = versions.len() != persisted.len();
            Ok(Resolution { versions, changed })
        }
        ConflictStrategy::Overwrite => {
            let changed = !same_set(&provided, &persisted);
            Ok(Resolution {
                versions: provided,
                changed,
            })
        }
    }
}

/// Reconcile against the lockfile and rewrite the lockfile and manifest
/// when the strategy changes the recorded set.
pub async fn resolve_versions(
    bridge: &Bridge,
    lockfile_path: &str,
    manifest_path: &str,
    lockfile: &mut Lockfile,
    strategy: ConflictStrategy,
    provided: &[String],
) -> Result<Vec<String>> {
    let persisted = lockfile.version_keys();
    let resolution = reconcile(strategy, provided, &persisted)?;

    if resolution.changed {
        log::info!(
            "Resolving versions with {} strategy: {:?} -> {:?}",
            strategy,
            persisted,
            resolution.versions
        );
        lockfile.retain_versions(&resolution.versions);
        write_lockfile(bridge, lockfile_path, lockfile).await?;
        write_manifest(bridge, manifest_path, &resolution.versions).await?;
    }

    Ok(resolution.versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::NodeBridge;
    use crate::lockfile::{read_lockfile, read_manifest};

    fn v(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_strict_accepts_reordered_set() {
        let persisted = v(&["16.0.0", "15.1.0", "15.0.0"]);
        let mut provided = persisted.clone();
        provided.reverse();

        let resolution = reconcile(ConflictStrategy::Strict, &provided, &persisted).unwrap();
        assert_eq!(resolution.versions, persisted);
        assert!(!resolution.changed);
    }

    #[test]
    fn test_strict_collapses_duplicates() {
        let resolution = reconcile(
            ConflictStrategy::Strict,
            &v(&["16.0.0", "16.0.0"]),
            &v(&["16.0.0"]),
        )
        .unwrap();
        assert_eq!(resolution.versions, v(&["16.0.0"]));
    }

    #[test]
    fn test_strict_rejects_extra_or_missing() {
        let persisted = v(&["16.0.0", "15.1.0"]);

        let err = reconcile(ConflictStrategy::Strict, &v(&["16.0.0", "15.1.0", "15.0.0"]), &persisted)
            .unwrap_err();
        match err {
            StoreError::VersionConflict { persisted: p, provided } => {
                assert_eq!(p, persisted);
                assert_eq!(provided.len(), 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            reconcile(ConflictStrategy::Strict, &v(&["16.0.0"]), &persisted),
            Err(StoreError::VersionConflict { .. })
        ));
    }

    #[test]
    fn test_strict_empty_lists() {
        assert!(reconcile(ConflictStrategy::Strict, &[], &[]).is_ok());
        assert!(reconcile(ConflictStrategy::Strict, &[], &v(&["16.0.0"])).is_err());
    }

    #[test]
    fn test_merge_is_union() {
        let resolution = reconcile(
            ConflictStrategy::Merge,
            &v(&["15.0.0", "16.0.0"]),
            &v(&["16.0.0", "15.1.0"]),
        )
        .unwrap();
        assert_eq!(resolution.versions, v(&["16.0.0", "15.1.0", "15.0.0"]));
        assert!(resolution.changed);

        let noop = reconcile(ConflictStrategy::Merge, &[], &v(&["16.0.0"])).unwrap();
        assert_eq!(noop.versions, v(&["16.0.0"]));
        assert!(!noop.changed);
    }

    #[test]
    fn test_overwrite_replaces() {
        let resolution = reconcile(
            ConflictStrategy::Overwrite,
            &v(&["15.0.0"]),
            &v(&["16.0.0", "15.1.0"]),
        )
        .unwrap();
        assert_eq!(resolution.versions, v(&["15.0.0"]));
        assert!(resolution.changed);

        let cleared = reconcile(ConflictStrategy::Overwrite, &[], &v(&["16.0.0"])).unwrap();
        assert!(cleared.versions.is_empty());
        assert!(cleared.changed);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("merge".parse::<ConflictStrategy>().unwrap(), ConflictStrategy::Merge);
        assert!("lenient".parse::<ConflictStrategy>().is_err());
        assert_eq!(ConflictStrategy::Overwrite.to_string(), "overwrite");
    }

    #[tokio::test]
    async fn test_resolve_rewrites_persisted_state() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::Node(NodeBridge::new(dir.path()));
        let mut lockfile = Lockfile::with_versions(&v(&["16.0.0"]));
        lockfile.record_mirror("16.0.0", 2, 20);

        let versions = resolve_versions(
            &bridge,
            "lock",
            "manifest",
            &mut lockfile,
            ConflictStrategy::Merge,
            &v(&["15.1.0"]),
        )
        .await
        .unwrap();
        assert_eq!(versions, v(&["16.0.0", "15.1.0"]));

        let persisted = read_lockfile(&bridge, "lock").await.unwrap();
        assert_eq!(persisted.versions["16.0.0"].file_count, 2);
        assert_eq!(persisted.versions["15.1.0"].file_count, 0);
        assert_eq!(read_manifest(&bridge, "manifest").await.unwrap(), v(&["15.1.0", "16.0.0"]));
    }

    #[tokio::test]
    async fn test_strict_conflict_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Bridge::Node(NodeBridge::new(dir.path()));
        let mut lockfile = Lockfile::with_versions(&v(&["16.0.0"]));

        let result = resolve_versions(
            &bridge,
            "lock",
            "manifest",
            &mut lockfile,
            ConflictStrategy::Strict,
            &v(&["15.1.0"]),
        )
        .await;
        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
        assert!(!dir.path().join("lock").exists());
    }
}
