//! Audit persisted versions against the dataset API

use std::collections::HashSet;

use serde::Serialize;

use crate::bridge::{Capability, StorageBridge};
use crate::context::StoreContext;
use crate::error::Result;
use crate::lockfile::{read_lockfile, read_manifest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResult {
    /// Every recorded version is still offered remotely
    pub valid: bool,
    pub recorded_versions: Vec<String>,
    pub available_versions: Vec<String>,
    /// Recorded but no longer offered remotely
    pub missing_versions: Vec<String>,
    /// Offered remotely but not recorded; informational
    pub extra_versions: Vec<String>,
}

/// The persisted version set: lockfile, then legacy manifest, then the
/// versions held by the context.
async fn recorded_versions(ctx: &StoreContext) -> Result<Vec<String>> {
    let bridge = ctx.bridge();
    if bridge
        .capabilities()
        .supports_all(&[Capability::Read, Capability::Exists])
    {
        if bridge.exists(ctx.lockfile_path()).await? {
            return Ok(read_lockfile(bridge, ctx.lockfile_path()).await?.version_keys());
        }
        if bridge.exists(ctx.manifest_path()).await? {
            return read_manifest(bridge, ctx.manifest_path()).await;
        }
    }
    Ok(ctx.versions().to_vec())
}

pub async fn verify(ctx: &StoreContext) -> Result<VerifyResult> {
    let recorded = recorded_versions(ctx).await?;
    let available: Vec<String> = ctx
        .api()
        .list_versions()
        .await?
        .into_iter()
        .map(|v| v.version)
        .collect();

    let available_set: HashSet<&str> = available.iter().map(String::as_str).collect();
    let recorded_set: HashSet<&str> = recorded.iter().map(String::as_str).collect();

    let missing: Vec<String> = recorded
        .iter()
        .filter(|v| !available_set.contains(v.as_str()))
        .cloned()
        .collect();
    let extra: Vec<String> = available
        .iter()
        .filter(|v| !recorded_set.contains(v.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        log::warn!("Recorded versions no longer available: {:?}", missing);
    }

    Ok(VerifyResult {
        valid: missing.is_empty(),
        recorded_versions: recorded,
        available_versions: available,
        missing_versions: missing,
        extra_versions: extra,
    })
}
