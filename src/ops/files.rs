//! Per-version file reads: get, list and tree
//!
//! Reads are local first. When the bridge does not have the file or the
//! version directory, the dataset API is consulted only if the caller
//! allows it. Local and remote results are never merged.

use serde::{Deserialize, Serialize};

use crate::bridge::{BridgeError, Capability, StorageBridge};
use crate::context::StoreContext;
use crate::error::{Result, StoreError};
use crate::filter::{FilterChain, PathFilter};
use crate::lockfile::SNAPSHOT_FILE_NAME;
use crate::tree::{flatten_tree, EntryType, TreeNode};
use crate::version::remote_file_path;

#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Fall back to the dataset API when the file is not stored locally
    pub allow_api: bool,
    /// Per-call filter, ANDed with the store's global filter
    pub filter: Option<PathFilter>,
}

impl FileOptions {
    pub fn with_api() -> Self {
        Self {
            allow_api: true,
            filter: None,
        }
    }
}

/// Where to read a side of an operation from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMode {
    /// Local storage when present, the API otherwise
    #[default]
    PreferLocal,
    Local,
    Api,
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches("./").trim_start_matches('/')
}

/// Get the content of a file of a managed version.
pub async fn get_file(
    ctx: &StoreContext,
    version: &str,
    path: &str,
    options: &FileOptions,
) -> Result<String> {
    ctx.ensure_version(version)?;
    let chain = ctx.filter_chain(options.filter.as_ref());
    let path = normalize(path);
    if path == SNAPSHOT_FILE_NAME || !chain.matches(path) {
        return Err(StoreError::FilterRejected(path.to_string()));
    }

    match read_local(ctx, version, path).await {
        Ok(Some(content)) => return Ok(content),
        Ok(None) => {}
        Err(e) if options.allow_api && !is_traversal(&e) => {
            log::warn!("Local read of {}/{} failed, using API: {}", version, path, e);
        }
        Err(e) => return Err(e),
    }

    if !options.allow_api {
        return Err(StoreError::NotFoundLocally {
            version: version.to_string(),
            path: path.to_string(),
        });
    }
    read_remote(ctx, version, path).await
}

/// The filtered file tree of a managed version.
pub async fn get_file_tree(
    ctx: &StoreContext,
    version: &str,
    options: &FileOptions,
) -> Result<Vec<TreeNode>> {
    ctx.ensure_version(version)?;
    let chain = ctx.filter_chain(options.filter.as_ref());
    let mode = if options.allow_api {
        SourceMode::PreferLocal
    } else {
        SourceMode::Local
    };
    tree_with_mode(ctx, version, &chain, mode).await
}

/// Sorted file paths of a managed version.
pub async fn list_files(
    ctx: &StoreContext,
    version: &str,
    options: &FileOptions,
) -> Result<Vec<String>> {
    let tree = get_file_tree(ctx, version, options).await?;
    Ok(flatten_tree(&tree))
}

fn is_traversal(err: &StoreError) -> bool {
    matches!(err, StoreError::Bridge(BridgeError::PathTraversal(_)))
}

/// Read a stored file; `None` when the bridge does not have it.
pub(crate) async fn read_local(ctx: &StoreContext, version: &str, path: &str) -> Result<Option<String>> {
    if !ctx.bridge().capabilities().supports(Capability::Read) {
        return Ok(None);
    }
    match ctx.bridge().read(&ctx.storage_path(version, path)).await {
        Ok(content) => Ok(Some(content)),
        Err(BridgeError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Fetch a file from the dataset API.
pub(crate) async fn read_remote(ctx: &StoreContext, version: &str, path: &str) -> Result<String> {
    let remote = remote_file_path(version, path, ctx.ucd_folder_threshold());
    ctx.api()
        .get_file(&remote)
        .await
        .map_err(|e| StoreError::ApiFallbackFailed {
            version: version.to_string(),
            path: path.to_string(),
            reason: e.message,
            status: e.status,
        })
}

/// Read a file from the side selected by `mode`.
pub(crate) async fn read_with_mode(
    ctx: &StoreContext,
    version: &str,
    path: &str,
    mode: SourceMode,
) -> Result<String> {
    match mode {
        SourceMode::Api => read_remote(ctx, version, path).await,
        SourceMode::Local => read_local(ctx, version, path)
            .await?
            .ok_or_else(|| StoreError::NotFoundLocally {
                version: version.to_string(),
                path: path.to_string(),
            }),
        SourceMode::PreferLocal => match read_local(ctx, version, path).await? {
            Some(content) => Ok(content),
            None => read_remote(ctx, version, path).await,
        },
    }
}

/// Drop the snapshot document from the top level of a version listing.
fn strip_reserved(nodes: Vec<TreeNode>) -> Vec<TreeNode> {
    nodes
        .into_iter()
        .filter(|n| !(n.kind == EntryType::File && n.name == SNAPSHOT_FILE_NAME))
        .collect()
}

/// The unfiltered local tree of a version; `None` when it is not stored.
pub(crate) async fn local_tree(ctx: &StoreContext, version: &str) -> Result<Option<Vec<TreeNode>>> {
    let bridge = ctx.bridge();
    if !bridge
        .capabilities()
        .supports_all(&[Capability::Exists, Capability::Listdir])
    {
        return Ok(None);
    }

    let dir = ctx.storage_dir(version);
    match bridge.exists(&dir).await {
        Ok(true) => {}
        Ok(false) => return Ok(None),
        Err(e) => {
            log::debug!("Could not probe local version {}: {}", version, e);
            return Ok(None);
        }
    }

    match bridge.listdir(&dir, true).await {
        Ok(nodes) => Ok(Some(strip_reserved(nodes))),
        Err(e) => {
            log::debug!("Could not list local version {}: {}", version, e);
            Ok(None)
        }
    }
}

/// The unfiltered remote tree of a version.
pub(crate) async fn remote_tree(ctx: &StoreContext, version: &str) -> Result<Vec<TreeNode>> {
    ctx.api()
        .get_file_tree(version)
        .await
        .map_err(|e| StoreError::ApiFallbackFailed {
            version: version.to_string(),
            path: String::new(),
            reason: e.message,
            status: e.status,
        })
}

/// The filtered tree of a version from the side selected by `mode`.
pub(crate) async fn tree_with_mode(
    ctx: &StoreContext,
    version: &str,
    chain: &FilterChain<'_>,
    mode: SourceMode,
) -> Result<Vec<TreeNode>> {
    let nodes = match mode {
        SourceMode::Api => remote_tree(ctx, version).await?,
        SourceMode::Local => local_tree(ctx, version).await?.unwrap_or_default(),
        SourceMode::PreferLocal => match local_tree(ctx, version).await? {
            Some(nodes) => nodes,
            None => remote_tree(ctx, version).await?,
        },
    };
    Ok(chain.filter_tree(&nodes))
}
