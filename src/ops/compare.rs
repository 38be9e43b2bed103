//! Cross-version comparison
//!
//! Paths present on one side only are `added` or `removed`. Paths on both
//! sides are hashed (unless hashing is disabled) and classified as
//! `modified` or `unchanged`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::concurrency::run_bounded;
use crate::context::StoreContext;
use crate::error::Result;
use crate::filter::PathFilter;
use crate::hash::content_hash;
use crate::ops::files::{read_with_mode, tree_with_mode, SourceMode};
use crate::tree::flatten_tree;

#[derive(Debug, Clone)]
pub struct CompareOptions {
    /// Hash files present on both sides; trust them as unchanged otherwise
    pub include_file_hashes: bool,
    pub concurrency: Option<usize>,
    pub from_mode: SourceMode,
    pub to_mode: SourceMode,
    pub filter: Option<PathFilter>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            include_file_hashes: true,
            concurrency: None,
            from_mode: SourceMode::PreferLocal,
            to_mode: SourceMode::PreferLocal,
            filter: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSize {
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub file: String,
    pub from: FileSize,
    pub to: FileSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionComparison {
    pub from: String,
    pub to: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: usize,
    pub changes: Vec<FileChange>,
}

/// Compare the file sets of two managed versions.
pub async fn compare(
    ctx: &StoreContext,
    from: &str,
    to: &str,
    options: &CompareOptions,
) -> Result<VersionComparison> {
    ctx.ensure_version(from)?;
    ctx.ensure_version(to)?;

    let chain = ctx.filter_chain(options.filter.as_ref());
    let from_files: BTreeSet<String> = flatten_tree(&tree_with_mode(ctx, from, &chain, options.from_mode).await?)
        .into_iter()
        .collect();
    let to_files: BTreeSet<String> = flatten_tree(&tree_with_mode(ctx, to, &chain, options.to_mode).await?)
        .into_iter()
        .collect();

    let added: Vec<String> = to_files.difference(&from_files).cloned().collect();
    let removed: Vec<String> = from_files.difference(&to_files).cloned().collect();
    let common: Vec<String> = from_files.intersection(&to_files).cloned().collect();

    log::debug!(
        "Comparing {} -> {}: {} added, {} removed, {} in common",
        from,
        to,
        added.len(),
        removed.len(),
        common.len()
    );

    if !options.include_file_hashes {
        return Ok(VersionComparison {
            from: from.to_string(),
            to: to.to_string(),
            added,
            removed,
            modified: Vec::new(),
            unchanged: common.len(),
            changes: Vec::new(),
        });
    }

    let concurrency = options.concurrency.unwrap_or_else(|| ctx.concurrency());
    let hashed = run_bounded(common, concurrency, |file: String| async move {
        let left = read_with_mode(ctx, from, &file, options.from_mode).await?;
        let right = read_with_mode(ctx, to, &file, options.to_mode).await?;
        let change = if content_hash(&left) == content_hash(&right) {
            None
        } else {
            Some(FileChange {
                file: file.clone(),
                from: FileSize { size: left.len() as u64 },
                to: FileSize { size: right.len() as u64 },
            })
        };
        Ok::<_, crate::error::StoreError>(change)
    })
    .await;

    let mut unchanged = 0;
    let mut changes = Vec::new();
    for result in hashed {
        match result? {
            Some(change) => changes.push(change),
            None => unchanged += 1,
        }
    }
    // Inputs come from a sorted set and run_bounded keeps order.
    let modified = changes.iter().map(|c| c.file.clone()).collect();

    Ok(VersionComparison {
        from: from.to_string(),
        to: to.to_string(),
        added,
        removed,
        modified,
        unchanged,
        changes,
    })
}
