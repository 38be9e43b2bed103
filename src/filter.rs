//! Include/exclude path filtering
//!
//! A [`PathFilter`] compiles include and exclude glob lists into one
//! predicate. A path passes when it matches at least one include pattern
//! (an empty include list matches everything) and no exclude pattern.
//!
//! Patterns follow a few conventions:
//!
//! - `*` does not cross `/`; use `**` for recursive matches.
//! - A pattern without a `/` matches at any depth (`*.txt` behaves like
//!   `**/*.txt`).
//! - A trailing `/` selects a directory and everything below it.
//!
//! The store keeps a global filter and operations may take a per-call
//! filter; [`FilterChain`] ANDs them together.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tree::{join_path, EntryType, TreeNode};

/// Exclusions applied to the global filter unless disabled.
pub const DEFAULT_EXCLUSIONS: &[&str] = &["**/*.zip", "**/*.pdf"];

#[derive(Error, Debug)]
#[error("failed to compile filter pattern '{pattern}': {source}")]
pub struct FilterError {
    pattern: String,
    #[source]
    source: globset::Error,
}

impl FilterError {
    /// Returns the offending pattern.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

/// Serializable filter settings, as stored in the config and the lockfile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub disable_default_exclusions: bool,
}

impl FilterConfig {
    /// The exclude list with default exclusions applied.
    pub fn effective_exclude(&self) -> Vec<String> {
        let mut exclude = self.exclude.clone();
        if !self.disable_default_exclusions {
            for pattern in DEFAULT_EXCLUSIONS {
                if !exclude.iter().any(|p| p == pattern) {
                    exclude.push((*pattern).to_string());
                }
            }
        }
        exclude
    }
}

/// A compiled include/exclude predicate.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<String>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl PathFilter {
    /// A filter that accepts every path.
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: None,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }

    pub fn new<I, E, S, T>(include: I, exclude: E) -> Result<Self, FilterError>
    where
        I: IntoIterator<Item = S>,
        E: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let include_patterns: Vec<String> = include.into_iter().map(Into::into).collect();
        let exclude_patterns: Vec<String> = exclude.into_iter().map(Into::into).collect();

        Ok(Self {
            include: compile(&include_patterns)?,
            exclude: compile(&exclude_patterns)?,
            include_patterns,
            exclude_patterns,
        })
    }

    /// Build the store-wide filter from config, including default exclusions.
    pub fn from_config(config: &FilterConfig) -> Result<Self, FilterError> {
        Self::new(config.include.clone(), config.effective_exclude())
    }

    pub fn include_patterns(&self) -> &[String] {
        &self.include_patterns
    }

    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        let included = match &self.include {
            Some(set) => set.is_match(path),
            None => true,
        };
        let excluded = match &self.exclude {
            Some(set) => set.is_match(path),
            None => false,
        };
        included && !excluded
    }

    /// Filter a tree, pruning directories left without any file.
    pub fn filter_tree(&self, nodes: &[TreeNode]) -> Vec<TreeNode> {
        FilterChain::new(self, None).filter_tree(nodes)
    }
}

/// Expand the pattern conventions into globset syntax.
fn expand_pattern(pattern: &str) -> String {
    let mut pattern = pattern.trim_start_matches("./").to_string();
    if let Some(dir) = pattern.strip_suffix('/') {
        pattern = format!("{}/**", dir);
    }
    if let Some(anchored) = pattern.strip_prefix('/') {
        return anchored.to_string();
    }
    if !pattern.contains('/') {
        pattern = format!("**/{}", pattern);
    }
    pattern
}

fn compile(patterns: &[String]) -> Result<Option<GlobSet>, FilterError> {
    if patterns.is_empty() {
        return Ok(None);
    }

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob: Glob = GlobBuilder::new(&expand_pattern(pattern))
            .literal_separator(true)
            .build()
            .map_err(|source| FilterError {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }

    builder.build().map(Some).map_err(|source| FilterError {
        pattern: patterns.join(","),
        source,
    })
}

/// The global filter ANDed with an optional per-call filter.
#[derive(Debug, Clone, Copy)]
pub struct FilterChain<'a> {
    global: &'a PathFilter,
    extra: Option<&'a PathFilter>,
}

impl<'a> FilterChain<'a> {
    pub fn new(global: &'a PathFilter, extra: Option<&'a PathFilter>) -> Self {
        Self { global, extra }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.global.matches(path) && self.extra.map_or(true, |f| f.matches(path))
    }

    pub fn filter_paths(&self, paths: Vec<String>) -> Vec<String> {
        paths.into_iter().filter(|p| self.matches(p)).collect()
    }

    pub fn filter_tree(&self, nodes: &[TreeNode]) -> Vec<TreeNode> {
        self.filter_level(nodes, "")
    }

    fn filter_level(&self, nodes: &[TreeNode], prefix: &str) -> Vec<TreeNode> {
        let mut kept = Vec::new();
        for node in nodes {
            let path = join_path(prefix, &node.name);
            match node.kind {
                EntryType::File => {
                    if self.matches(&path) {
                        kept.push(node.clone());
                    }
                }
                EntryType::Directory => match &node.children {
                    Some(children) => {
                        let children = self.filter_level(children, &path);
                        if !children.is_empty() {
                            let mut dir = node.clone();
                            dir.children = Some(children);
                            kept.push(dir);
                        }
                    }
                    // Shallow listings carry no children to judge by.
                    None => kept.push(node.clone()),
                },
            }
        }
        kept
    }
}
