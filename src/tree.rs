//! File tree nodes shared by bridge listings and the dataset API

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

/// A single node of a listing or remote file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryType,
    /// Milliseconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

impl TreeNode {
    pub fn file(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryType::File,
            last_modified: None,
            children: None,
        }
    }

    pub fn directory(
        name: impl Into<String>,
        path: impl Into<String>,
        children: Vec<TreeNode>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind: EntryType::Directory,
            last_modified: None,
            children: Some(children),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryType::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == EntryType::Directory
    }
}

/// Flatten a tree into `/`-joined file paths relative to the tree root.
///
/// Paths are built from node names rather than the `path` field so remote
/// and local trees flatten to the same relative form. The result is sorted.
pub fn flatten_tree(nodes: &[TreeNode]) -> Vec<String> {
    let mut files = Vec::new();
    collect_files(nodes, "", &mut files);
    files.sort();
    files
}

fn collect_files(nodes: &[TreeNode], prefix: &str, out: &mut Vec<String>) {
    for node in nodes {
        let path = join_path(prefix, &node.name);
        match node.kind {
            EntryType::File => out.push(path),
            EntryType::Directory => {
                if let Some(children) = &node.children {
                    collect_files(children, &path, out);
                }
            }
        }
    }
}

/// Build a tree from flat `/`-separated file paths.
pub fn tree_from_paths<S: AsRef<str>>(paths: &[S]) -> Vec<TreeNode> {
    let mut root: Vec<TreeNode> = Vec::new();
    for path in paths {
        let parts: Vec<&str> = path
            .as_ref()
            .split('/')
            .filter(|p| !p.is_empty())
            .collect();
        insert_path(&mut root, "", &parts);
    }
    root
}

fn insert_path(level: &mut Vec<TreeNode>, prefix: &str, parts: &[&str]) {
    let Some((first, rest)) = parts.split_first() else {
        return;
    };
    let path = join_path(prefix, first);

    if rest.is_empty() {
        if !level.iter().any(|n| n.name == *first && n.is_file()) {
            level.push(TreeNode::file(*first, path));
        }
        return;
    }

    let index = match level.iter().position(|n| n.name == *first && n.is_directory()) {
        Some(index) => index,
        None => {
            level.push(TreeNode::directory(*first, path.clone(), Vec::new()));
            level.len() - 1
        }
    };
    let children = level[index].children.get_or_insert_with(Vec::new);
    insert_path(children, &path, rest);
}

/// Join two `/`-separated path fragments, ignoring empty ones.
pub fn join_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => prefix.to_string(),
        _ => format!("{}/{}", prefix, name),
    }
}
