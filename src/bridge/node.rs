//! Local file system bridge
//!
//! Full read/write bridge rooted at a base directory. All paths are
//! resolved relative to the root and may not escape it.

use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use futures_util::future::{BoxFuture, FutureExt};
use tokio::fs as tokio_fs;

use super::{BridgeError, Capabilities, StorageBridge};
use crate::tree::{join_path, EntryType, TreeNode};

/// A bridge backed by the local file system
#[derive(Debug, Clone)]
pub struct NodeBridge {
    root: PathBuf,
}

impl NodeBridge {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a bridge path to a file system path under the root.
    fn resolve(&self, path: &str) -> Result<PathBuf, BridgeError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(BridgeError::PathTraversal(path.to_string()));
                }
            }
        }
        Ok(resolved)
    }

    fn list_recursive<'a>(
        &'a self,
        dir: PathBuf,
        prefix: String,
        recursive: bool,
    ) -> BoxFuture<'a, Result<Vec<TreeNode>, BridgeError>> {
        async move {
            let mut nodes = Vec::new();
            let mut entries = tokio_fs::read_dir(&dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let metadata = entry.metadata().await?;
                let path = join_path(&prefix, &name);
                let last_modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64);

                if metadata.is_dir() {
                    let children = if recursive {
                        Some(self.list_recursive(entry.path(), path.clone(), true).await?)
                    } else {
                        None
                    };
                    nodes.push(TreeNode {
                        name,
                        path,
                        kind: EntryType::Directory,
                        last_modified,
                        children,
                    });
                } else if metadata.is_file() {
                    nodes.push(TreeNode {
                        name,
                        path,
                        kind: EntryType::File,
                        last_modified,
                        children: None,
                    });
                }
            }

            nodes.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(nodes)
        }
        .boxed()
    }
}

fn map_not_found(err: std::io::Error, path: &str) -> BridgeError {
    if err.kind() == std::io::ErrorKind::NotFound {
        BridgeError::NotFound(path.to_string())
    } else {
        BridgeError::IoError(err)
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio_fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[async_trait]
impl StorageBridge for NodeBridge {
    fn capabilities(&self) -> Capabilities {
        Capabilities::FULL
    }

    async fn read(&self, path: &str) -> Result<String, BridgeError> {
        let resolved = self.resolve(path)?;
        if is_dir(&resolved).await {
            return Err(BridgeError::NotFound(path.to_string()));
        }
        tokio_fs::read_to_string(&resolved)
            .await
            .map_err(|e| map_not_found(e, path))
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), BridgeError> {
        let resolved = self.resolve(path)?;
        tokio_fs::write(&resolved, content)
            .await
            .map_err(|e| map_not_found(e, path))
    }

    async fn exists(&self, path: &str) -> Result<bool, BridgeError> {
        let resolved = self.resolve(path)?;
        Ok(tokio_fs::try_exists(&resolved).await?)
    }

    async fn mkdir(&self, path: &str) -> Result<(), BridgeError> {
        let resolved = self.resolve(path)?;
        tokio_fs::create_dir_all(&resolved).await?;
        Ok(())
    }

    async fn listdir(&self, path: &str, recursive: bool) -> Result<Vec<TreeNode>, BridgeError> {
        let resolved = self.resolve(path)?;
        if !is_dir(&resolved).await {
            return Err(BridgeError::NotFound(path.to_string()));
        }
        let prefix = path.trim_matches('/').to_string();
        self.list_recursive(resolved, prefix, recursive).await
    }

    async fn remove(&self, path: &str) -> Result<(), BridgeError> {
        let resolved = self.resolve(path)?;
        if resolved == self.root {
            return Err(BridgeError::PathTraversal(path.to_string()));
        }
        let metadata = tokio_fs::metadata(&resolved)
            .await
            .map_err(|e| map_not_found(e, path))?;
        if metadata.is_dir() {
            tokio_fs::remove_dir_all(&resolved).await?;
        } else {
            tokio_fs::remove_file(&resolved).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::flatten_tree;

    #[tokio::test]
    async fn test_write_read_exists() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = NodeBridge::new(dir.path());

        bridge.mkdir("16.0.0/auxiliary").await.unwrap();
        bridge.write("16.0.0/auxiliary/a.txt", "hello").await.unwrap();

        assert!(bridge.exists("16.0.0/auxiliary/a.txt").await.unwrap());
        assert!(!bridge.exists("16.0.0/missing.txt").await.unwrap());
        assert_eq!(bridge.read("16.0.0/auxiliary/a.txt").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = NodeBridge::new(dir.path());

        let err = bridge.read("nope.txt").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_directory_and_file_mismatches_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = NodeBridge::new(dir.path());

        bridge.mkdir("v/sub").await.unwrap();
        bridge.write("v/a.txt", "a").await.unwrap();

        assert!(bridge.read("v/sub").await.unwrap_err().is_not_found());
        assert!(bridge.listdir("v/a.txt", false).await.unwrap_err().is_not_found());
        assert!(bridge.listdir("w", true).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = NodeBridge::new(dir.path().join("store"));

        let err = bridge.read("../secret.txt").await.unwrap_err();
        assert!(matches!(err, BridgeError::PathTraversal(_)));
        let err = bridge.write("16.0.0/../../x", "data").await.unwrap_err();
        assert!(matches!(err, BridgeError::PathTraversal(_)));
    }

    #[tokio::test]
    async fn test_listdir_recursive_and_flat() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = NodeBridge::new(dir.path());

        bridge.mkdir("v/sub").await.unwrap();
        bridge.write("v/b.txt", "b").await.unwrap();
        bridge.write("v/sub/a.txt", "a").await.unwrap();

        let shallow = bridge.listdir("v", false).await.unwrap();
        assert_eq!(shallow.len(), 2);
        assert!(shallow.iter().all(|n| n.children.is_none()));

        let deep = bridge.listdir("v", true).await.unwrap();
        assert_eq!(flatten_tree(&deep), vec!["b.txt", "sub/a.txt"]);
        assert_eq!(deep[1].path, "v/sub");
    }

    #[tokio::test]
    async fn test_remove_file_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = NodeBridge::new(dir.path());

        bridge.mkdir("v/sub").await.unwrap();
        bridge.write("v/sub/a.txt", "a").await.unwrap();
        bridge.write("v/b.txt", "b").await.unwrap();

        bridge.remove("v/b.txt").await.unwrap();
        assert!(!bridge.exists("v/b.txt").await.unwrap());

        bridge.remove("v").await.unwrap();
        assert!(!bridge.exists("v").await.unwrap());

        assert!(bridge.remove("").await.is_err());
    }
}
