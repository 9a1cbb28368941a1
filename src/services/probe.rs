//! Filesystem existence and metadata checks.
//!
//! Every failure (races with in-flight writes, permissions, vanished paths)
//! is reported as "absent" or "unknown" for the current tick; nothing here
//! returns an error.

use crate::models::drop::AssetKind;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::{fs, task};
use tracing::debug;
use walkdir::WalkDir;

/// What the probe learned about a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathInfo {
    pub kind: AssetKind,
    pub size_bytes: u64,
    /// Recursive file count for directories, zero for files.
    pub file_count: usize,
}

#[async_trait]
pub trait PathProbe: Send + Sync {
    /// Cheap existence check, called for every pair on every classifier tick.
    async fn exists(&self, path: &Path) -> bool;

    /// Kind, size and contained-file count, or `None` when the path cannot be read.
    async fn inspect(&self, path: &Path) -> Option<PathInfo>;

    /// Recursive number of regular files beneath `path`; zero if unreadable.
    async fn count_files(&self, path: &Path) -> usize;
}

/// Probe backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFs;

#[async_trait]
impl PathProbe for LocalFs {
    async fn exists(&self, path: &Path) -> bool {
        match fs::try_exists(path).await {
            Ok(exists) => exists,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Existence check failed, treating as absent");
                false
            }
        }
    }

    async fn inspect(&self, path: &Path) -> Option<PathInfo> {
        let meta = match fs::metadata(path).await {
            Ok(meta) => meta,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Could not read metadata");
                return None;
            }
        };

        if meta.is_dir() {
            Some(PathInfo {
                kind: AssetKind::Directory,
                size_bytes: 0,
                file_count: self.count_files(path).await,
            })
        } else {
            Some(PathInfo {
                kind: AssetKind::File,
                size_bytes: meta.len(),
                file_count: 0,
            })
        }
    }

    async fn count_files(&self, path: &Path) -> usize {
        let root: PathBuf = path.to_path_buf();
        task::spawn_blocking(move || count_files_blocking(&root))
            .await
            .unwrap_or(0)
    }
}

fn count_files_blocking(root: &Path) -> usize {
    if !root.is_dir() {
        return 0;
    }
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn inspects_files_and_directories() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"12345").unwrap();
        let folder = dir.path().join("batch");
        std::fs::create_dir_all(folder.join("nested")).unwrap();
        std::fs::write(folder.join("a.jpg"), b"a").unwrap();
        std::fs::write(folder.join("nested/b.jpg"), b"b").unwrap();

        let probe = LocalFs;
        let info = probe.inspect(&file).await.unwrap();
        assert_eq!(info.kind, AssetKind::File);
        assert_eq!(info.size_bytes, 5);

        let info = probe.inspect(&folder).await.unwrap();
        assert_eq!(info.kind, AssetKind::Directory);
        assert_eq!(info.file_count, 2);
    }

    #[tokio::test]
    async fn missing_paths_are_absent() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("gone");

        let probe = LocalFs;
        assert!(!probe.exists(&missing).await);
        assert!(probe.inspect(&missing).await.is_none());
        assert_eq!(probe.count_files(&missing).await, 0);
    }
}
