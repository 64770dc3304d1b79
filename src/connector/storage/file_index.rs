use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{DomainError, FileInfo, FileRecord};

/// Schema version; bumping it invalidates every persisted index.
pub const FILE_INDEX_VERSION: u32 = 2;

pub const FILE_INDEX_NAME: &str = "file-index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileIndexData {
    version: u32,
    project_root: String,
    files: BTreeMap<String, FileRecord>,
}

/// Persistent mapping `relative path → (hash, mtime, chunk count,
/// indexed-at)`, diffed against fresh crawls to find incremental work.
///
/// Callers must serialize saves per instance; the planner holds the single
/// writer for the duration of a run.
pub struct FileIndex {
    path: PathBuf,
    data: FileIndexData,
}

impl FileIndex {
    /// Load the index from `data_dir`, discarding it on version or
    /// project-root mismatch.
    pub async fn load(data_dir: &Path, project_root: &str) -> Self {
        let path = data_dir.join(FILE_INDEX_NAME);
        let empty = FileIndexData {
            version: FILE_INDEX_VERSION,
            project_root: project_root.to_string(),
            files: BTreeMap::new(),
        };

        let data = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<FileIndexData>(&raw) {
                Ok(data)
                    if data.version == FILE_INDEX_VERSION
                        && data.project_root == project_root =>
                {
                    data
                }
                Ok(data) => {
                    warn!(
                        "Discarding file index (version {} root {:?}, want {} {:?})",
                        data.version, data.project_root, FILE_INDEX_VERSION, project_root
                    );
                    empty
                }
                Err(e) => {
                    warn!("Discarding unreadable file index: {}", e);
                    empty
                }
            },
            Err(_) => empty,
        };

        Self { path, data }
    }

    pub fn in_memory(project_root: &str) -> Self {
        Self {
            path: PathBuf::new(),
            data: FileIndexData {
                version: FILE_INDEX_VERSION,
                project_root: project_root.to_string(),
                files: BTreeMap::new(),
            },
        }
    }

    /// Crawled files that are new or whose mtime-or-hash differs from the
    /// stored record.
    pub fn changed_files<'a>(&self, crawl: &'a [FileInfo]) -> Vec<&'a FileInfo> {
        crawl
            .iter()
            .filter(|info| {
                self.data
                    .files
                    .get(&info.rel_path)
                    .map(|record| !record.matches(info))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Stored paths absent from the crawl.
    pub fn deleted_files(&self, crawl: &[FileInfo]) -> Vec<String> {
        let current: std::collections::HashSet<&str> =
            crawl.iter().map(|f| f.rel_path.as_str()).collect();
        self.data
            .files
            .keys()
            .filter(|path| !current.contains(path.as_str()))
            .cloned()
            .collect()
    }

    pub fn update_file(&mut self, record: FileRecord) {
        self.data.files.insert(record.relative_path.clone(), record);
    }

    pub fn remove_file(&mut self, rel_path: &str) {
        self.data.files.remove(rel_path);
    }

    pub fn get_file(&self, rel_path: &str) -> Option<&FileRecord> {
        self.data.files.get(rel_path)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.data.files.values()
    }

    pub fn len(&self) -> usize {
        self.data.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.data.files.clear();
    }

    /// Persist atomically: create the directory, write a temp file, rename
    /// over the target.
    pub async fn save(&self) -> Result<(), DomainError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string_pretty(&self.data)
            .map_err(|e| DomainError::storage(format!("Failed to encode file index: {}", e)))?;
        write_atomic(&self.path, json.as_bytes()).await?;
        debug!("Saved file index ({} files)", self.data.files.len());
        Ok(())
    }
}

/// Shared atomic-write helper for the JSON artifacts.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), DomainError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Language;
    use tempfile::TempDir;

    fn info(rel: &str, hash: &str, mtime: u64) -> FileInfo {
        FileInfo {
            path: PathBuf::from(format!("/repo/{rel}")),
            rel_path: rel.to_string(),
            language: Language::Rust,
            hash: hash.to_string(),
            size: 10,
            mtime_ms: mtime,
        }
    }

    #[tokio::test]
    async fn test_changed_and_deleted_files() {
        let mut index = FileIndex::in_memory("/repo");
        index.update_file(FileRecord::from_crawl(&info("a.rs", "h1", 100), 1, 2));
        index.update_file(FileRecord::from_crawl(&info("b.rs", "h2", 100), 1, 1));

        let crawl = vec![
            info("a.rs", "h1", 100),      // unchanged
            info("b.rs", "h2-new", 200),  // modified
            info("c.rs", "h3", 100),      // new
        ];

        let changed: Vec<&str> = index
            .changed_files(&crawl)
            .iter()
            .map(|f| f.rel_path.as_str())
            .collect();
        assert_eq!(changed, vec!["b.rs", "c.rs"]);

        let crawl_without_a = vec![info("b.rs", "h2-new", 200)];
        assert_eq!(index.deleted_files(&crawl_without_a), vec!["a.rs"]);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let mut index = FileIndex::load(dir.path(), "/repo").await;
        index.update_file(FileRecord::from_crawl(&info("a.rs", "h1", 100), 7, 3));
        index.save().await.unwrap();

        let reloaded = FileIndex::load(dir.path(), "/repo").await;
        assert_eq!(reloaded.len(), 1);
        let record = reloaded.get_file("a.rs").unwrap();
        assert_eq!(record.hash, "h1");
        assert_eq!(record.chunk_count, 3);
        assert_eq!(record.indexed_at, 7);
    }

    #[tokio::test]
    async fn test_project_root_mismatch_discards() {
        let dir = TempDir::new().unwrap();
        let mut index = FileIndex::load(dir.path(), "/repo").await;
        index.update_file(FileRecord::from_crawl(&info("a.rs", "h1", 100), 1, 1));
        index.save().await.unwrap();

        let other = FileIndex::load(dir.path(), "/other-repo").await;
        assert!(other.is_empty());
    }

    #[tokio::test]
    async fn test_save_is_byte_stable() {
        let dir = TempDir::new().unwrap();
        let mut index = FileIndex::load(dir.path(), "/repo").await;
        index.update_file(FileRecord::from_crawl(&info("b.rs", "h2", 100), 1, 1));
        index.update_file(FileRecord::from_crawl(&info("a.rs", "h1", 100), 1, 1));
        index.save().await.unwrap();
        let first = std::fs::read(dir.path().join(FILE_INDEX_NAME)).unwrap();

        let reloaded = FileIndex::load(dir.path(), "/repo").await;
        reloaded.save().await.unwrap();
        let second = std::fs::read(dir.path().join(FILE_INDEX_NAME)).unwrap();

        assert_eq!(first, second);
    }
}
