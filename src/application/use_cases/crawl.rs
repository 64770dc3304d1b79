use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::domain::{compute_content_hash, DomainError, FileInfo, Language};

/// Directory names excluded regardless of ignore files.
const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    ".idea",
    ".vscode",
];

/// Optional sibling of `.gitignore` honored by the crawler.
const CUSTOM_IGNORE_FILE: &str = ".claudeignore";

/// Git priority assigned to files with uncommitted changes; recently
/// committed files rank 100 down to 1.
const UNCOMMITTED_PRIORITY: i32 = 200;

/// Enumerates candidate files under a repository root, applying ignore
/// rules and computing content hashes.
pub struct Crawler {
    root: PathBuf,
}

impl Crawler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and return supported files in walk order. Unreadable
    /// files are logged and skipped.
    pub async fn crawl(&self) -> Result<Vec<FileInfo>, DomainError> {
        let root = self
            .root
            .canonicalize()
            .map_err(|e| DomainError::invalid_input(format!("Invalid project root: {}", e)))?;

        let walker = WalkBuilder::new(&root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .add_custom_ignore_filename(CUSTOM_IGNORE_FILE)
            .filter_entry(|entry| {
                let name = entry.file_name().to_string_lossy();
                !DEFAULT_EXCLUDES.contains(&name.as_ref())
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!("Error walking directory: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let language = Language::from_path(path);
            if !language.is_known() {
                continue;
            }

            match self.stat_file(&root, path, language).await {
                Ok(info) => files.push(info),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }

        debug!("Crawl found {} candidate files", files.len());
        Ok(files)
    }

    /// Crawl, then reorder so uncommitted files come first, followed by
    /// files sorted descending by recent-commit priority.
    pub async fn crawl_with_git_priority(
        &self,
        uncommitted: &[String],
        recently_modified: &[String],
    ) -> Result<Vec<FileInfo>, DomainError> {
        let mut files = self.crawl().await?;

        let uncommitted: HashMap<&str, ()> =
            uncommitted.iter().map(|p| (p.as_str(), ())).collect();
        let recent_rank: HashMap<&str, i32> = recently_modified
            .iter()
            .take(100)
            .enumerate()
            .map(|(i, p)| (p.as_str(), 100 - i as i32))
            .collect();

        let priority = |info: &FileInfo| -> i32 {
            if uncommitted.contains_key(info.rel_path.as_str()) {
                UNCOMMITTED_PRIORITY
            } else {
                recent_rank.get(info.rel_path.as_str()).copied().unwrap_or(0)
            }
        };

        files.sort_by(|a, b| priority(b).cmp(&priority(a)).then(a.rel_path.cmp(&b.rel_path)));
        Ok(files)
    }

    async fn stat_file(
        &self,
        root: &Path,
        path: &Path,
        language: Language,
    ) -> Result<FileInfo, DomainError> {
        let bytes = tokio::fs::read(path).await?;
        let metadata = tokio::fs::metadata(path).await?;
        let mtime_ms = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let rel_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");

        Ok(FileInfo {
            path: path.to_path_buf(),
            rel_path,
            language,
            hash: compute_content_hash(&bytes),
            size: bytes.len() as u64,
            mtime_ms,
        })
    }
}
