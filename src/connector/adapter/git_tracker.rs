use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::DomainError;

/// Summary of `git status` for the tracked repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatus {
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub uncommitted_paths: Vec<String>,
    pub is_repo: bool,
}

/// Shells out to the `git` binary for change detection. Every operation is
/// a no-op returning a safe default when the directory is not a
/// repository.
pub struct GitTracker {
    root: PathBuf,
    is_repo: AtomicBool,
}

impl GitTracker {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            is_repo: AtomicBool::new(false),
        }
    }

    /// Detect repository presence. Must be called before the query
    /// operations report anything other than defaults.
    pub async fn initialize(&self) -> bool {
        let is_repo = match self.run(&["rev-parse", "--is-inside-work-tree"]).await {
            Ok(out) => out.trim() == "true",
            Err(_) => false,
        };
        self.is_repo.store(is_repo, Ordering::SeqCst);
        debug!(
            "Git tracker initialized for {} (repo: {})",
            self.root.display(),
            is_repo
        );
        is_repo
    }

    pub fn is_repo(&self) -> bool {
        self.is_repo.load(Ordering::SeqCst)
    }

    /// Paths changed between `commit` and HEAD.
    pub async fn diff_since(&self, commit: &str) -> Vec<String> {
        if !self.is_repo() {
            return Vec::new();
        }
        match self
            .run(&["diff", "--name-only", &format!("{}..HEAD", commit)])
            .await
        {
            Ok(out) => lines(&out),
            Err(e) => {
                warn!("git diff failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Paths touched by commits after `date` (any format `git log` takes).
    pub async fn modified_since(&self, date: &str) -> Vec<String> {
        if !self.is_repo() {
            return Vec::new();
        }
        match self
            .run(&[
                "log",
                "--name-only",
                "--pretty=format:",
                &format!("--since={}", date),
            ])
            .await
        {
            Ok(out) => dedup_preserving_order(lines(&out)),
            Err(e) => {
                warn!("git log --since failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Uncommitted paths from short-form porcelain output (staged,
    /// unstaged and untracked).
    pub async fn uncommitted_changes(&self) -> Vec<String> {
        if !self.is_repo() {
            return Vec::new();
        }
        match self.run(&["status", "--porcelain"]).await {
            Ok(out) => out
                .lines()
                .filter(|l| l.len() > 3)
                .map(|l| {
                    // Renames are reported as `old -> new`; the new path is
                    // the one present on disk.
                    let path = &l[3..];
                    match path.split_once(" -> ") {
                        Some((_, new)) => new.trim().to_string(),
                        None => path.trim().to_string(),
                    }
                })
                .filter(|p| !p.is_empty())
                .collect(),
            Err(e) => {
                warn!("git status failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Distinct paths from the most recent commits, most recent first,
    /// capped at `limit`.
    pub async fn recently_modified_files(&self, limit: usize) -> Vec<String> {
        if !self.is_repo() {
            return Vec::new();
        }
        match self
            .run(&["log", "--name-only", "--pretty=format:", "-n", "50"])
            .await
        {
            Ok(out) => {
                let mut paths = dedup_preserving_order(lines(&out));
                paths.truncate(limit);
                paths
            }
            Err(e) => {
                warn!("git log failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Blob SHA-1 of a path as git would store it.
    pub async fn file_hash(&self, path: &str) -> Option<String> {
        if !self.is_repo() {
            return None;
        }
        self.run(&["hash-object", path])
            .await
            .ok()
            .map(|out| out.trim().to_string())
            .filter(|h| !h.is_empty())
    }

    pub async fn has_uncommitted_changes(&self, path: &str) -> bool {
        if !self.is_repo() {
            return false;
        }
        match self.run(&["status", "--porcelain", "--", path]).await {
            Ok(out) => !out.trim().is_empty(),
            Err(_) => false,
        }
    }

    pub async fn current_branch(&self) -> Option<String> {
        if !self.is_repo() {
            return None;
        }
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
            .await
            .ok()
            .map(|out| out.trim().to_string())
            .filter(|b| !b.is_empty() && b != "HEAD")
    }

    pub async fn current_commit(&self) -> Option<String> {
        if !self.is_repo() {
            return None;
        }
        self.run(&["rev-parse", "HEAD"])
            .await
            .ok()
            .map(|out| out.trim().to_string())
            .filter(|c| !c.is_empty())
    }

    pub async fn status(&self) -> GitStatus {
        if !self.is_repo() {
            return GitStatus::default();
        }
        GitStatus {
            branch: self.current_branch().await,
            commit: self.current_commit().await,
            uncommitted_paths: self.uncommitted_changes().await,
            is_repo: true,
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, DomainError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()
            .await?;

        if !output.status.success() {
            return Err(DomainError::internal(format!(
                "git {} exited with {}",
                args.first().unwrap_or(&""),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn lines(out: &str) -> Vec<String> {
    out.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

fn dedup_preserving_order(paths: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    async fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(args)
            .status()
            .await
            .expect("git must be runnable in tests");
        assert!(status.success(), "git {:?} failed", args);
    }

    async fn init_repo(dir: &Path) {
        git(dir, &["init", "-q", "-b", "main"]).await;
        git(dir, &["config", "user.email", "test@example.com"]).await;
        git(dir, &["config", "user.name", "Test"]).await;
    }

    #[tokio::test]
    async fn test_non_repo_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let tracker = GitTracker::new(dir.path());
        assert!(!tracker.initialize().await);

        assert!(tracker.diff_since("HEAD~1").await.is_empty());
        assert!(tracker.uncommitted_changes().await.is_empty());
        assert!(tracker.current_branch().await.is_none());
        assert!(tracker.current_commit().await.is_none());
        assert_eq!(tracker.status().await, GitStatus::default());
    }

    #[tokio::test]
    async fn test_repo_branch_commit_and_diff() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path()).await;
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "first"]).await;

        let tracker = GitTracker::new(dir.path());
        assert!(tracker.initialize().await);

        assert_eq!(tracker.current_branch().await.as_deref(), Some("main"));
        let first = tracker.current_commit().await.unwrap();

        std::fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "second"]).await;

        let changed = tracker.diff_since(&first).await;
        assert_eq!(changed, vec!["b.rs".to_string()]);
    }

    #[tokio::test]
    async fn test_uncommitted_changes_listed() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path()).await;
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "first"]).await;

        let tracker = GitTracker::new(dir.path());
        tracker.initialize().await;

        std::fs::write(dir.path().join("a.rs"), "fn a() { /* edited */ }").unwrap();
        std::fs::write(dir.path().join("new.rs"), "fn new_fn() {}").unwrap();

        let uncommitted = tracker.uncommitted_changes().await;
        assert!(uncommitted.contains(&"a.rs".to_string()));
        assert!(uncommitted.contains(&"new.rs".to_string()));
        assert!(tracker.has_uncommitted_changes("a.rs").await);
    }

    #[tokio::test]
    async fn test_recently_modified_files() {
        let dir = TempDir::new().unwrap();
        init_repo(dir.path()).await;
        std::fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "first"]).await;
        std::fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();
        git(dir.path(), &["add", "."]).await;
        git(dir.path(), &["commit", "-q", "-m", "second"]).await;

        let tracker = GitTracker::new(dir.path());
        tracker.initialize().await;

        let recent = tracker.recently_modified_files(10).await;
        assert_eq!(recent.first().map(String::as_str), Some("b.rs"));
        assert!(recent.contains(&"a.rs".to_string()));
    }
}
