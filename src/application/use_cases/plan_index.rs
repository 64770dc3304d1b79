use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::application::use_cases::crawl::Crawler;
use crate::connector::storage::FileIndex;
use crate::connector::GitTracker;
use crate::domain::{DomainError, FileInfo, IndexState};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexPlanStats {
    pub files_to_add: usize,
    pub files_to_update: usize,
    pub files_to_delete: usize,
    pub files_unchanged: usize,
    pub total_files_in_repo: usize,
}

/// What the next index run must do.
#[derive(Debug, Clone)]
pub struct IndexPlan {
    pub is_full_reindex: bool,
    pub reason: String,
    pub stats: IndexPlanStats,
    pub files_to_index: Vec<FileInfo>,
    pub files_to_remove: Vec<String>,
    pub git_diff: Option<Vec<String>>,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub includes_uncommitted: bool,
}

impl IndexPlan {
    pub fn is_noop(&self) -> bool {
        self.files_to_index.is_empty() && self.files_to_remove.is_empty()
    }
}

/// Combines git diff, the file index and a fresh crawl into the minimal
/// set of files to re-process.
pub struct IncrementalPlanner {
    crawler: Crawler,
    git: Arc<GitTracker>,
}

impl IncrementalPlanner {
    pub fn new(crawler: Crawler, git: Arc<GitTracker>) -> Self {
        Self { crawler, git }
    }

    pub async fn plan(
        &self,
        file_index: &FileIndex,
        state: &IndexState,
        include_uncommitted: bool,
        force_full: bool,
    ) -> Result<IndexPlan, DomainError> {
        let is_repo = self.git.is_repo();
        let branch = self.git.current_branch().await;
        let commit = self.git.current_commit().await;

        let uncommitted = if is_repo {
            self.git.uncommitted_changes().await
        } else {
            Vec::new()
        };
        let crawl = if is_repo {
            let recent = self.git.recently_modified_files(100).await;
            self.crawler
                .crawl_with_git_priority(&uncommitted, &recent)
                .await?
        } else {
            self.crawler.crawl().await?
        };

        let full_reason = if force_full {
            Some("full reindex requested")
        } else if !state.has_prior_run() {
            Some("no previous index state")
        } else if !is_repo {
            Some("not a git repository")
        } else if state.branch_changed(branch.as_deref()) {
            Some("branch changed since last index")
        } else if state.last_indexed_commit.is_none() {
            Some("no commit recorded for last index")
        } else {
            None
        };

        let plan = match full_reason {
            Some(reason) => self.full_plan(
                reason,
                crawl,
                file_index,
                branch,
                commit,
                include_uncommitted,
            ),
            None => {
                let last_commit = state
                    .last_indexed_commit
                    .as_deref()
                    .expect("checked above");
                let git_diff = self.git.diff_since(last_commit).await;
                self.incremental_plan(
                    crawl,
                    file_index,
                    git_diff,
                    uncommitted,
                    branch,
                    commit,
                    include_uncommitted,
                )
            }
        };

        info!(
            "Index plan: {} (add {}, update {}, delete {}, unchanged {})",
            plan.reason,
            plan.stats.files_to_add,
            plan.stats.files_to_update,
            plan.stats.files_to_delete,
            plan.stats.files_unchanged
        );
        Ok(plan)
    }

    fn full_plan(
        &self,
        reason: &str,
        crawl: Vec<FileInfo>,
        file_index: &FileIndex,
        branch: Option<String>,
        commit: Option<String>,
        includes_uncommitted: bool,
    ) -> IndexPlan {
        let files_to_remove = file_index.deleted_files(&crawl);
        let files_to_add = crawl
            .iter()
            .filter(|f| file_index.get_file(&f.rel_path).is_none())
            .count();

        let stats = IndexPlanStats {
            files_to_add,
            files_to_update: crawl.len() - files_to_add,
            files_to_delete: files_to_remove.len(),
            files_unchanged: 0,
            total_files_in_repo: crawl.len(),
        };

        IndexPlan {
            is_full_reindex: true,
            reason: reason.to_string(),
            stats,
            files_to_index: crawl,
            files_to_remove,
            git_diff: None,
            branch,
            commit,
            includes_uncommitted,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn incremental_plan(
        &self,
        crawl: Vec<FileInfo>,
        file_index: &FileIndex,
        git_diff: Vec<String>,
        uncommitted: Vec<String>,
        branch: Option<String>,
        commit: Option<String>,
        include_uncommitted: bool,
    ) -> IndexPlan {
        let mut candidates: HashSet<String> = git_diff.iter().cloned().collect();
        if include_uncommitted {
            candidates.extend(uncommitted.iter().cloned());
        }

        let crawled: HashSet<&str> = crawl.iter().map(|f| f.rel_path.as_str()).collect();

        // Deletions: candidate paths gone from the crawl, plus indexed
        // paths that vanished without a git mention (editor deletes, moves
        // under an ignore rule).
        let mut files_to_remove: Vec<String> = candidates
            .iter()
            .filter(|p| !crawled.contains(p.as_str()) && file_index.get_file(p).is_some())
            .cloned()
            .collect();
        for gone in file_index.deleted_files(&crawl) {
            if !files_to_remove.contains(&gone) {
                files_to_remove.push(gone);
            }
        }
        files_to_remove.sort();

        let mut files_to_add = 0usize;
        let mut files_to_update = 0usize;
        let mut files_to_index: Vec<FileInfo> = Vec::new();

        for info in &crawl {
            let record = file_index.get_file(&info.rel_path);
            let mentioned = candidates.contains(&info.rel_path);
            match record {
                // New files are work whether or not the diff mentions them.
                None => {
                    files_to_add += 1;
                    files_to_index.push(info.clone());
                }
                Some(record) if mentioned && !record.matches(info) => {
                    files_to_update += 1;
                    files_to_index.push(info.clone());
                }
                Some(_) => {}
            }
        }

        let files_unchanged = crawl.len() - files_to_index.len();
        let stats = IndexPlanStats {
            files_to_add,
            files_to_update,
            files_to_delete: files_to_remove.len(),
            files_unchanged,
            total_files_in_repo: crawl.len(),
        };

        debug!(
            "Incremental plan from {} candidate path(s): {} work item(s)",
            candidates.len(),
            files_to_index.len()
        );

        IndexPlan {
            is_full_reindex: false,
            reason: "incremental".to_string(),
            stats,
            files_to_index,
            files_to_remove,
            git_diff: Some({
                let mut diff = git_diff;
                diff.sort();
                diff
            }),
            branch,
            commit,
            includes_uncommitted: include_uncommitted,
        }
    }
}
