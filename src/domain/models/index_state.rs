use serde::{Deserialize, Serialize};

/// Snapshot of what the last successful index run covered. Persisted as
/// `index-state.json` under the data directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexState {
    pub last_indexed_commit: Option<String>,
    pub last_indexed_at: u64,
    pub branch: Option<String>,
    pub total_files: usize,
    pub includes_uncommitted: bool,
}

impl IndexState {
    pub fn has_prior_run(&self) -> bool {
        self.last_indexed_at > 0
    }

    /// True when the recorded branch differs from the current one; a branch
    /// switch invalidates the incremental path.
    pub fn branch_changed(&self, current: Option<&str>) -> bool {
        match (&self.branch, current) {
            (Some(prev), Some(cur)) => prev != cur,
            (None, None) => false,
            _ => true,
        }
    }
}
