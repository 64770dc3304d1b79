use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{DomainError, TaskRecord, TaskStatus, TaskTree};

/// Durable DAG of externally-spawned work units with a per-node tool
/// result cache. Every mutation is durable when the call returns.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_root_goal(&self, label: &str) -> Result<TaskRecord, DomainError>;

    /// Fails with `ParentNotFound` when the parent id is unknown.
    async fn spawn_subtask(&self, parent_id: &str, label: &str)
        -> Result<TaskRecord, DomainError>;

    async fn get(&self, id: &str) -> Result<TaskRecord, DomainError>;

    async fn get_children(&self, id: &str) -> Result<Vec<TaskRecord>, DomainError>;

    async fn get_all(&self) -> Result<Vec<TaskRecord>, DomainError>;

    async fn get_roots(&self) -> Result<Vec<TaskRecord>, DomainError>;

    async fn get_task_tree(&self, id: &str) -> Result<TaskTree, DomainError>;

    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        context_patch: Option<Value>,
    ) -> Result<TaskRecord, DomainError>;

    /// Delete a task; with `cascade`, its entire subtree. Without cascade,
    /// deleting a task that still has children is an error.
    async fn delete(&self, id: &str, cascade: bool) -> Result<(), DomainError>;

    async fn cache_tool_output(
        &self,
        id: &str,
        tool: &str,
        output: Value,
    ) -> Result<(), DomainError>;

    async fn get_tool_output(&self, id: &str, tool: &str) -> Result<Option<Value>, DomainError>;

    async fn get_tool_output_timestamp(
        &self,
        id: &str,
        tool: &str,
    ) -> Result<Option<u64>, DomainError>;

    /// Reload everything persisted; used after process restart.
    async fn recover_state(&self) -> Result<Vec<TaskRecord>, DomainError>;

    /// Mark every `running` task as failed with the interrupted reason.
    /// Returns the ids that were reset.
    async fn reset_running_tasks(&self) -> Result<Vec<String>, DomainError>;
}
