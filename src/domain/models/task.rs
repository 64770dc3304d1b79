use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::chunk::now_ms;

pub const INTERRUPTED_REASON: &str = "Process interrupted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A cached tool invocation result attached to a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolOutput {
    pub output: serde_json::Value,
    pub cached_at: u64,
}

/// Free-form task context; `tool_outputs` is the durable per-tool result
/// cache, `extra` holds caller-defined keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskContext {
    #[serde(default)]
    pub tool_outputs: BTreeMap<String, ToolOutput>,
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// One node of the durable task DAG. Parent edges form a forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub parent_id: Option<String>,
    pub label: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub context: TaskContext,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl TaskRecord {
    pub fn new_root(label: impl Into<String>) -> Self {
        Self::new(None, label)
    }

    pub fn new_child(parent_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::new(Some(parent_id.into()), label)
    }

    fn new(parent_id: Option<String>, label: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id,
            label: label.into(),
            status: TaskStatus::Pending,
            context: TaskContext::default(),
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A task together with its recursively resolved children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskTree {
    pub task: TaskRecord,
    pub children: Vec<TaskTree>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_root_task() {
        let task = TaskRecord::new_root("investigate flaky test");
        assert!(task.is_root());
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.context.tool_outputs.is_empty());
        assert_eq!(task.id.len(), 36);
    }

    #[test]
    fn test_child_links_to_parent() {
        let root = TaskRecord::new_root("root");
        let child = TaskRecord::new_child(root.id.clone(), "child");
        assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));
        assert!(!child.is_root());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("unknown"), None);
    }

    #[test]
    fn test_record_json_round_trip() {
        let mut task = TaskRecord::new_root("root");
        task.context.tool_outputs.insert(
            "grep".to_string(),
            ToolOutput {
                output: serde_json::json!({"files": ["a.ts"]}),
                cached_at: 123,
            },
        );
        let bytes = serde_json::to_vec(&task).unwrap();
        let restored: TaskRecord = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(task, restored);
    }
}
