use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Value;
use tracing::{debug, info};

use crate::application::TaskStore;
use crate::domain::{
    now_ms, DomainError, TaskRecord, TaskStatus, TaskTree, ToolOutput, INTERRUPTED_REASON,
};

pub const TASK_STORE_NAME: &str = "tasks.redb";

/// task id → JSON-encoded TaskRecord
const TASKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tasks");

/// Durable task DAG backed by redb. Every mutation commits its own write
/// transaction, so updates are durable when the call returns and a crashed
/// process can recover exactly what was written.
pub struct RedbTaskStore {
    db: Arc<Database>,
}

impl RedbTaskStore {
    pub fn open(path: &Path) -> Result<Self, DomainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)
            .map_err(|e| DomainError::storage(format!("Failed to open task store: {}", e)))?;

        // Create the table up front so reads on a fresh store see an empty
        // set instead of a missing table.
        let txn = db
            .begin_write()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;
        txn.open_table(TASKS_TABLE)
            .map_err(|e| DomainError::storage(format!("Failed to open task table: {}", e)))?;
        txn.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn write_record(&self, record: &TaskRecord) -> Result<(), DomainError> {
        let bytes = serde_json::to_vec(record)
            .map_err(|e| DomainError::storage(format!("Failed to encode task: {}", e)))?;
        let txn = self
            .db
            .begin_write()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;
        {
            let mut table = txn
                .open_table(TASKS_TABLE)
                .map_err(|e| DomainError::storage(format!("Failed to open task table: {}", e)))?;
            table
                .insert(record.id.as_str(), bytes.as_slice())
                .map_err(|e| DomainError::storage(format!("Failed to write task: {}", e)))?;
        }
        txn.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;
        Ok(())
    }

    fn read_record(&self, id: &str) -> Result<Option<TaskRecord>, DomainError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| DomainError::storage(format!("Failed to begin read: {}", e)))?;
        let table = txn
            .open_table(TASKS_TABLE)
            .map_err(|e| DomainError::storage(format!("Failed to open task table: {}", e)))?;
        let Some(guard) = table
            .get(id)
            .map_err(|e| DomainError::storage(format!("Failed to read task: {}", e)))?
        else {
            return Ok(None);
        };
        let record = serde_json::from_slice(guard.value())
            .map_err(|e| DomainError::storage(format!("Failed to decode task: {}", e)))?;
        Ok(Some(record))
    }

    fn read_all(&self) -> Result<Vec<TaskRecord>, DomainError> {
        let txn = self
            .db
            .begin_read()
            .map_err(|e| DomainError::storage(format!("Failed to begin read: {}", e)))?;
        let table = txn
            .open_table(TASKS_TABLE)
            .map_err(|e| DomainError::storage(format!("Failed to open task table: {}", e)))?;

        let mut records = Vec::new();
        for item in table
            .iter()
            .map_err(|e| DomainError::storage(format!("Failed to scan tasks: {}", e)))?
        {
            let (_, value) =
                item.map_err(|e| DomainError::storage(format!("Failed to scan tasks: {}", e)))?;
            let record: TaskRecord = serde_json::from_slice(value.value())
                .map_err(|e| DomainError::storage(format!("Failed to decode task: {}", e)))?;
            records.push(record);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn require(&self, id: &str) -> Result<TaskRecord, DomainError> {
        self.read_record(id)?
            .ok_or_else(|| DomainError::task_not_found(id))
    }

    fn delete_ids(&self, ids: &[String]) -> Result<(), DomainError> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;
        {
            let mut table = txn
                .open_table(TASKS_TABLE)
                .map_err(|e| DomainError::storage(format!("Failed to open task table: {}", e)))?;
            for id in ids {
                table
                    .remove(id.as_str())
                    .map_err(|e| DomainError::storage(format!("Failed to delete task: {}", e)))?;
            }
        }
        txn.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;
        Ok(())
    }

    fn subtree_ids(&self, root: &str) -> Result<Vec<String>, DomainError> {
        let all = self.read_all()?;
        let mut ids = vec![root.to_string()];
        let mut frontier = vec![root.to_string()];
        while let Some(current) = frontier.pop() {
            for task in all.iter().filter(|t| t.parent_id.as_deref() == Some(&current)) {
                ids.push(task.id.clone());
                frontier.push(task.id.clone());
            }
        }
        Ok(ids)
    }

    fn build_tree(task: TaskRecord, all: &[TaskRecord]) -> TaskTree {
        let children = all
            .iter()
            .filter(|t| t.parent_id.as_deref() == Some(task.id.as_str()))
            .cloned()
            .map(|child| Self::build_tree(child, all))
            .collect();
        TaskTree { task, children }
    }
}

#[async_trait]
impl TaskStore for RedbTaskStore {
    async fn create_root_goal(&self, label: &str) -> Result<TaskRecord, DomainError> {
        let record = TaskRecord::new_root(label);
        self.write_record(&record)?;
        debug!("Created root goal {} ({})", record.id, label);
        Ok(record)
    }

    async fn spawn_subtask(
        &self,
        parent_id: &str,
        label: &str,
    ) -> Result<TaskRecord, DomainError> {
        if self.read_record(parent_id)?.is_none() {
            return Err(DomainError::parent_not_found(parent_id));
        }
        let record = TaskRecord::new_child(parent_id, label);
        self.write_record(&record)?;
        debug!("Spawned subtask {} under {}", record.id, parent_id);
        Ok(record)
    }

    async fn get(&self, id: &str) -> Result<TaskRecord, DomainError> {
        self.require(id)
    }

    async fn get_children(&self, id: &str) -> Result<Vec<TaskRecord>, DomainError> {
        self.require(id)?;
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|t| t.parent_id.as_deref() == Some(id))
            .collect())
    }

    async fn get_all(&self) -> Result<Vec<TaskRecord>, DomainError> {
        self.read_all()
    }

    async fn get_roots(&self) -> Result<Vec<TaskRecord>, DomainError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(TaskRecord::is_root)
            .collect())
    }

    async fn get_task_tree(&self, id: &str) -> Result<TaskTree, DomainError> {
        let task = self.require(id)?;
        let all = self.read_all()?;
        Ok(Self::build_tree(task, &all))
    }

    async fn update_status(
        &self,
        id: &str,
        status: TaskStatus,
        context_patch: Option<Value>,
    ) -> Result<TaskRecord, DomainError> {
        let mut record = self.require(id)?;
        record.status = status;
        record.updated_at = now_ms();

        if let Some(Value::Object(patch)) = context_patch {
            for (key, value) in patch {
                record.context.extra.insert(key, value);
            }
        }

        self.write_record(&record)?;
        Ok(record)
    }

    async fn delete(&self, id: &str, cascade: bool) -> Result<(), DomainError> {
        self.require(id)?;
        let children = self.get_children(id).await?;
        if !children.is_empty() && !cascade {
            return Err(DomainError::invalid_input(format!(
                "Task {} has {} children; delete with cascade",
                id,
                children.len()
            )));
        }

        let ids = if cascade {
            self.subtree_ids(id)?
        } else {
            vec![id.to_string()]
        };
        self.delete_ids(&ids)?;
        debug!("Deleted {} task(s) rooted at {}", ids.len(), id);
        Ok(())
    }

    async fn cache_tool_output(
        &self,
        id: &str,
        tool: &str,
        output: Value,
    ) -> Result<(), DomainError> {
        let mut record = self.require(id)?;
        record.context.tool_outputs.insert(
            tool.to_string(),
            ToolOutput {
                output,
                cached_at: now_ms(),
            },
        );
        record.updated_at = now_ms();
        self.write_record(&record)
    }

    async fn get_tool_output(&self, id: &str, tool: &str) -> Result<Option<Value>, DomainError> {
        let record = self.require(id)?;
        Ok(record
            .context
            .tool_outputs
            .get(tool)
            .map(|t| t.output.clone()))
    }

    async fn get_tool_output_timestamp(
        &self,
        id: &str,
        tool: &str,
    ) -> Result<Option<u64>, DomainError> {
        let record = self.require(id)?;
        Ok(record.context.tool_outputs.get(tool).map(|t| t.cached_at))
    }

    async fn recover_state(&self) -> Result<Vec<TaskRecord>, DomainError> {
        let records = self.read_all()?;
        info!("Recovered {} persisted tasks", records.len());
        Ok(records)
    }

    async fn reset_running_tasks(&self) -> Result<Vec<String>, DomainError> {
        let mut reset = Vec::new();
        for mut record in self.read_all()? {
            if record.status != TaskStatus::Running {
                continue;
            }
            record.status = TaskStatus::Failed;
            record
                .metadata
                .insert("fail_reason".to_string(), INTERRUPTED_REASON.to_string());
            record.updated_at = now_ms();
            self.write_record(&record)?;
            reset.push(record.id);
        }
        if !reset.is_empty() {
            info!("Reset {} interrupted running task(s)", reset.len());
        }
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> RedbTaskStore {
        RedbTaskStore::open(&dir.path().join(TASK_STORE_NAME)).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let root = store.create_root_goal("refactor parser").await.unwrap();
        let fetched = store.get(&root.id).await.unwrap();
        assert_eq!(fetched.label, "refactor parser");
        assert_eq!(fetched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_spawn_subtask_requires_parent() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let err = store.spawn_subtask("missing-id", "child").await.unwrap_err();
        assert!(matches!(err, DomainError::ParentNotFound(_)));

        let root = store.create_root_goal("root").await.unwrap();
        let child = store.spawn_subtask(&root.id, "child").await.unwrap();
        assert_eq!(child.parent_id.as_deref(), Some(root.id.as_str()));

        let children = store.get_children(&root.id).await.unwrap();
        assert_eq!(children.len(), 1);
    }

    #[tokio::test]
    async fn test_task_tree() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let root = store.create_root_goal("root").await.unwrap();
        let mid = store.spawn_subtask(&root.id, "mid").await.unwrap();
        store.spawn_subtask(&mid.id, "leaf").await.unwrap();

        let tree = store.get_task_tree(&root.id).await.unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].children.len(), 1);
        assert_eq!(tree.children[0].children[0].task.label, "leaf");
    }

    #[tokio::test]
    async fn test_cascade_delete() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let root = store.create_root_goal("root").await.unwrap();
        let mid = store.spawn_subtask(&root.id, "mid").await.unwrap();
        store.spawn_subtask(&mid.id, "leaf").await.unwrap();

        let err = store.delete(&root.id, false).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        store.delete(&root.id, true).await.unwrap();
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_output_cache_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let root = store.create_root_goal("root").await.unwrap();
        let payload = json!({"files": ["a.ts"], "count": 1});
        store
            .cache_tool_output(&root.id, "grep", payload.clone())
            .await
            .unwrap();

        let cached = store.get_tool_output(&root.id, "grep").await.unwrap();
        assert_eq!(cached, Some(payload));
        assert!(store
            .get_tool_output_timestamp(&root.id, "grep")
            .await
            .unwrap()
            .is_some());
        assert!(store
            .get_tool_output(&root.id, "other")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_crash_recovery() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TASK_STORE_NAME);
        let (root_id, sub_id);

        {
            let store = RedbTaskStore::open(&path).unwrap();
            let root = store.create_root_goal("R").await.unwrap();
            let sub = store.spawn_subtask(&root.id, "S1").await.unwrap();
            store
                .cache_tool_output(&sub.id, "grep", json!({"files": ["a.ts"]}))
                .await
                .unwrap();
            store
                .update_status(&sub.id, TaskStatus::Running, None)
                .await
                .unwrap();
            root_id = root.id;
            sub_id = sub.id;
            // Store dropped without any shutdown hook: simulated crash.
        }

        let store = RedbTaskStore::open(&path).unwrap();
        let recovered = store.recover_state().await.unwrap();
        assert_eq!(recovered.len(), 2);

        let cached = store.get_tool_output(&sub_id, "grep").await.unwrap();
        assert_eq!(cached, Some(json!({"files": ["a.ts"]})));

        let reset = store.reset_running_tasks().await.unwrap();
        assert_eq!(reset, vec![sub_id.clone()]);

        let sub = store.get(&sub_id).await.unwrap();
        assert_eq!(sub.status, TaskStatus::Failed);
        assert_eq!(
            sub.metadata.get("fail_reason").map(String::as_str),
            Some(INTERRUPTED_REASON)
        );

        let root = store.get(&root_id).await.unwrap();
        assert_eq!(root.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_status_merges_context_patch() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let root = store.create_root_goal("root").await.unwrap();
        store
            .update_status(
                &root.id,
                TaskStatus::Completed,
                Some(json!({"summary": "done", "exitCode": 0})),
            )
            .await
            .unwrap();

        let fetched = store.get(&root.id).await.unwrap();
        assert_eq!(fetched.status, TaskStatus::Completed);
        assert_eq!(fetched.context.extra["summary"], json!("done"));
        assert_eq!(fetched.context.extra["exitCode"], json!(0));
    }
}
