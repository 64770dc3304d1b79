use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::application::{
    DependencyScout, IndexEngine, IndexMode, ScoutConfig, SearchCodeUseCase,
    SummarizeCodebaseUseCase, SummarizeOptions, TaskStore,
};
use crate::domain::{estimate_tokens, DomainError, SearchQuery, TaskStatus};

/// The sealed tool set exposed to the orchestrator. Every tool takes a
/// JSON argument object and returns JSON; unknown tools and malformed
/// arguments surface as `{"success": false}` responses, never a crash.
#[derive(Debug, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolRequest {
    AnalyzeDependency(AnalyzeDependencyArgs),
    FindSymbol(FindSymbolArgs),
    IndexCodebase(IndexCodebaseArgs),
    SearchCode(SearchCodeArgs),
    ManageTask(ManageTaskArgs),
    SummarizeCodebase(SummarizeCodebaseArgs),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeDependencyArgs {
    pub entry_points: Vec<String>,
    pub max_depth: Option<usize>,
    pub include_node_modules: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindSymbolArgs {
    pub symbol_name: String,
    pub entry_points: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexCodebaseArgs {
    /// "full" or "incremental".
    pub mode: String,
    #[serde(default)]
    pub include_uncommitted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCodeArgs {
    pub query: String,
    pub limit: Option<usize>,
    pub languages: Option<Vec<String>>,
    pub kinds: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ManageTaskArgs {
    CreateRootGoal {
        label: String,
    },
    SpawnSubtask {
        #[serde(rename = "parentId")]
        parent_id: String,
        label: String,
    },
    Get {
        id: String,
    },
    GetChildren {
        id: String,
    },
    GetAll,
    GetRoots,
    GetTaskTree {
        id: String,
    },
    UpdateStatus {
        id: String,
        status: String,
        #[serde(rename = "contextPatch")]
        context_patch: Option<Value>,
    },
    Delete {
        id: String,
        #[serde(default)]
        cascade: bool,
    },
    CacheToolOutput {
        id: String,
        tool: String,
        output: Value,
    },
    GetToolOutput {
        id: String,
        tool: String,
    },
    RecoverState,
    ResetRunningTasks,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeCodebaseArgs {
    #[serde(default)]
    pub scope: String,
    pub depth: Option<usize>,
    #[serde(default)]
    pub focus: Vec<String>,
    pub max_tokens: Option<usize>,
}

/// Pattern-matches tool requests into use-case calls.
pub struct ToolDispatcher {
    engine: Arc<IndexEngine>,
    search: Arc<SearchCodeUseCase>,
    scout: Arc<DependencyScout>,
    summarizer: Arc<SummarizeCodebaseUseCase>,
    tasks: Arc<dyn TaskStore>,
    data_dir: PathBuf,
}

impl ToolDispatcher {
    pub fn new(
        engine: Arc<IndexEngine>,
        search: Arc<SearchCodeUseCase>,
        scout: Arc<DependencyScout>,
        summarizer: Arc<SummarizeCodebaseUseCase>,
        tasks: Arc<dyn TaskStore>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            engine,
            search,
            scout,
            summarizer,
            tasks,
            data_dir,
        }
    }

    /// Dispatch a raw JSON request. Never fails; errors become structured
    /// `success: false` responses.
    pub async fn dispatch_json(&self, raw: Value) -> Value {
        let request: ToolRequest = match serde_json::from_value(raw) {
            Ok(req) => req,
            Err(e) => {
                return json!({"success": false, "error": format!("Invalid tool request: {e}")})
            }
        };
        self.dispatch(request).await
    }

    pub async fn dispatch(&self, request: ToolRequest) -> Value {
        let result = match request {
            ToolRequest::AnalyzeDependency(args) => self.analyze_dependency(args).await,
            ToolRequest::FindSymbol(args) => self.find_symbol(args).await,
            ToolRequest::IndexCodebase(args) => self.index_codebase(args).await,
            ToolRequest::SearchCode(args) => self.search_code(args).await,
            ToolRequest::ManageTask(args) => self.manage_task(args).await,
            ToolRequest::SummarizeCodebase(args) => self.summarize(args).await,
        };
        match result {
            Ok(value) => value,
            Err(e) => {
                warn!("Tool call failed: {}", e);
                json!({"success": false, "error": e.to_string()})
            }
        }
    }

    fn scout_for(&self, args: &AnalyzeDependencyArgs) -> Arc<DependencyScout> {
        if args.max_depth.is_none() && args.include_node_modules.is_none() {
            return self.scout.clone();
        }
        let mut config = ScoutConfig::default();
        if let Some(depth) = args.max_depth {
            config.max_depth = depth;
        }
        if let Some(include) = args.include_node_modules {
            config.include_node_modules = include;
        }
        Arc::new(DependencyScout::with_config(self.engine_parser(), config))
    }

    fn engine_parser(&self) -> Arc<dyn crate::application::ParserService> {
        self.scout.parser()
    }

    fn resolve_entry(&self, entry: &str) -> PathBuf {
        let path = PathBuf::from(entry);
        if path.is_absolute() {
            path
        } else {
            self.engine.project_root().join(path)
        }
    }

    async fn analyze_dependency(&self, args: AnalyzeDependencyArgs) -> Result<Value, DomainError> {
        let scout = self.scout_for(&args);
        let entries: Vec<PathBuf> = args.entry_points.iter().map(|e| self.resolve_entry(e)).collect();
        let graph = scout.build_dependency_graph(&entries);
        let stats = graph.stats();

        Ok(json!({
            "success": true,
            "stats": stats,
            "roots": graph.roots,
            "leaves": graph.leaves,
            "circularDeps": graph.cycles,
            "nodes": graph.nodes.values().map(|n| json!({
                "filePath": n.file_path,
                "imports": n.imports,
                "dependencies": n.dependencies,
                "dependents": n.dependents,
            })).collect::<Vec<_>>(),
        }))
    }

    async fn find_symbol(&self, args: FindSymbolArgs) -> Result<Value, DomainError> {
        let entries: Vec<PathBuf> = args.entry_points.iter().map(|e| self.resolve_entry(e)).collect();
        let graph = self.scout.build_dependency_graph(&entries);

        let definitions = self.scout.find_symbol_definitions(&args.symbol_name, &graph);
        let call_sites = self.scout.find_call_sites(&args.symbol_name, &graph);

        Ok(json!({
            "success": true,
            "definitions": definitions.iter().map(|d| json!({
                "file": d.file, "line": d.line, "type": d.kind, "name": d.name,
            })).collect::<Vec<_>>(),
            "callSites": call_sites.iter().map(|c| json!({
                "file": c.file, "line": c.line,
            })).collect::<Vec<_>>(),
            "definitionCount": definitions.len(),
            "callSiteCount": call_sites.len(),
        }))
    }

    async fn index_codebase(&self, args: IndexCodebaseArgs) -> Result<Value, DomainError> {
        let mode = match args.mode.as_str() {
            "full" => IndexMode::Full,
            "incremental" => IndexMode::Incremental,
            other => {
                return Err(DomainError::invalid_input(format!(
                    "Unknown index mode: {other}"
                )))
            }
        };

        let plan = self.engine.plan(mode, args.include_uncommitted).await?;
        let files_to_index: Vec<&str> = plan
            .files_to_index
            .iter()
            .map(|f| f.rel_path.as_str())
            .collect();
        let files_to_remove = plan.files_to_remove.clone();

        let report = self
            .engine
            .run(mode, args.include_uncommitted, None, None)
            .await?;

        let current_state =
            crate::connector::storage::load_index_state(&self.data_dir).await;

        Ok(json!({
            "success": true,
            "mode": args.mode,
            "isFullReindex": report.is_full_reindex,
            "reason": report.reason,
            "stats": report.stats,
            "filesToIndex": files_to_index,
            "filesToRemove": files_to_remove,
            "filesIndexed": report.files_indexed,
            "chunksIndexed": report.chunks_indexed,
            "gitAvailable": self.engine.git().is_repo(),
            "currentState": current_state,
        }))
    }

    async fn search_code(&self, args: SearchCodeArgs) -> Result<Value, DomainError> {
        let mut query = SearchQuery::new(&args.query).with_limit(args.limit.unwrap_or(10));
        if let Some(languages) = args.languages {
            query = query.with_languages(languages);
        }
        if let Some(kinds) = args.kinds {
            query = query.with_kinds(kinds);
        }

        let results = self.search.execute(query).await?;
        Ok(json!({
            "success": true,
            "results": results.iter().map(|r| json!({
                "filePath": r.chunk().relative_path(),
                "startLine": r.chunk().start_line(),
                "endLine": r.chunk().end_line(),
                "score": r.score(),
                "language": r.chunk().language().as_str(),
                "kind": r.chunk().kind().as_str(),
                "name": r.chunk().name(),
                "code": r.chunk().code(),
                "provenance": r.provenance(),
            })).collect::<Vec<_>>(),
            "resultCount": results.len(),
        }))
    }

    async fn manage_task(&self, args: ManageTaskArgs) -> Result<Value, DomainError> {
        let ok = |value: Value| json!({"success": true, "task": value});
        match args {
            ManageTaskArgs::CreateRootGoal { label } => {
                let task = self.tasks.create_root_goal(&label).await?;
                Ok(ok(serde_json::to_value(task).unwrap_or_default()))
            }
            ManageTaskArgs::SpawnSubtask { parent_id, label } => {
                let task = self.tasks.spawn_subtask(&parent_id, &label).await?;
                Ok(ok(serde_json::to_value(task).unwrap_or_default()))
            }
            ManageTaskArgs::Get { id } => {
                let task = self.tasks.get(&id).await?;
                Ok(ok(serde_json::to_value(task).unwrap_or_default()))
            }
            ManageTaskArgs::GetChildren { id } => {
                let children = self.tasks.get_children(&id).await?;
                Ok(json!({"success": true, "tasks": children}))
            }
            ManageTaskArgs::GetAll => {
                let tasks = self.tasks.get_all().await?;
                Ok(json!({"success": true, "tasks": tasks}))
            }
            ManageTaskArgs::GetRoots => {
                let tasks = self.tasks.get_roots().await?;
                Ok(json!({"success": true, "tasks": tasks}))
            }
            ManageTaskArgs::GetTaskTree { id } => {
                let tree = self.tasks.get_task_tree(&id).await?;
                Ok(json!({"success": true, "tree": tree}))
            }
            ManageTaskArgs::UpdateStatus {
                id,
                status,
                context_patch,
            } => {
                let status = TaskStatus::parse(&status).ok_or_else(|| {
                    DomainError::invalid_input(format!("Unknown status: {status}"))
                })?;
                let task = self.tasks.update_status(&id, status, context_patch).await?;
                Ok(ok(serde_json::to_value(task).unwrap_or_default()))
            }
            ManageTaskArgs::Delete { id, cascade } => {
                self.tasks.delete(&id, cascade).await?;
                Ok(json!({"success": true, "deleted": id}))
            }
            ManageTaskArgs::CacheToolOutput { id, tool, output } => {
                self.tasks.cache_tool_output(&id, &tool, output).await?;
                Ok(json!({"success": true}))
            }
            ManageTaskArgs::GetToolOutput { id, tool } => {
                let output = self.tasks.get_tool_output(&id, &tool).await?;
                let cached_at = self.tasks.get_tool_output_timestamp(&id, &tool).await?;
                Ok(json!({"success": true, "output": output, "cachedAt": cached_at}))
            }
            ManageTaskArgs::RecoverState => {
                let tasks = self.tasks.recover_state().await?;
                Ok(json!({"success": true, "tasks": tasks}))
            }
            ManageTaskArgs::ResetRunningTasks => {
                let reset = self.tasks.reset_running_tasks().await?;
                Ok(json!({"success": true, "resetTaskIds": reset}))
            }
        }
    }

    async fn summarize(&self, args: SummarizeCodebaseArgs) -> Result<Value, DomainError> {
        let options = SummarizeOptions {
            scope: args.scope,
            depth: args.depth.unwrap_or(2),
            focus: args.focus,
            max_tokens: args.max_tokens.unwrap_or(1024),
        };
        let summary = self.summarizer.execute(&options).await?;
        Ok(json!({
            "success": true,
            "summary": summary,
            "tokenEstimate": estimate_tokens(&summary),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_request_parses_tagged_json() {
        let raw = json!({
            "tool": "find_symbol",
            "args": {"symbolName": "foo", "entryPoints": ["src/main.ts"]}
        });
        let request: ToolRequest = serde_json::from_value(raw).unwrap();
        match request {
            ToolRequest::FindSymbol(args) => {
                assert_eq!(args.symbol_name, "foo");
                assert_eq!(args.entry_points, vec!["src/main.ts"]);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_manage_task_action_parses() {
        let raw = json!({
            "tool": "manage_task",
            "args": {"action": "spawn_subtask", "parentId": "p-1", "label": "child"}
        });
        let request: ToolRequest = serde_json::from_value(raw).unwrap();
        match request {
            ToolRequest::ManageTask(ManageTaskArgs::SpawnSubtask { parent_id, label }) => {
                assert_eq!(parent_id, "p-1");
                assert_eq!(label, "child");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tool_is_error() {
        let raw = json!({"tool": "frobnicate", "args": {}});
        assert!(serde_json::from_value::<ToolRequest>(raw).is_err());
    }
}
