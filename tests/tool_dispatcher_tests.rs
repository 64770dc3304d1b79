//! Tool-surface scenarios: the JSON boundary exposed to orchestrators.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use codescout::{
    Crawler, DependencyScout, DuckdbVectorRepository, IndexCatalog, IndexEngine, MockEmbedding,
    RedbTaskStore, SearchCodeUseCase, SummarizeCodebaseUseCase, ToolDispatcher,
    TreeSitterParser, TASK_STORE_NAME,
};

const DIMS: usize = 32;

async fn dispatcher(project: &Path, data: &Path) -> ToolDispatcher {
    let parser = Arc::new(TreeSitterParser::new());
    let vector_repo = Arc::new(
        DuckdbVectorRepository::with_dimensions(&data.join("vectors.duckdb"), DIMS).unwrap(),
    );
    let embedding = Arc::new(MockEmbedding::with_dimensions(DIMS));
    let catalog = Arc::new(IndexCatalog::load(data).await);

    let engine = Arc::new(IndexEngine::new(
        project,
        data,
        parser.clone(),
        vector_repo.clone(),
        embedding.clone(),
        catalog.clone(),
    ));
    let search = Arc::new(SearchCodeUseCase::new(vector_repo, embedding, catalog.clone()));
    let scout = Arc::new(DependencyScout::new(parser));
    let summarizer = Arc::new(SummarizeCodebaseUseCase::new(Crawler::new(project), catalog));
    let tasks = Arc::new(RedbTaskStore::open(&data.join(TASK_STORE_NAME)).unwrap());

    ToolDispatcher::new(engine, search, scout, summarizer, tasks, data.to_path_buf())
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

#[tokio::test]
async fn analyze_dependency_reports_cycle() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write(
        project.path(),
        "a.ts",
        "import \"./b\";\nexport const a = 1;\n",
    );
    write(
        project.path(),
        "b.ts",
        "import \"./a\";\nexport const b = 2;\n",
    );

    let dispatcher = dispatcher(project.path(), data.path()).await;
    let response = dispatcher
        .dispatch_json(json!({
            "tool": "analyze_dependency",
            "args": {"entryPoints": ["a.ts"]}
        }))
        .await;

    assert_eq!(response["success"], json!(true));
    assert_eq!(response["stats"]["nodeCount"], json!(2));
    let cycles = response["circularDeps"].as_array().unwrap();
    assert_eq!(cycles.len(), 1);
    let cycle = cycles[0].as_array().unwrap();
    assert_eq!(cycle.first(), cycle.last());
}

#[tokio::test]
async fn find_symbol_locates_definition_and_call_sites() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write(
        project.path(),
        "config.ts",
        "export function loadSettings(path: string) {\n    return path;\n}\n",
    );
    write(
        project.path(),
        "app.ts",
        "import { loadSettings } from \"./config\";\n\nexport function main() {\n    return loadSettings(\"app.toml\");\n}\n",
    );

    let dispatcher = dispatcher(project.path(), data.path()).await;
    let response = dispatcher
        .dispatch_json(json!({
            "tool": "find_symbol",
            "args": {"symbolName": "loadSettings", "entryPoints": ["app.ts"]}
        }))
        .await;

    assert_eq!(response["success"], json!(true));
    assert_eq!(response["definitionCount"], json!(1));
    let definition = &response["definitions"][0];
    assert!(definition["file"].as_str().unwrap().ends_with("config.ts"));
    assert!(response["callSiteCount"].as_u64().unwrap() >= 1);
}

#[tokio::test]
async fn index_codebase_tool_reports_plan_and_state() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    write(
        project.path(),
        "lib.rs",
        "fn published_api() -> u32 {\n    11\n}\n",
    );

    let dispatcher = dispatcher(project.path(), data.path()).await;
    let response = dispatcher
        .dispatch_json(json!({
            "tool": "index_codebase",
            "args": {"mode": "full"}
        }))
        .await;

    assert_eq!(response["success"], json!(true));
    assert_eq!(response["isFullReindex"], json!(true));
    assert_eq!(response["stats"]["totalFilesInRepo"], json!(1));
    assert_eq!(response["filesToIndex"], json!(["lib.rs"]));
    assert!(response["currentState"]["lastIndexedAt"].as_u64().unwrap() > 0);

    let bad = dispatcher
        .dispatch_json(json!({"tool": "index_codebase", "args": {"mode": "sideways"}}))
        .await;
    assert_eq!(bad["success"], json!(false));
}

#[tokio::test]
async fn manage_task_round_trip_through_json() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let dispatcher = dispatcher(project.path(), data.path()).await;

    let created = dispatcher
        .dispatch_json(json!({
            "tool": "manage_task",
            "args": {"action": "create_root_goal", "label": "triage crash"}
        }))
        .await;
    assert_eq!(created["success"], json!(true));
    let root_id = created["task"]["id"].as_str().unwrap().to_string();

    let spawned = dispatcher
        .dispatch_json(json!({
            "tool": "manage_task",
            "args": {"action": "spawn_subtask", "parentId": root_id, "label": "collect logs"}
        }))
        .await;
    assert_eq!(spawned["success"], json!(true));
    let sub_id = spawned["task"]["id"].as_str().unwrap().to_string();

    dispatcher
        .dispatch_json(json!({
            "tool": "manage_task",
            "args": {"action": "cache_tool_output", "id": sub_id, "tool": "grep",
                     "output": {"files": ["a.ts"]}}
        }))
        .await;

    let cached = dispatcher
        .dispatch_json(json!({
            "tool": "manage_task",
            "args": {"action": "get_tool_output", "id": sub_id, "tool": "grep"}
        }))
        .await;
    assert_eq!(cached["output"], json!({"files": ["a.ts"]}));

    let tree = dispatcher
        .dispatch_json(json!({
            "tool": "manage_task",
            "args": {"action": "get_task_tree", "id": root_id}
        }))
        .await;
    assert_eq!(tree["tree"]["children"][0]["task"]["label"], json!("collect logs"));

    let missing_parent = dispatcher
        .dispatch_json(json!({
            "tool": "manage_task",
            "args": {"action": "spawn_subtask", "parentId": "nope", "label": "x"}
        }))
        .await;
    assert_eq!(missing_parent["success"], json!(false));
}

#[tokio::test]
async fn summarize_codebase_is_bounded() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    for i in 0..20 {
        write(
            project.path(),
            &format!("src/mod_{i}.rs"),
            "fn routine() -> u32 { 1 }\n",
        );
    }

    let dispatcher = dispatcher(project.path(), data.path()).await;
    let response = dispatcher
        .dispatch_json(json!({
            "tool": "summarize_codebase",
            "args": {"scope": "", "depth": 1, "focus": [], "maxTokens": 80}
        }))
        .await;

    assert_eq!(response["success"], json!(true));
    assert!(response["tokenEstimate"].as_u64().unwrap() <= 90);
    assert!(response["summary"].as_str().unwrap().contains("rust (20)"));
}

#[tokio::test]
async fn malformed_request_returns_structured_error() {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();
    let dispatcher = dispatcher(project.path(), data.path()).await;

    let response = dispatcher
        .dispatch_json(json!({"tool": "frobnicate", "args": {}}))
        .await;
    assert_eq!(response["success"], json!(false));
    assert!(response["error"].as_str().unwrap().contains("Invalid tool request"));
}
