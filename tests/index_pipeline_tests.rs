//! End-to-end indexing pipeline scenarios: incremental add, rename,
//! hybrid retrieval and substrate consistency.

use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use tempfile::TempDir;

use codescout::{
    ChunkerConfig, Crawler, DuckdbVectorRepository, FileIndex, IndexCatalog, IndexEngine,
    IndexMode, MockEmbedding, SearchCodeUseCase, TreeSitterParser, VectorRepository,
};

const DIMS: usize = 32;

struct Harness {
    project: TempDir,
    data: TempDir,
    engine: IndexEngine,
    catalog: Arc<IndexCatalog>,
    vector_repo: Arc<DuckdbVectorRepository>,
    search: SearchCodeUseCase,
}

async fn harness() -> Harness {
    let project = TempDir::new().unwrap();
    let data = TempDir::new().unwrap();

    let parser = Arc::new(TreeSitterParser::new());
    let vector_repo = Arc::new(
        DuckdbVectorRepository::with_dimensions(&data.path().join("vectors.duckdb"), DIMS)
            .unwrap(),
    );
    let embedding = Arc::new(MockEmbedding::with_dimensions(DIMS));
    let catalog = Arc::new(IndexCatalog::load(data.path()).await);

    let engine = IndexEngine::new(
        project.path(),
        data.path(),
        parser,
        vector_repo.clone(),
        embedding.clone(),
        catalog.clone(),
    )
    .with_chunker_config(ChunkerConfig {
        max_chunk_tokens: 512,
        min_chunk_lines: 1,
    });

    let search = SearchCodeUseCase::new(vector_repo.clone(), embedding, catalog.clone());

    Harness {
        project,
        data,
        engine,
        catalog,
        vector_repo,
        search,
    }
}

fn write(dir: &Path, rel: &str, content: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn git(dir: &Path, args: &[&str]) {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("git must be runnable in tests");
    assert!(out.status.success(), "git {:?} failed", args);
}

fn init_repo(dir: &Path) {
    git(dir, &["init", "-q", "-b", "main"]);
    git(dir, &["config", "user.email", "t@example.com"]);
    git(dir, &["config", "user.name", "T"]);
}

fn commit_all(dir: &Path, message: &str) {
    git(dir, &["add", "."]);
    git(dir, &["commit", "-q", "-m", message]);
}

#[tokio::test]
async fn incremental_add_plans_one_file_and_finds_its_symbol() {
    let h = harness().await;
    init_repo(h.project.path());
    write(
        h.project.path(),
        "a.ts",
        "export function alphaEntry() {\n    return 1;\n}\n",
    );
    write(
        h.project.path(),
        "b.ts",
        "export function betaHelper() {\n    return 2;\n}\n",
    );
    commit_all(h.project.path(), "first");

    h.engine
        .run(IndexMode::Full, false, None, None)
        .await
        .unwrap();

    write(
        h.project.path(),
        "c.ts",
        "import { betaHelper } from \"./b\";\n\nexport function gammaFeature() {\n    return betaHelper() + 1;\n}\n",
    );
    commit_all(h.project.path(), "add c");

    let plan = h.engine.plan(IndexMode::Incremental, false).await.unwrap();
    assert!(!plan.is_full_reindex);
    assert_eq!(plan.stats.files_to_add, 1);
    assert_eq!(plan.stats.files_to_update, 0);
    assert_eq!(plan.stats.files_to_delete, 0);
    assert_eq!(plan.stats.files_unchanged, 2);

    h.engine
        .run(IndexMode::Incremental, false, None, None)
        .await
        .unwrap();

    // Exactly one definition of the new symbol, in c.ts.
    let xref = h.catalog.xref.read().unwrap();
    let defs = xref.find_definitions("gammaFeature");
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].file, "c.ts");
}

#[tokio::test]
async fn rename_removes_old_traces_and_indexes_new_path() {
    let h = harness().await;
    init_repo(h.project.path());
    write(
        h.project.path(),
        "old.ts",
        "// header\n\nexport function fooRoutine() {\n    return 42;\n}\n",
    );
    commit_all(h.project.path(), "first");

    h.engine
        .run(IndexMode::Full, false, None, None)
        .await
        .unwrap();

    std::fs::rename(
        h.project.path().join("old.ts"),
        h.project.path().join("new.ts"),
    )
    .unwrap();
    commit_all(h.project.path(), "rename");

    let plan = h.engine.plan(IndexMode::Incremental, false).await.unwrap();
    assert_eq!(plan.stats.files_to_add, 1);
    assert_eq!(plan.stats.files_to_delete, 1);

    h.engine
        .run(IndexMode::Incremental, false, None, None)
        .await
        .unwrap();

    // No trace of the old path in any substrate.
    assert!(h
        .vector_repo
        .get_by_file_path("old.ts")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        h.catalog.bm25.read().unwrap().documents_with_prefix("old.ts:"),
        0
    );
    assert_eq!(
        h.catalog
            .fuzzy
            .read()
            .unwrap()
            .symbols_with_prefix("old.ts:"),
        0
    );

    let root_key = h.project.path().to_string_lossy().to_string();
    let file_index = FileIndex::load(h.data.path(), &root_key).await;
    assert!(file_index.get_file("old.ts").is_none());
    assert!(file_index.get_file("new.ts").is_some());

    // The symbol now resolves at the new path.
    let xref = h.catalog.xref.read().unwrap();
    let defs = xref.find_definitions("fooRoutine");
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].file, "new.ts");
    assert_eq!(defs[0].start_line, 3);
}

#[tokio::test]
async fn index_and_retrieval_substrates_stay_consistent() {
    let h = harness().await;
    write(
        h.project.path(),
        "src/pool.rs",
        "/// Connection pooling.\nfn acquire_pool_slot() -> usize {\n    1\n}\n",
    );
    write(
        h.project.path(),
        "src/walk.py",
        "def traverse_directories(root):\n    return [root]\n",
    );

    h.engine
        .run(IndexMode::Full, false, None, None)
        .await
        .unwrap();

    let root_key = h.project.path().to_string_lossy().to_string();
    let file_index = FileIndex::load(h.data.path(), &root_key).await;
    assert_eq!(file_index.len(), 2);

    for record in file_index.files() {
        if record.chunk_count == 0 {
            continue;
        }
        let prefix = format!("{}:", record.relative_path);
        assert!(
            h.catalog.bm25.read().unwrap().documents_with_prefix(&prefix) > 0,
            "no BM25 docs for {}",
            record.relative_path
        );
        assert!(
            !h.vector_repo
                .get_by_file_path(&record.relative_path)
                .await
                .unwrap()
                .is_empty(),
            "no vector rows for {}",
            record.relative_path
        );
    }
}

#[tokio::test]
async fn hybrid_search_surfaces_symbol_and_lexical_matches() {
    let h = harness().await;
    write(
        h.project.path(),
        "src/checksum.rs",
        "/// Rolling checksum over a byte stream.\nfn rolling_checksum(data: &[u8]) -> u32 {\n    data.iter().map(|b| *b as u32).sum()\n}\n",
    );
    write(
        h.project.path(),
        "src/other.rs",
        "fn unrelated_helper() -> u32 {\n    7\n}\n",
    );

    h.engine
        .run(IndexMode::Full, false, None, None)
        .await
        .unwrap();

    let results = h.search.search("rolling_checksum", 5).await.unwrap();
    assert!(!results.is_empty());
    // The mock embedder's vectors are arbitrary, so assert on the lexical
    // and symbol legs rather than the exact rank.
    let hit = results
        .iter()
        .find(|r| r.chunk().name() == Some("rolling_checksum"))
        .expect("checksum chunk retrieved");
    assert!(hit.provenance().text || hit.provenance().symbol);

    // Dedup: every chunk id appears once.
    let mut ids: Vec<&str> = results.iter().map(|r| r.chunk().id()).collect();
    let count = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), count);
}

#[tokio::test]
async fn unparseable_file_falls_back_to_block_chunks() {
    let h = harness().await;
    // Unbalanced braces everywhere: not valid Rust, but still indexable.
    let noise: String = (0..50).map(|i| format!("}}{{ junk line {i} ))((\n")).collect();
    write(h.project.path(), "src/noise.rs", &noise);

    h.engine
        .run(IndexMode::Full, false, None, None)
        .await
        .unwrap();

    let chunks = h.vector_repo.get_by_file_path("src/noise.rs").await.unwrap();
    assert!(
        !chunks.is_empty(),
        "block fallback should still produce chunks"
    );
}

#[tokio::test]
async fn crawler_and_engine_skip_ignored_directories() {
    let h = harness().await;
    write(h.project.path(), "src/keep.rs", "fn kept_routine() -> u32 { 3 }\n");
    write(
        h.project.path(),
        "node_modules/pkg/index.js",
        "module.exports = 1;\n",
    );

    let crawl = Crawler::new(h.project.path()).crawl().await.unwrap();
    assert_eq!(crawl.len(), 1);

    h.engine
        .run(IndexMode::Full, false, None, None)
        .await
        .unwrap();
    assert!(h
        .vector_repo
        .get_by_file_path("node_modules/pkg/index.js")
        .await
        .unwrap()
        .is_empty());
}
