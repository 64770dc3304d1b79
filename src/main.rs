//! CodeScout CLI - hybrid codebase retrieval engine.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

use codescout::{
    load_index_state, Crawler, DependencyScout, DuckdbVectorRepository, EmbeddingService,
    HttpEmbedding, IndexCatalog, IndexEngine, IndexMode, IndexPhase, MockEmbedding, ProgressFn,
    RedbTaskStore, ScoutConfig, SearchCodeUseCase, SearchQuery, SummarizeCodebaseUseCase,
    SummarizeOptions, ToolDispatcher, TreeSitterParser, VectorRepository, TASK_STORE_NAME,
    VECTOR_STORE_NAME,
};

mod cli;
use cli::Commands;

/// CodeScout - codebase retrieval for coding assistants
#[derive(Parser)]
#[command(name = "codescout")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root to index (falls back to $PROJECT_ROOT, then cwd)
    #[arg(short, long, global = true)]
    project_root: Option<String>,

    /// Data directory for persisted indexes (falls back to $DATA_DIR)
    #[arg(short, long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest).to_string_lossy().to_string();
        }
    }
    path.to_string()
}

fn resolve_dirs(cli: &Cli) -> (PathBuf, PathBuf) {
    let project_root = cli
        .project_root
        .clone()
        .or_else(|| std::env::var("PROJECT_ROOT").ok())
        .unwrap_or_else(|| ".".to_string());
    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| std::env::var("DATA_DIR").ok())
        .unwrap_or_else(|| "~/.codescout".to_string());
    (
        PathBuf::from(expand_tilde(&project_root)),
        PathBuf::from(expand_tilde(&data_dir)),
    )
}

/// Pick the embedding backend from the environment: a remote endpoint when
/// configured, the deterministic mock otherwise.
fn build_embedding_service() -> Arc<dyn EmbeddingService> {
    let dimensions = std::env::var("EMBEDDING_DIMENSIONS")
        .ok()
        .and_then(|d| d.parse().ok())
        .unwrap_or(384);

    match std::env::var("EMBEDDING_ENDPOINT") {
        Ok(endpoint) => {
            let model = std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string());
            info!("Using remote embedder {} ({})", endpoint, model);
            Arc::new(HttpEmbedding::new(
                endpoint,
                std::env::var("EMBEDDING_API_KEY").ok(),
                model,
                dimensions,
            ))
        }
        Err(_) => Arc::new(MockEmbedding::with_dimensions(dimensions)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let (project_root, data_dir) = resolve_dirs(&cli);
    std::fs::create_dir_all(&data_dir)?;

    // Shared services.
    let parser = Arc::new(TreeSitterParser::new());
    let embedding = build_embedding_service();
    let vector_repo: Arc<dyn VectorRepository> = Arc::new(
        DuckdbVectorRepository::with_dimensions(
            &data_dir.join(VECTOR_STORE_NAME),
            embedding.dimensions(),
        )?,
    );
    let catalog = Arc::new(IndexCatalog::load(&data_dir).await);

    let engine = Arc::new(IndexEngine::new(
        project_root.clone(),
        data_dir.clone(),
        parser.clone(),
        vector_repo.clone(),
        embedding.clone(),
        catalog.clone(),
    ));
    let search = Arc::new(SearchCodeUseCase::new(
        vector_repo.clone(),
        embedding.clone(),
        catalog.clone(),
    ));
    let scout = Arc::new(DependencyScout::new(parser.clone()));
    let summarizer = Arc::new(SummarizeCodebaseUseCase::new(
        Crawler::new(&project_root),
        catalog.clone(),
    ));

    match cli.command {
        Commands::Index {
            full,
            uncommitted,
            dry_run,
        } => {
            let mode = if full {
                IndexMode::Full
            } else {
                IndexMode::Incremental
            };

            if dry_run {
                let plan = engine.plan(mode, uncommitted).await?;
                println!(
                    "{} ({}): add {}, update {}, delete {}, unchanged {}",
                    if plan.is_full_reindex {
                        "Full reindex"
                    } else {
                        "Incremental"
                    },
                    plan.reason,
                    plan.stats.files_to_add,
                    plan.stats.files_to_update,
                    plan.stats.files_to_delete,
                    plan.stats.files_unchanged,
                );
                return Ok(());
            }

            let bar = ProgressBar::new(0);
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("  {spinner:.green} {bar:40.green/dim} {pos}/{len} {msg:.dim}")
                    .expect("Invalid progress bar template")
                    .progress_chars("━━─"),
            );
            let progress_bar = bar.clone();
            let progress: ProgressFn = Arc::new(move |phase, current, total| {
                progress_bar.set_length(total as u64);
                progress_bar.set_position(current as u64);
                progress_bar.set_message(match phase {
                    IndexPhase::Crawling => "crawling",
                    IndexPhase::Analyzing => "analyzing",
                    IndexPhase::Embedding => "embedding",
                    IndexPhase::Saving => "saving",
                    IndexPhase::Complete => "done",
                });
            });

            let report = engine.run(mode, uncommitted, Some(progress), None).await?;
            bar.finish_and_clear();
            println!(
                "Indexed {} file(s), {} chunk(s), removed {} in {}ms ({})",
                report.files_indexed,
                report.chunks_indexed,
                report.files_removed,
                report.duration_ms,
                report.reason,
            );
        }

        Commands::Search {
            query,
            num,
            min_score,
            language,
            kind,
        } => {
            let mut search_query = SearchQuery::new(&query).with_limit(num);
            if let Some(score) = min_score {
                search_query = search_query.with_min_score(score);
            }
            if let Some(languages) = language {
                search_query = search_query.with_languages(languages);
            }
            if let Some(kinds) = kind {
                search_query = search_query.with_kinds(kinds);
            }

            let results = search.execute(search_query).await?;
            if results.is_empty() {
                println!("No results.");
            }
            for (i, result) in results.iter().enumerate() {
                let chunk = result.chunk();
                println!(
                    "{}. {} [{} {}] score {:.3}",
                    i + 1,
                    chunk.location(),
                    chunk.kind(),
                    chunk.name().unwrap_or("-"),
                    result.score(),
                );
            }
        }

        Commands::Symbol { name, entry } => {
            let entries = resolve_entries(&project_root, &entry).await?;
            let graph = scout.build_dependency_graph(&entries);
            let definitions = scout.find_symbol_definitions(&name, &graph);
            let call_sites = scout.find_call_sites(&name, &graph);

            println!("{} definition(s):", definitions.len());
            for def in &definitions {
                println!("  {}:{} [{}]", def.file, def.line, def.kind);
            }
            println!("{} call site(s):", call_sites.len());
            for site in &call_sites {
                println!("  {}:{}", site.file, site.line);
            }
        }

        Commands::Deps {
            entry,
            max_depth,
            include_node_modules,
        } => {
            let scout = DependencyScout::with_config(
                parser.clone(),
                ScoutConfig {
                    max_depth,
                    include_node_modules,
                    ..ScoutConfig::default()
                },
            );
            let entries = resolve_entries(&project_root, &entry).await?;
            let graph = scout.build_dependency_graph(&entries);
            let stats = graph.stats();

            println!(
                "{} node(s), {} edge(s), {} root(s), {} leaf(s), {} cycle(s)",
                stats.node_count,
                stats.edge_count,
                stats.root_count,
                stats.leaf_count,
                stats.cycle_count,
            );
            for cycle in &graph.cycles {
                println!("cycle: {}", cycle.join(" -> "));
            }
        }

        Commands::Summarize {
            scope,
            depth,
            focus,
            max_tokens,
        } => {
            let summary = summarizer
                .execute(&SummarizeOptions {
                    scope,
                    depth,
                    focus,
                    max_tokens,
                })
                .await?;
            println!("{}", summary);
        }

        Commands::Tool { request } => {
            let tasks = Arc::new(RedbTaskStore::open(&data_dir.join(TASK_STORE_NAME))?);
            let dispatcher = ToolDispatcher::new(
                engine.clone(),
                search.clone(),
                scout.clone(),
                summarizer.clone(),
                tasks,
                data_dir.clone(),
            );
            let raw: serde_json::Value = serde_json::from_str(&request)?;
            let response = dispatcher.dispatch_json(raw).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            if response.get("success") == Some(&serde_json::Value::Bool(false)) {
                std::process::exit(1);
            }
        }

        Commands::Stats => {
            let stats = vector_repo.stats().await?;
            let state = load_index_state(&data_dir).await;
            println!("Chunks: {}", stats.total_chunks);
            for (language, count) in &stats.languages {
                println!("  {}: {}", language, count);
            }
            if let Some(commit) = &state.last_indexed_commit {
                println!(
                    "Last indexed commit: {} (branch {})",
                    commit,
                    state.branch.as_deref().unwrap_or("-"),
                );
            }
            println!(
                "BM25 documents: {}",
                catalog.bm25.read().expect("bm25 lock poisoned").len()
            );
            println!(
                "Symbols: {}",
                catalog.fuzzy.read().expect("fuzzy lock poisoned").len()
            );
        }
    }

    Ok(())
}

/// Expand explicit entry arguments, or fall back to every supported file
/// in the project root.
async fn resolve_entries(project_root: &PathBuf, entries: &[String]) -> Result<Vec<PathBuf>> {
    if entries.is_empty() {
        let crawl = Crawler::new(project_root).crawl().await?;
        return Ok(crawl.into_iter().map(|f| f.path).collect());
    }
    Ok(entries
        .iter()
        .map(|e| {
            let path = PathBuf::from(e);
            if path.is_absolute() {
                path
            } else {
                project_root.join(path)
            }
        })
        .collect())
}
