use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::application::use_cases::chunk_file::{ChunkerConfig, SemanticChunker};
use crate::application::use_cases::crawl::Crawler;
use crate::application::use_cases::plan_index::{IncrementalPlanner, IndexPlan, IndexPlanStats};
use crate::application::{EmbeddingService, ParserService, VectorRepository};
use crate::connector::storage::{
    load_index_state, save_index_state, Bm25DocMeta, FileIndex, IndexCatalog, SymbolEntry,
};
use crate::connector::GitTracker;
use crate::domain::{now_ms, Chunk, DomainError, FileInfo, FileRecord, FileXref, IndexState};

/// Progress phases reported during an index run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    Crawling,
    Analyzing,
    Embedding,
    Saving,
    Complete,
}

pub type ProgressFn = Arc<dyn Fn(IndexPhase, usize, usize) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexReport {
    pub is_full_reindex: bool,
    pub reason: String,
    pub stats: IndexPlanStats,
    pub files_indexed: usize,
    pub chunks_indexed: usize,
    pub files_removed: usize,
    pub deadline_exceeded: bool,
    pub duration_ms: u64,
}

/// How many files are parsed/chunked concurrently.
const DEFAULT_WORKERS: usize = 50;

/// Chunks per embedding batch.
const EMBED_BATCH_SIZE: usize = 50;

/// Backoff before the single embedding retry.
const EMBED_RETRY_BACKOFF: Duration = Duration::from_millis(500);

struct FileWork {
    info: FileInfo,
    xref: FileXref,
    chunks: Vec<Chunk>,
}

/// Executes an [`IndexPlan`]: evictions first, then parse → chunk → embed
/// → upsert with per-file atomicity, then the ordered artifact saves.
pub struct IndexPipeline {
    parser: Arc<dyn ParserService>,
    chunker: SemanticChunker,
    vector_repo: Arc<dyn VectorRepository>,
    embedding_service: Arc<dyn EmbeddingService>,
    catalog: Arc<IndexCatalog>,
    workers: usize,
}

impl IndexPipeline {
    pub fn new(
        parser: Arc<dyn ParserService>,
        vector_repo: Arc<dyn VectorRepository>,
        embedding_service: Arc<dyn EmbeddingService>,
        catalog: Arc<IndexCatalog>,
    ) -> Self {
        Self {
            chunker: SemanticChunker::new(parser.clone()),
            parser,
            vector_repo,
            embedding_service,
            catalog,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_chunker_config(mut self, config: ChunkerConfig) -> Self {
        self.chunker = SemanticChunker::new(self.parser.clone()).with_config(config);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub async fn execute(
        &self,
        plan: &IndexPlan,
        file_index: &mut FileIndex,
        progress: Option<ProgressFn>,
        deadline: Option<Instant>,
    ) -> Result<IndexReport, DomainError> {
        let start = Instant::now();
        let report_progress = |phase: IndexPhase, current: usize, total: usize| {
            if let Some(cb) = &progress {
                cb(phase, current, total);
            }
        };

        // Evict stale artifacts first: removed paths, then the prior
        // contents of every file about to be re-indexed. Subsequent
        // upserts must never see stale rows.
        let mut evict: Vec<&str> = plan
            .files_to_remove
            .iter()
            .map(String::as_str)
            .collect();
        evict.extend(plan.files_to_index.iter().map(|f| f.rel_path.as_str()));
        for rel_path in &evict {
            self.vector_repo.delete_by_file_path(rel_path).await?;
            let prefix = format!("{}:", rel_path);
            self.catalog
                .bm25
                .write()
                .expect("bm25 lock poisoned")
                .remove_documents_by_prefix(&prefix);
            self.catalog
                .fuzzy
                .write()
                .expect("fuzzy lock poisoned")
                .remove_by_prefix(&prefix);
            self.catalog
                .xref
                .write()
                .expect("xref lock poisoned")
                .remove_file(rel_path);
        }
        for rel_path in &plan.files_to_remove {
            file_index.remove_file(rel_path);
        }

        let mut deadline_exceeded = deadline_hit(deadline);
        let total_files = plan.files_to_index.len();
        let mut works: Vec<FileWork> = Vec::with_capacity(total_files);

        if !deadline_exceeded {
            // Parse and chunk in a bounded pool. The pool only suspends on
            // file reads; AST work is pure CPU.
            report_progress(IndexPhase::Analyzing, 0, total_files);
            let mut stream = futures_util::stream::iter(plan.files_to_index.clone())
                .map(|info| self.analyze_file(info))
                .buffer_unordered(self.workers);

            let mut analyzed = 0usize;
            while let Some(work) = stream.next().await {
                analyzed += 1;
                report_progress(IndexPhase::Analyzing, analyzed, total_files);
                if let Some(work) = work {
                    works.push(work);
                }
                if deadline_hit(deadline) {
                    deadline_exceeded = true;
                    break;
                }
            }
            drop(stream);
        }

        // Embed in fixed-size batches; a file's records land only after
        // every one of its chunks is embedded and upserted.
        let mut files_indexed = 0usize;
        let mut chunks_indexed = 0usize;

        if !deadline_exceeded {
            let mut remaining: Vec<usize> = works.iter().map(|w| w.chunks.len()).collect();

            // Chunkless files (empty or all fragments dropped) commit
            // immediately.
            for work in works.iter().filter(|w| w.chunks.is_empty()) {
                self.commit_file(work, file_index);
                files_indexed += 1;
            }

            let queue: Vec<(usize, Chunk)> = works
                .iter()
                .enumerate()
                .flat_map(|(idx, work)| {
                    work.chunks.iter().cloned().map(move |c| (idx, c))
                })
                .collect();
            let total_chunks = queue.len();
            report_progress(IndexPhase::Embedding, 0, total_chunks);

            for batch in queue.chunks(EMBED_BATCH_SIZE) {
                if deadline_hit(deadline) {
                    deadline_exceeded = true;
                    break;
                }

                let chunk_refs: Vec<&Chunk> = batch.iter().map(|(_, c)| c).collect();
                let texts: Vec<String> =
                    chunk_refs.iter().map(|c| c.index_text().to_string()).collect();
                let vectors = self.embed_with_retry(&texts).await?;
                let owned: Vec<Chunk> = chunk_refs.into_iter().cloned().collect();
                self.vector_repo.upsert(&owned, &vectors).await?;

                for (idx, _) in batch {
                    remaining[*idx] -= 1;
                    if remaining[*idx] == 0 {
                        self.commit_file(&works[*idx], file_index);
                        files_indexed += 1;
                    }
                }
                chunks_indexed += batch.len();
                report_progress(IndexPhase::Embedding, chunks_indexed, total_chunks);
            }
        }

        // Reverse references are rebuilt over whatever made it into the
        // graph; the merge is pure computation.
        self.catalog
            .xref
            .write()
            .expect("xref lock poisoned")
            .build_reverse_references();

        // Persist in the prescribed order: file index, xref graph, BM25,
        // fuzzy. A crash leaves the file index at most as optimistic as
        // the retrieval substrate.
        report_progress(IndexPhase::Saving, 0, 4);
        file_index.save().await?;
        report_progress(IndexPhase::Saving, 1, 4);
        self.catalog.save_xref().await?;
        report_progress(IndexPhase::Saving, 2, 4);
        self.catalog.save_bm25().await?;
        report_progress(IndexPhase::Saving, 3, 4);
        self.catalog.save_fuzzy().await?;
        report_progress(IndexPhase::Complete, total_files, total_files);

        let report = IndexReport {
            is_full_reindex: plan.is_full_reindex,
            reason: plan.reason.clone(),
            stats: plan.stats.clone(),
            files_indexed,
            chunks_indexed,
            files_removed: plan.files_to_remove.len(),
            deadline_exceeded,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Index run: {} file(s), {} chunk(s), {} removed in {}ms",
            report.files_indexed, report.chunks_indexed, report.files_removed, report.duration_ms
        );
        Ok(report)
    }

    async fn analyze_file(&self, info: FileInfo) -> Option<FileWork> {
        let content = match tokio::fs::read_to_string(&info.path).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to read {}: {}", info.path.display(), e);
                return None;
            }
        };

        let xref = self
            .parser
            .extract_file_xref(&content, &info.rel_path, info.language)
            .unwrap_or_else(|e| {
                debug!("Xref extraction failed for {}: {}", info.rel_path, e);
                FileXref::default()
            });

        let chunks = self.chunker.chunk_file(
            &info.path.to_string_lossy(),
            &info.rel_path,
            &content,
            info.language,
            Some(&xref),
        );

        Some(FileWork { info, xref, chunks })
    }

    /// Record a fully-processed file in the lexical, symbol and xref
    /// structures plus the file index. Called only after every chunk of
    /// the file has been embedded and upserted.
    fn commit_file(&self, work: &FileWork, file_index: &mut FileIndex) {
        {
            let mut bm25 = self.catalog.bm25.write().expect("bm25 lock poisoned");
            for chunk in &work.chunks {
                bm25.add_document(
                    &chunk.lexical_id(),
                    chunk.index_text(),
                    Bm25DocMeta {
                        chunk_id: chunk.id().to_string(),
                        rel_path: chunk.relative_path().to_string(),
                        name: chunk.name().map(String::from),
                        kind: chunk.kind().as_str().to_string(),
                    },
                );
            }
        }
        {
            let mut fuzzy = self.catalog.fuzzy.write().expect("fuzzy lock poisoned");
            for chunk in &work.chunks {
                if let Some(name) = chunk.name() {
                    fuzzy.add_symbol(SymbolEntry {
                        file_path: chunk.file_path().to_string(),
                        rel_path: chunk.relative_path().to_string(),
                        name: name.to_string(),
                        kind: chunk.kind(),
                        line: chunk.start_line(),
                        scope: chunk.scope().to_string(),
                    });
                }
            }
        }
        self.catalog
            .xref
            .write()
            .expect("xref lock poisoned")
            .add_file(work.xref.clone());

        file_index.update_file(FileRecord::from_crawl(
            &work.info,
            now_ms(),
            work.chunks.len() as u32,
        ));
    }

    async fn embed_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        match self.embedding_service.embed_batch(texts).await {
            Ok(vectors) => Ok(vectors),
            Err(first) => {
                warn!("Embedding batch failed, retrying once: {}", first);
                tokio::time::sleep(EMBED_RETRY_BACKOFF).await;
                self.embedding_service.embed_batch(texts).await
            }
        }
    }
}

fn deadline_hit(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMode {
    Full,
    Incremental,
}

/// Facade tying planner and pipeline together around one project root and
/// data directory. Holds the single writer lock for all persisted
/// artifacts.
pub struct IndexEngine {
    project_root: PathBuf,
    data_dir: PathBuf,
    git: Arc<GitTracker>,
    planner: IncrementalPlanner,
    pipeline: IndexPipeline,
    run_lock: tokio::sync::Mutex<()>,
}

impl IndexEngine {
    pub fn new(
        project_root: impl Into<PathBuf>,
        data_dir: impl Into<PathBuf>,
        parser: Arc<dyn ParserService>,
        vector_repo: Arc<dyn VectorRepository>,
        embedding_service: Arc<dyn EmbeddingService>,
        catalog: Arc<IndexCatalog>,
    ) -> Self {
        let project_root = project_root.into();
        let git = Arc::new(GitTracker::new(&project_root));
        let planner = IncrementalPlanner::new(Crawler::new(&project_root), git.clone());
        let pipeline = IndexPipeline::new(parser, vector_repo, embedding_service, catalog);
        Self {
            project_root,
            data_dir: data_dir.into(),
            git,
            planner,
            pipeline,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_chunker_config(mut self, config: ChunkerConfig) -> Self {
        self.pipeline = self.pipeline.with_chunker_config(config);
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn git(&self) -> &Arc<GitTracker> {
        &self.git
    }

    /// Plan without executing.
    pub async fn plan(
        &self,
        mode: IndexMode,
        include_uncommitted: bool,
    ) -> Result<IndexPlan, DomainError> {
        self.git.initialize().await;
        let root_key = self.project_root.to_string_lossy();
        let file_index = FileIndex::load(&self.data_dir, &root_key).await;
        let state = load_index_state(&self.data_dir).await;
        self.planner
            .plan(
                &file_index,
                &state,
                include_uncommitted,
                mode == IndexMode::Full,
            )
            .await
    }

    /// Plan and execute one index run. The index state only advances when
    /// the run completes in full, so interrupted work is re-detected next
    /// time.
    pub async fn run(
        &self,
        mode: IndexMode,
        include_uncommitted: bool,
        progress: Option<ProgressFn>,
        deadline: Option<Instant>,
    ) -> Result<IndexReport, DomainError> {
        let _guard = self.run_lock.lock().await;

        self.git.initialize().await;
        let root_key = self.project_root.to_string_lossy().to_string();
        let mut file_index = FileIndex::load(&self.data_dir, &root_key).await;
        let state = load_index_state(&self.data_dir).await;

        if let Some(cb) = &progress {
            cb(IndexPhase::Crawling, 0, 0);
        }
        let plan = self
            .planner
            .plan(
                &file_index,
                &state,
                include_uncommitted,
                mode == IndexMode::Full,
            )
            .await?;

        let report = self
            .pipeline
            .execute(&plan, &mut file_index, progress, deadline)
            .await?;

        if !report.deadline_exceeded {
            let new_state = IndexState {
                last_indexed_commit: plan.commit.clone(),
                last_indexed_at: now_ms(),
                branch: plan.branch.clone(),
                total_files: plan.stats.total_files_in_repo,
                includes_uncommitted: plan.includes_uncommitted,
            };
            save_index_state(&self.data_dir, &new_state).await?;
        }

        Ok(report)
    }
}
