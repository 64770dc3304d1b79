use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::application::use_cases::fusion::{fuse, LegScores};
use crate::application::{EmbeddingService, VectorRepository};
use crate::connector::storage::IndexCatalog;
use crate::domain::{Chunk, DomainError, SearchQuery, SearchResult};

/// Hybrid retrieval: vector + lexical + fuzzy-symbol legs fanned out, then
/// fused into one ranked list with per-result provenance.
pub struct SearchCodeUseCase {
    vector_repo: Arc<dyn VectorRepository>,
    embedding_service: Arc<dyn EmbeddingService>,
    catalog: Arc<IndexCatalog>,
}

impl SearchCodeUseCase {
    pub fn new(
        vector_repo: Arc<dyn VectorRepository>,
        embedding_service: Arc<dyn EmbeddingService>,
        catalog: Arc<IndexCatalog>,
    ) -> Self {
        Self {
            vector_repo,
            embedding_service,
            catalog,
        }
    }

    pub async fn execute(&self, query: SearchQuery) -> Result<Vec<SearchResult>, DomainError> {
        info!("Hybrid search: {}", query.query());
        let start_time = Instant::now();
        let fetch_limit = query.fetch_limit();

        // Vector leg (the only suspending one).
        let query_embedding = self.embedding_service.embed_query(query.query()).await?;
        let vector_results = self.vector_repo.search(&query_embedding, &query).await?;

        // Lexical leg.
        let bm25_hits = {
            let bm25 = self.catalog.bm25.read().expect("bm25 lock poisoned");
            bm25.search(query.query(), fetch_limit)
        };

        // Fuzzy-symbol leg, only for identifier-looking queries.
        let symbol_matches = if query.is_symbol_like() {
            let fuzzy = self.catalog.fuzzy.read().expect("fuzzy lock poisoned");
            fuzzy.search(query.query(), fetch_limit, None)
        } else {
            Vec::new()
        };

        debug!(
            "Legs: {} vector, {} lexical, {} symbol candidates",
            vector_results.len(),
            bm25_hits.len(),
            symbol_matches.len()
        );

        // Known chunks by id, so fused hits can be materialized.
        let mut chunks: HashMap<String, Chunk> = vector_results
            .iter()
            .map(|r| (r.chunk().id().to_string(), r.chunk().clone()))
            .collect();

        let vector_leg: LegScores = vector_results
            .iter()
            .map(|r| (r.chunk().id().to_string(), r.score()))
            .collect();

        let text_leg: LegScores = bm25_hits
            .iter()
            .map(|hit| (hit.metadata.chunk_id.clone(), hit.score))
            .collect();

        // Resolve symbol matches to the chunk covering the symbol's line.
        let mut symbol_leg: LegScores = Vec::new();
        for m in &symbol_matches {
            let rows = self.vector_repo.get_by_file_path(&m.entry.rel_path).await?;
            let covering = rows
                .iter()
                .filter(|c| c.start_line() <= m.entry.line && m.entry.line <= c.end_line())
                .min_by_key(|c| c.end_line() - c.start_line());
            if let Some(chunk) = covering {
                symbol_leg.push((
                    chunk.id().to_string(),
                    1.0 / (1.0 + m.distance as f32),
                ));
                chunks.insert(chunk.id().to_string(), chunk.clone());
            }
        }

        // Fetch rows for lexical-only hits in one round trip.
        let missing: Vec<String> = text_leg
            .iter()
            .map(|(id, _)| id.clone())
            .filter(|id| !chunks.contains_key(id))
            .collect();
        for chunk in self.vector_repo.get_by_ids(&missing).await? {
            chunks.insert(chunk.id().to_string(), chunk);
        }

        let fused = fuse(vector_leg, text_leg, symbol_leg, query.weights());

        let mut results: Vec<SearchResult> = fused
            .into_iter()
            .filter_map(|hit| {
                chunks.remove(&hit.chunk_id).map(|mut chunk| {
                    self.attach_xref(&mut chunk);
                    SearchResult::new(chunk, hit.score).with_provenance(hit.provenance)
                })
            })
            .collect();
        if let Some(min) = query.min_score() {
            results.retain(|r| r.score() >= min);
        }
        results.truncate(query.limit());

        info!(
            "Hybrid found {} results in {:.2}s",
            results.len(),
            start_time.elapsed().as_secs_f64()
        );
        Ok(results)
    }

    /// Copy a chunk's callers and callees from the cross-reference graph.
    /// Stored rows don't carry them; the graph is the authority.
    fn attach_xref(&self, chunk: &mut Chunk) {
        let Some(name) = chunk.name().map(String::from) else {
            return;
        };
        let xref = self.catalog.xref.read().expect("xref lock poisoned");
        let def = xref.definitions.values().find(|d| {
            d.file == chunk.relative_path() && d.name == name && d.start_line == chunk.start_line()
        });
        if let Some(def) = def {
            chunk.set_calls(def.calls.clone());
            chunk.set_called_by(def.called_by.clone());
        }
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>, DomainError> {
        self.execute(SearchQuery::new(query).with_limit(limit)).await
    }
}
