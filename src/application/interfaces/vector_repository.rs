use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Chunk, DomainError, SearchQuery, SearchResult};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorStoreStats {
    pub total_chunks: u64,
    pub languages: BTreeMap<String, u64>,
    pub kinds: BTreeMap<String, u64>,
}

/// Persistent chunk-row storage with ANN search over embeddings.
#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Insert-or-replace chunks by id. `vectors` pairs with `chunks` by
    /// index. An empty batch is a no-op.
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<(), DomainError>;

    /// K-nearest search by cosine similarity with the query's metadata
    /// filters applied. Returns empty (not an error) before any upsert.
    async fn search(
        &self,
        query_embedding: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, DomainError>;

    async fn search_by_kind(
        &self,
        query_embedding: &[f32],
        query: &SearchQuery,
        kind: &str,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let filtered = query.clone().with_kinds(vec![kind.to_string()]);
        self.search(query_embedding, &filtered).await
    }

    async fn search_by_language(
        &self,
        query_embedding: &[f32],
        query: &SearchQuery,
        language: &str,
    ) -> Result<Vec<SearchResult>, DomainError> {
        let filtered = query.clone().with_languages(vec![language.to_string()]);
        self.search(query_embedding, &filtered).await
    }

    async fn get_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<Chunk>, DomainError>;

    /// All chunk rows for an exact relative path match.
    async fn get_by_file_path(&self, rel_path: &str) -> Result<Vec<Chunk>, DomainError>;

    /// Delete all rows for an exact relative path match; returns the count
    /// removed.
    async fn delete_by_file_path(&self, rel_path: &str) -> Result<u64, DomainError>;

    async fn stats(&self) -> Result<VectorStoreStats, DomainError>;

    async fn count(&self) -> Result<u64, DomainError>;

    /// Release resources. Safe to call repeatedly.
    async fn close(&self) -> Result<(), DomainError>;
}
