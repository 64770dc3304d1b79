use async_trait::async_trait;

use crate::domain::DomainError;

/// Generates dense vectors from text.
///
/// The engine treats the embedder as an opaque external callable: possibly
/// batched, possibly slow, with a fixed output dimension known at
/// configuration time. Batches are capped by the indexing pipeline, not
/// here.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed a batch of index texts. The result has one vector per input,
    /// in order, each of `dimensions()` length.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError>;

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, DomainError>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}
