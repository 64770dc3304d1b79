use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::EmbeddingService;
use crate::domain::DomainError;

/// Remote embedding backend speaking the common `/embeddings` JSON shape:
/// `{"model": …, "input": […]}` in, `{"data": [{"embedding": […]}…]}` out.
///
/// The adapter validates response shape and dimensions; retry policy lives
/// in the indexing pipeline, not here.
pub struct HttpEmbedding {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl HttpEmbedding {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
            dimensions,
        }
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        let mut request = self.client.post(&self.endpoint).json(&EmbeddingRequest {
            model: &self.model,
            input,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DomainError::embedding(format!("Embedding request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::embedding(format!(
                "Embedding endpoint returned {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| DomainError::embedding(format!("Malformed embedding response: {}", e)))?;

        if parsed.data.len() != input.len() {
            return Err(DomainError::embedding(format!(
                "Embedding count mismatch: sent {}, got {}",
                input.len(),
                parsed.data.len()
            )));
        }
        for datum in &parsed.data {
            if datum.embedding.len() != self.dimensions {
                return Err(DomainError::embedding(format!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.dimensions,
                    datum.embedding.len()
                )));
            }
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingService for HttpEmbedding {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, DomainError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.request(texts).await?;
        debug!(
            "Embedded {} texts via {} ({})",
            texts.len(),
            self.endpoint,
            self.model
        );
        Ok(vectors)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, DomainError> {
        let mut vectors = self.request(&[query.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| DomainError::embedding("Empty embedding response"))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
