use serde::{Deserialize, Serialize};

use super::Chunk;

/// Relative weights for hybrid score fusion. Whatever legs return results
/// have their weights re-normalized to sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub vector: f32,
    pub text: f32,
    pub symbol: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 0.6,
            text: 0.3,
            symbol: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    query: String,
    limit: usize,
    fetch_limit: usize,
    min_score: Option<f32>,
    languages: Option<Vec<String>>,
    kinds: Option<Vec<String>>,
    path_prefix: Option<String>,
    weights: FusionWeights,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: 10,
            fetch_limit: 50,
            min_score: None,
            languages: None,
            kinds: None,
            path_prefix: None,
            weights: FusionWeights::default(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    /// How many candidates each retrieval leg fetches before fusion.
    pub fn with_fetch_limit(mut self, fetch_limit: usize) -> Self {
        self.fetch_limit = fetch_limit.max(1);
        self
    }

    pub fn with_min_score(mut self, score: f32) -> Self {
        self.min_score = Some(score);
        self
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = Some(languages);
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<String>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn with_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    pub fn with_weights(mut self, weights: FusionWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit.max(self.limit)
    }

    pub fn min_score(&self) -> Option<f32> {
        self.min_score
    }

    pub fn languages(&self) -> Option<&[String]> {
        self.languages.as_deref()
    }

    pub fn kinds(&self) -> Option<&[String]> {
        self.kinds.as_deref()
    }

    pub fn path_prefix(&self) -> Option<&str> {
        self.path_prefix.as_deref()
    }

    pub fn weights(&self) -> FusionWeights {
        self.weights
    }

    pub fn has_filters(&self) -> bool {
        self.languages.is_some() || self.kinds.is_some() || self.path_prefix.is_some()
    }

    /// True when the query looks like a single identifier, which makes the
    /// fuzzy symbol leg worth running.
    pub fn is_symbol_like(&self) -> bool {
        let trimmed = self.query.trim();
        !trimmed.is_empty()
            && !trimmed.contains(char::is_whitespace)
            && trimmed
                .chars()
                .next()
                .is_some_and(|c| c.is_alphabetic() || c == '_')
            && trimmed.chars().all(|c| c.is_alphanumeric() || c == '_')
    }
}

/// Which retrieval legs produced a result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    pub vector: bool,
    pub text: bool,
    pub symbol: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    chunk: Chunk,
    score: f32,
    provenance: Provenance,
}

impl SearchResult {
    pub fn new(chunk: Chunk, score: f32) -> Self {
        Self {
            chunk,
            score,
            provenance: Provenance::default(),
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn provenance(&self) -> Provenance {
        self.provenance
    }

    pub fn display_line(&self) -> String {
        format!("{} (score: {:.3})", self.chunk.location(), self.score)
    }
}
