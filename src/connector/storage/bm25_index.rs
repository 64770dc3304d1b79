use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::DomainError;

/// Snapshot schema version; a mismatch discards the snapshot and the index
/// is rebuilt on the next run.
pub const BM25_SCHEMA_VERSION: u32 = 1;

pub const BM25_INDEX_NAME: &str = "bm25-index.bin";

/// Okapi parameters. The defaults are the textbook values; both are
/// tunable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f32,
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.2, b: 0.75 }
    }
}

/// Display metadata carried with each document so search hits can be
/// resolved back to chunks without touching other stores.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bm25DocMeta {
    pub chunk_id: String,
    pub rel_path: String,
    pub name: Option<String>,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DocEntry {
    length: u32,
    metadata: Bm25DocMeta,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bm25Hit {
    pub id: String,
    pub score: f32,
    pub metadata: Bm25DocMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bm25Stats {
    pub document_count: usize,
    pub term_count: usize,
}

/// In-memory Okapi BM25 index with ordered posting lists.
///
/// Document ids follow the `relPath:startLine:endLine` convention so that
/// per-file removal is a prefix scan. Maps are ordered to keep the
/// serialized snapshot deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bm25Index {
    params: Bm25Params,
    docs: BTreeMap<String, DocEntry>,
    /// term → document id → term frequency
    postings: BTreeMap<String, BTreeMap<String, u32>>,
    total_length: u64,
}

impl Default for Bm25Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Bm25Index {
    pub fn new() -> Self {
        Self::with_params(Bm25Params::default())
    }

    pub fn with_params(params: Bm25Params) -> Self {
        Self {
            params,
            docs: BTreeMap::new(),
            postings: BTreeMap::new(),
            total_length: 0,
        }
    }

    /// Split on non-word bytes, lowercase, drop tokens shorter than 2.
    pub fn tokenize(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| t.len() >= 2)
            .map(|t| t.to_lowercase())
            .collect()
    }

    /// Insert-or-replace a document.
    pub fn add_document(&mut self, id: &str, text: &str, metadata: Bm25DocMeta) {
        if self.docs.contains_key(id) {
            self.remove_document(id);
        }

        let tokens = Self::tokenize(text);
        let length = tokens.len() as u32;

        let mut frequencies: BTreeMap<String, u32> = BTreeMap::new();
        for token in tokens {
            *frequencies.entry(token).or_insert(0) += 1;
        }
        for (term, tf) in frequencies {
            self.postings.entry(term).or_default().insert(id.to_string(), tf);
        }

        self.docs.insert(id.to_string(), DocEntry { length, metadata });
        self.total_length += length as u64;
    }

    pub fn remove_document(&mut self, id: &str) {
        let Some(entry) = self.docs.remove(id) else {
            return;
        };
        self.total_length -= entry.length as u64;
        self.postings.retain(|_, docs| {
            docs.remove(id);
            !docs.is_empty()
        });
    }

    /// Drop every document whose id starts with `prefix`; returns how many
    /// were removed. Used with a `relPath:` prefix for per-file eviction.
    pub fn remove_documents_by_prefix(&mut self, prefix: &str) -> usize {
        let ids: Vec<String> = self
            .docs
            .keys()
            .filter(|id| id.starts_with(prefix))
            .cloned()
            .collect();
        for id in &ids {
            self.remove_document(id);
        }
        ids.len()
    }

    pub fn search(&self, query: &str, k: usize) -> Vec<Bm25Hit> {
        if self.docs.is_empty() {
            return Vec::new();
        }

        let n = self.docs.len() as f32;
        let avgdl = (self.total_length as f32 / n).max(1.0);
        let Bm25Params { k1, b } = self.params;

        let mut scores: BTreeMap<&str, f32> = BTreeMap::new();
        for term in Self::tokenize(query) {
            let Some(docs) = self.postings.get(&term) else {
                continue;
            };
            let df = docs.len() as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            for (id, &tf) in docs {
                let dl = self.docs[id].length as f32;
                let tf = tf as f32;
                let score = idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / avgdl));
                *scores.entry(id.as_str()).or_insert(0.0) += score;
            }
        }

        let mut hits: Vec<Bm25Hit> = scores
            .into_iter()
            .map(|(id, score)| Bm25Hit {
                id: id.to_string(),
                score,
                metadata: self.docs[id].metadata.clone(),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits
    }

    pub fn documents_with_prefix(&self, prefix: &str) -> usize {
        self.docs.keys().filter(|id| id.starts_with(prefix)).count()
    }

    pub fn clear(&mut self) {
        self.docs.clear();
        self.postings.clear();
        self.total_length = 0;
    }

    pub fn stats(&self) -> Bm25Stats {
        Bm25Stats {
            document_count: self.docs.len(),
            term_count: self.postings.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Serialize to a compact, versioned binary snapshot.
    pub fn serialize(&self) -> Result<Vec<u8>, DomainError> {
        postcard::to_allocvec(&(BM25_SCHEMA_VERSION, self))
            .map_err(|e| DomainError::storage(format!("Failed to encode BM25 index: {}", e)))
    }

    /// Restore from a snapshot. A version mismatch yields an empty index;
    /// corrupt bytes are an error.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, DomainError> {
        let (version, index): (u32, Bm25Index) = postcard::from_bytes(bytes)
            .map_err(|e| DomainError::storage(format!("Failed to decode BM25 index: {}", e)))?;
        if version != BM25_SCHEMA_VERSION {
            debug!(
                "Discarding BM25 snapshot (version {}, want {})",
                version, BM25_SCHEMA_VERSION
            );
            return Ok(Self::new());
        }
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(chunk_id: &str, rel_path: &str) -> Bm25DocMeta {
        Bm25DocMeta {
            chunk_id: chunk_id.to_string(),
            rel_path: rel_path.to_string(),
            name: None,
            kind: "function".to_string(),
        }
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            Bm25Index::tokenize("fn get_user(id: i32) -> User"),
            vec!["fn", "get_user", "id", "i32", "user"]
        );
        // Single-character tokens are dropped.
        assert_eq!(Bm25Index::tokenize("a + b"), Vec::<String>::new());
    }

    #[test]
    fn test_ranking_prefers_matching_doc() {
        let mut index = Bm25Index::new();
        index.add_document(
            "a.rs:1:3",
            "fn get_user_by_id(id: i32) -> User",
            meta("c1", "a.rs"),
        );
        index.add_document(
            "a.rs:5:8",
            "fn delete_session(token: &str)",
            meta("c2", "a.rs"),
        );
        index.add_document(
            "b.rs:1:4",
            "struct DatabaseConnection { pool: Pool }",
            meta("c3", "b.rs"),
        );

        let hits = index.search("get user", 10);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].id, "a.rs:1:3");
        assert_eq!(hits[0].metadata.chunk_id, "c1");
    }

    #[test]
    fn test_upsert_replaces_document() {
        let mut index = Bm25Index::new();
        index.add_document("a.rs:1:3", "alpha beta", meta("c1", "a.rs"));
        index.add_document("a.rs:1:3", "gamma delta", meta("c1", "a.rs"));

        assert_eq!(index.len(), 1);
        assert!(index.search("alpha", 10).is_empty());
        assert_eq!(index.search("gamma", 10).len(), 1);
    }

    #[test]
    fn test_remove_by_prefix() {
        let mut index = Bm25Index::new();
        index.add_document("a.rs:1:3", "alpha function", meta("c1", "a.rs"));
        index.add_document("a.rs:5:9", "beta function", meta("c2", "a.rs"));
        index.add_document("ab.rs:1:3", "gamma function", meta("c3", "ab.rs"));

        let removed = index.remove_documents_by_prefix("a.rs:");
        assert_eq!(removed, 2);
        assert_eq!(index.documents_with_prefix("a.rs:"), 0);
        assert_eq!(index.documents_with_prefix("ab.rs:"), 1);
        // Postings for removed docs are gone too.
        assert!(index.search("alpha", 10).is_empty());
        assert_eq!(index.search("gamma", 10).len(), 1);
    }

    #[test]
    fn test_empty_index_search() {
        let index = Bm25Index::new();
        assert!(index.search("anything", 10).is_empty());
    }

    #[test]
    fn test_round_trip() {
        let mut index = Bm25Index::with_params(Bm25Params { k1: 0.9, b: 0.4 });
        index.add_document("a.rs:1:3", "alpha beta gamma", meta("c1", "a.rs"));
        index.add_document("b.rs:2:6", "delta epsilon", meta("c2", "b.rs"));

        let bytes = index.serialize().unwrap();
        let restored = Bm25Index::deserialize(&bytes).unwrap();
        assert_eq!(index, restored);
    }

    #[test]
    fn test_serialization_deterministic() {
        let build = || {
            let mut index = Bm25Index::new();
            index.add_document("b.rs:2:6", "delta epsilon", meta("c2", "b.rs"));
            index.add_document("a.rs:1:3", "alpha beta", meta("c1", "a.rs"));
            index
        };
        assert_eq!(build().serialize().unwrap(), build().serialize().unwrap());
    }

    #[test]
    fn test_version_mismatch_yields_empty() {
        let mut index = Bm25Index::new();
        index.add_document("a.rs:1:3", "alpha", meta("c1", "a.rs"));
        let bytes = postcard::to_allocvec(&(BM25_SCHEMA_VERSION + 1, &index)).unwrap();

        let restored = Bm25Index::deserialize(&bytes).unwrap();
        assert!(restored.is_empty());
    }
}
