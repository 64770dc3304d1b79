use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, warn};

use super::bm25_index::{Bm25Index, BM25_INDEX_NAME};
use super::file_index::write_atomic;
use super::fuzzy_index::{FuzzySymbolIndex, FUZZY_INDEX_NAME};
use crate::domain::{DomainError, IndexState, XrefGraph};

pub const XREF_GRAPH_NAME: &str = "xref-graph.json";
pub const INDEX_STATE_NAME: &str = "index-state.json";

/// The retrieval artifacts shared between the indexing pipeline (single
/// writer) and the query paths (readers): the BM25 index, the fuzzy symbol
/// index and the cross-reference graph.
///
/// Locks are synchronous on purpose: posting updates and graph merges are
/// pure computation and must not suspend.
pub struct IndexCatalog {
    data_dir: PathBuf,
    pub bm25: RwLock<Bm25Index>,
    pub fuzzy: RwLock<FuzzySymbolIndex>,
    pub xref: RwLock<XrefGraph>,
}

impl IndexCatalog {
    /// Load every artifact from `data_dir`; missing or unreadable files
    /// start empty.
    pub async fn load(data_dir: &Path) -> Self {
        let bm25 = match tokio::fs::read(data_dir.join(BM25_INDEX_NAME)).await {
            Ok(bytes) => Bm25Index::deserialize(&bytes).unwrap_or_else(|e| {
                warn!("Discarding BM25 snapshot: {}", e);
                Bm25Index::new()
            }),
            Err(_) => Bm25Index::new(),
        };

        let fuzzy = match tokio::fs::read(data_dir.join(FUZZY_INDEX_NAME)).await {
            Ok(bytes) => FuzzySymbolIndex::deserialize(&bytes).unwrap_or_else(|e| {
                warn!("Discarding fuzzy snapshot: {}", e);
                FuzzySymbolIndex::new()
            }),
            Err(_) => FuzzySymbolIndex::new(),
        };

        let xref = match tokio::fs::read_to_string(data_dir.join(XREF_GRAPH_NAME)).await {
            Ok(raw) => XrefGraph::deserialize_json(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable xref graph: {}", e);
                XrefGraph::new()
            }),
            Err(_) => XrefGraph::new(),
        };

        debug!(
            "Loaded index catalog from {} (bm25: {} docs, fuzzy: {} symbols, xref: {} defs)",
            data_dir.display(),
            bm25.len(),
            fuzzy.len(),
            xref.definition_count()
        );

        Self {
            data_dir: data_dir.to_path_buf(),
            bm25: RwLock::new(bm25),
            fuzzy: RwLock::new(fuzzy),
            xref: RwLock::new(xref),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            data_dir: PathBuf::new(),
            bm25: RwLock::new(Bm25Index::new()),
            fuzzy: RwLock::new(FuzzySymbolIndex::new()),
            xref: RwLock::new(XrefGraph::new()),
        }
    }

    fn persistent(&self) -> bool {
        !self.data_dir.as_os_str().is_empty()
    }

    pub async fn save_xref(&self) -> Result<(), DomainError> {
        if !self.persistent() {
            return Ok(());
        }
        let json = {
            let xref = self.xref.read().expect("xref lock poisoned");
            xref.serialize_json()
                .map_err(|e| DomainError::storage(format!("Failed to encode xref graph: {}", e)))?
        };
        write_atomic(&self.data_dir.join(XREF_GRAPH_NAME), json.as_bytes()).await
    }

    pub async fn save_bm25(&self) -> Result<(), DomainError> {
        if !self.persistent() {
            return Ok(());
        }
        let bytes = {
            let bm25 = self.bm25.read().expect("bm25 lock poisoned");
            bm25.serialize()?
        };
        write_atomic(&self.data_dir.join(BM25_INDEX_NAME), &bytes).await
    }

    pub async fn save_fuzzy(&self) -> Result<(), DomainError> {
        if !self.persistent() {
            return Ok(());
        }
        let bytes = {
            let fuzzy = self.fuzzy.read().expect("fuzzy lock poisoned");
            fuzzy.serialize()?
        };
        write_atomic(&self.data_dir.join(FUZZY_INDEX_NAME), &bytes).await
    }
}

pub async fn load_index_state(data_dir: &Path) -> IndexState {
    match tokio::fs::read_to_string(data_dir.join(INDEX_STATE_NAME)).await {
        Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Discarding unreadable index state: {}", e);
            IndexState::default()
        }),
        Err(_) => IndexState::default(),
    }
}

pub async fn save_index_state(data_dir: &Path, state: &IndexState) -> Result<(), DomainError> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| DomainError::storage(format!("Failed to encode index state: {}", e)))?;
    write_atomic(&data_dir.join(INDEX_STATE_NAME), json.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::storage::bm25_index::Bm25DocMeta;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_catalog_round_trip() {
        let dir = TempDir::new().unwrap();

        let catalog = IndexCatalog::load(dir.path()).await;
        catalog.bm25.write().unwrap().add_document(
            "a.rs:1:3",
            "alpha beta",
            Bm25DocMeta::default(),
        );
        catalog.save_bm25().await.unwrap();
        catalog.save_xref().await.unwrap();
        catalog.save_fuzzy().await.unwrap();

        let reloaded = IndexCatalog::load(dir.path()).await;
        assert_eq!(reloaded.bm25.read().unwrap().len(), 1);
        assert!(reloaded.fuzzy.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_state_round_trip() {
        let dir = TempDir::new().unwrap();
        let state = IndexState {
            last_indexed_commit: Some("abc".to_string()),
            last_indexed_at: 99,
            branch: Some("main".to_string()),
            total_files: 4,
            includes_uncommitted: false,
        };
        save_index_state(dir.path(), &state).await.unwrap();
        assert_eq!(load_index_state(dir.path()).await, state);
    }

    #[tokio::test]
    async fn test_missing_files_start_empty() {
        let dir = TempDir::new().unwrap();
        let catalog = IndexCatalog::load(dir.path()).await;
        assert!(catalog.bm25.read().unwrap().is_empty());
        assert!(catalog.fuzzy.read().unwrap().is_empty());
        assert_eq!(load_index_state(dir.path()).await, IndexState::default());
    }
}
