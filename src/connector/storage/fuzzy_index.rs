use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{ChunkKind, DomainError};

pub const FUZZY_SCHEMA_VERSION: u32 = 1;

pub const FUZZY_INDEX_NAME: &str = "fuzzy-index.bin";

/// Symbol kinds worth indexing for name lookup.
fn is_indexable_kind(kind: ChunkKind) -> bool {
    matches!(
        kind,
        ChunkKind::Function
            | ChunkKind::Method
            | ChunkKind::Class
            | ChunkKind::Interface
            | ChunkKind::Type
            | ChunkKind::Enum
            | ChunkKind::Struct
            | ChunkKind::Trait
            | ChunkKind::Impl
            | ChunkKind::Export
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolEntry {
    pub file_path: String,
    pub rel_path: String,
    pub name: String,
    pub kind: ChunkKind,
    pub line: u32,
    pub scope: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolMatch {
    pub entry: SymbolEntry,
    /// Edit distance to the query; lower is better.
    pub distance: usize,
}

/// Name → location index with edit-distance ranking.
///
/// Symbol ids follow the `relPath:name` convention so per-file removal is
/// a prefix scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FuzzySymbolIndex {
    symbols: BTreeMap<String, SymbolEntry>,
}

impl FuzzySymbolIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbol_id(rel_path: &str, name: &str) -> String {
        format!("{}:{}", rel_path, name)
    }

    /// Index a symbol; kinds outside the indexable set are ignored.
    pub fn add_symbol(&mut self, entry: SymbolEntry) {
        if !is_indexable_kind(entry.kind) {
            return;
        }
        let id = Self::symbol_id(&entry.rel_path, &entry.name);
        self.symbols.insert(id, entry);
    }

    pub fn remove_by_prefix(&mut self, prefix: &str) -> usize {
        let before = self.symbols.len();
        self.symbols.retain(|id, _| !id.starts_with(prefix));
        before - self.symbols.len()
    }

    pub fn symbols_with_prefix(&self, prefix: &str) -> usize {
        self.symbols
            .keys()
            .filter(|id| id.starts_with(prefix))
            .count()
    }

    /// Rank symbols by edit distance to `query`, optionally restricted to
    /// one kind. Ties break alphabetically on the symbol name. Candidates
    /// further than half the query length away are dropped.
    pub fn search(&self, query: &str, k: usize, kind: Option<ChunkKind>) -> Vec<SymbolMatch> {
        let query_lower = query.to_lowercase();
        let max_distance = (query.len() / 2).max(1);

        let mut matches: Vec<SymbolMatch> = self
            .symbols
            .values()
            .filter(|entry| kind.map_or(true, |k| entry.kind == k))
            .filter_map(|entry| {
                let distance = edit_distance(&entry.name.to_lowercase(), &query_lower);
                (distance <= max_distance).then(|| SymbolMatch {
                    entry: entry.clone(),
                    distance,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            a.distance
                .cmp(&b.distance)
                .then_with(|| a.entry.name.cmp(&b.entry.name))
        });
        matches.truncate(k);
        matches
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
    }

    pub fn serialize(&self) -> Result<Vec<u8>, DomainError> {
        postcard::to_allocvec(&(FUZZY_SCHEMA_VERSION, self))
            .map_err(|e| DomainError::storage(format!("Failed to encode fuzzy index: {}", e)))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, DomainError> {
        let (version, index): (u32, FuzzySymbolIndex) = postcard::from_bytes(bytes)
            .map_err(|e| DomainError::storage(format!("Failed to decode fuzzy index: {}", e)))?;
        if version != FUZZY_SCHEMA_VERSION {
            debug!(
                "Discarding fuzzy snapshot (version {}, want {})",
                version, FUZZY_SCHEMA_VERSION
            );
            return Ok(Self::new());
        }
        Ok(index)
    }
}

/// Levenshtein distance over byte strings, single-row DP.
pub fn edit_distance(a: &str, b: &str) -> usize {
    if a == b {
        return 0;
    }
    let a: Vec<u8> = a.bytes().collect();
    let b: Vec<u8> = b.bytes().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut previous_diagonal = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            let next = (previous_diagonal + cost)
                .min(row[j] + 1)
                .min(row[j + 1] + 1);
            previous_diagonal = row[j + 1];
            row[j + 1] = next;
        }
    }
    row[b.len()]
}
