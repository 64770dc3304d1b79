use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use duckdb::{params, Connection, Row};
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::{VectorRepository, VectorStoreStats};
use crate::domain::{Chunk, ChunkKind, DomainError, Language, SearchQuery, SearchResult};

pub const DEFAULT_VECTOR_DIMENSIONS: usize = 384;

pub const VECTOR_STORE_NAME: &str = "vectors.duckdb";

pub struct DuckdbVectorRepository {
    conn: Arc<Mutex<Connection>>,
    dimensions: usize,
    closed: AtomicBool,
}

impl DuckdbVectorRepository {
    pub fn new(path: &Path) -> Result<Self, DomainError> {
        Self::with_dimensions(path, DEFAULT_VECTOR_DIMENSIONS)
    }

    pub fn with_dimensions(path: &Path, dimensions: usize) -> Result<Self, DomainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| DomainError::storage(format!("Failed to open DuckDB database: {}", e)))?;
        Self::initialize(&conn, dimensions)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimensions,
            closed: AtomicBool::new(false),
        })
    }

    pub fn in_memory() -> Result<Self, DomainError> {
        Self::in_memory_with_dimensions(DEFAULT_VECTOR_DIMENSIONS)
    }

    pub fn in_memory_with_dimensions(dimensions: usize) -> Result<Self, DomainError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            DomainError::storage(format!("Failed to open DuckDB in-memory DB: {}", e))
        })?;
        Self::initialize(&conn, dimensions)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimensions,
            closed: AtomicBool::new(false),
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Initializes tables and enables the VSS extension.
    fn initialize(conn: &Connection, dimensions: usize) -> Result<(), DomainError> {
        conn.execute_batch(
            "INSTALL vss; LOAD vss; SET hnsw_enable_experimental_persistence = true;",
        )
        .map_err(|e| DomainError::storage(format!("Failed to initialize VSS extension: {}", e)))?;

        let schema_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                relative_path TEXT NOT NULL,
                code TEXT NOT NULL,
                start_line INTEGER NOT NULL,
                end_line INTEGER NOT NULL,
                language TEXT NOT NULL,
                kind TEXT NOT NULL,
                name TEXT,
                scope TEXT NOT NULL,
                docstring TEXT,
                token_estimate INTEGER NOT NULL,
                last_updated BIGINT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS embeddings (
                chunk_id TEXT PRIMARY KEY,
                vector FLOAT[{dims}] NOT NULL
            );

            CREATE INDEX IF NOT EXISTS chunk_path_idx ON chunks (relative_path);
            CREATE INDEX IF NOT EXISTS embedding_hnsw_idx ON embeddings USING HNSW (vector) WITH (metric = 'cosine');
            "#,
            dims = dimensions
        );

        conn.execute_batch(&schema_sql)
            .map_err(|e| DomainError::storage(format!("Failed to initialize DuckDB schema: {}", e)))?;

        debug!("DuckDB schema initialized ({} dims)", dimensions);
        Ok(())
    }

    fn vector_to_array_literal(&self, vector: &[f32]) -> Result<String, DomainError> {
        if vector.len() != self.dimensions {
            return Err(DomainError::invalid_input(format!(
                "Expected embedding dimension {}, got {}",
                self.dimensions,
                vector.len()
            )));
        }
        let mut s = String::with_capacity(vector.len() * 8);
        s.push('[');
        for (i, v) in vector.iter().enumerate() {
            if i > 0 {
                s.push_str(", ");
            }
            s.push_str(&format!("{}", v));
        }
        s.push(']');
        s.push_str(&format!("::FLOAT[{}]", self.dimensions));
        Ok(s)
    }

    fn row_to_chunk(row: &Row) -> Result<Chunk, duckdb::Error> {
        Ok(Chunk::reconstitute(
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            u32::try_from(row.get::<_, i64>(4)?).unwrap_or(0),
            u32::try_from(row.get::<_, i64>(5)?).unwrap_or(0),
            Language::parse(&row.get::<_, String>(6)?),
            ChunkKind::parse(&row.get::<_, String>(7)?),
            row.get::<_, Option<String>>(8)?,
            row.get::<_, String>(9)?,
            row.get::<_, Option<String>>(10)?,
            usize::try_from(row.get::<_, i64>(11)?).unwrap_or(0),
            u64::try_from(row.get::<_, i64>(12)?).unwrap_or(0),
        ))
    }

    const CHUNK_COLUMNS: &'static str = "c.id, c.file_path, c.relative_path, c.code, \
         c.start_line, c.end_line, c.language, c.kind, c.name, c.scope, c.docstring, \
         c.token_estimate, c.last_updated";

    fn filter_clauses(query: &SearchQuery) -> Vec<String> {
        let quote = |values: &[String]| {
            values
                .iter()
                .map(|v| format!("'{}'", v.replace('\'', "''")))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut clauses = Vec::new();
        if let Some(languages) = query.languages() {
            clauses.push(format!("c.language IN ({})", quote(languages)));
        }
        if let Some(kinds) = query.kinds() {
            clauses.push(format!("c.kind IN ({})", quote(kinds)));
        }
        if let Some(prefix) = query.path_prefix() {
            let safe = prefix.replace('\'', "''").replace('%', "\\%");
            clauses.push(format!(
                "c.relative_path LIKE '{}%' ESCAPE '\\'",
                safe
            ));
        }
        clauses
    }
}

#[async_trait]
impl VectorRepository for DuckdbVectorRepository {
    async fn upsert(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<(), DomainError> {
        if chunks.is_empty() {
            return Ok(());
        }
        if self.is_closed() {
            return Err(DomainError::not_initialized("vector store is closed"));
        }
        if chunks.len() != vectors.len() {
            return Err(DomainError::invalid_input(
                "Chunk and vector count mismatch".to_string(),
            ));
        }

        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO chunks \
                     (id, file_path, relative_path, code, start_line, end_line, language, kind, \
                      name, scope, docstring, token_estimate, last_updated) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .map_err(|e| DomainError::storage(format!("Failed to prepare chunk insert: {}", e)))?;

            for chunk in chunks {
                stmt.execute(params![
                    chunk.id(),
                    chunk.file_path(),
                    chunk.relative_path(),
                    chunk.code(),
                    chunk.start_line() as i64,
                    chunk.end_line() as i64,
                    chunk.language().as_str(),
                    chunk.kind().as_str(),
                    chunk.name(),
                    chunk.scope(),
                    chunk.docstring(),
                    chunk.token_estimate() as i64,
                    chunk.last_updated_ms() as i64,
                ])
                .map_err(|e| {
                    DomainError::storage(format!("Failed to insert chunk {}: {}", chunk.id(), e))
                })?;
            }
        }

        for (chunk, vector) in chunks.iter().zip(vectors) {
            let array_lit = self.vector_to_array_literal(vector)?;
            // The array literal must be inlined: DuckDB fixed-size FLOAT[N]
            // values don't bind as parameters.
            let sql = format!(
                "INSERT OR REPLACE INTO embeddings (chunk_id, vector) VALUES (?, {})",
                array_lit
            );
            tx.execute(&sql, params![chunk.id()]).map_err(|e| {
                DomainError::storage(format!(
                    "Failed to insert embedding for chunk {}: {}",
                    chunk.id(),
                    e
                ))
            })?;
        }

        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Upserted {} chunks into vector store", chunks.len());
        Ok(())
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        query: &SearchQuery,
    ) -> Result<Vec<SearchResult>, DomainError> {
        if self.is_closed() {
            return Ok(Vec::new());
        }
        let array_lit = self.vector_to_array_literal(query_embedding)?;
        let limit = query.fetch_limit();

        let mut sql = format!(
            "SELECT {cols}, 1.0 - array_cosine_distance(e.vector, {lit}) AS score \
             FROM embeddings e JOIN chunks c ON c.id = e.chunk_id",
            cols = Self::CHUNK_COLUMNS,
            lit = array_lit,
        );
        let clauses = Self::filter_clauses(query);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(
            " ORDER BY array_cosine_distance(e.vector, {lit}) LIMIT ?",
            lit = array_lit
        ));

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare vector search: {}", e)))?;
        let mut rows = stmt
            .query(params![limit as i64])
            .map_err(|e| DomainError::storage(format!("Failed to run vector search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read search row: {}", e)))?
        {
            let score: f32 = row
                .get(13)
                .map_err(|e| DomainError::storage(format!("Failed to read score: {}", e)))?;
            if let Some(min) = query.min_score() {
                if score < min {
                    continue;
                }
            }
            let chunk = Self::row_to_chunk(row)
                .map_err(|e| DomainError::storage(format!("Failed to parse chunk row: {}", e)))?;
            results.push(SearchResult::new(chunk, score));
        }
        Ok(results)
    }

    async fn get_by_ids(&self, chunk_ids: &[String]) -> Result<Vec<Chunk>, DomainError> {
        if chunk_ids.is_empty() || self.is_closed() {
            return Ok(Vec::new());
        }
        let quoted = chunk_ids
            .iter()
            .map(|id| format!("'{}'", id.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {cols} FROM chunks c WHERE c.id IN ({quoted})",
            cols = Self::CHUNK_COLUMNS,
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare id lookup: {}", e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| DomainError::storage(format!("Failed to run id lookup: {}", e)))?;

        let mut chunks = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read chunk row: {}", e)))?
        {
            chunks.push(
                Self::row_to_chunk(row)
                    .map_err(|e| DomainError::storage(format!("Failed to parse chunk row: {}", e)))?,
            );
        }
        Ok(chunks)
    }

    async fn get_by_file_path(&self, rel_path: &str) -> Result<Vec<Chunk>, DomainError> {
        if self.is_closed() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {cols} FROM chunks c WHERE c.relative_path = ? ORDER BY c.start_line",
            cols = Self::CHUNK_COLUMNS,
        );

        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| DomainError::storage(format!("Failed to prepare path lookup: {}", e)))?;
        let mut rows = stmt
            .query(params![rel_path])
            .map_err(|e| DomainError::storage(format!("Failed to run path lookup: {}", e)))?;

        let mut chunks = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read chunk row: {}", e)))?
        {
            chunks.push(
                Self::row_to_chunk(row)
                    .map_err(|e| DomainError::storage(format!("Failed to parse chunk row: {}", e)))?,
            );
        }
        Ok(chunks)
    }

    async fn delete_by_file_path(&self, rel_path: &str) -> Result<u64, DomainError> {
        if self.is_closed() {
            return Ok(0);
        }
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| DomainError::storage(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM embeddings WHERE chunk_id IN \
             (SELECT id FROM chunks WHERE relative_path = ?)",
            params![rel_path],
        )
        .map_err(|e| DomainError::storage(format!("Failed to delete embeddings: {}", e)))?;

        let deleted = tx
            .execute(
                "DELETE FROM chunks WHERE relative_path = ?",
                params![rel_path],
            )
            .map_err(|e| DomainError::storage(format!("Failed to delete chunks: {}", e)))?;

        tx.commit()
            .map_err(|e| DomainError::storage(format!("Failed to commit: {}", e)))?;

        debug!("Deleted {} chunks for {}", deleted, rel_path);
        Ok(deleted as u64)
    }

    async fn stats(&self) -> Result<VectorStoreStats, DomainError> {
        if self.is_closed() {
            return Ok(VectorStoreStats::default());
        }
        let conn = self.conn.lock().await;

        let total_chunks: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| DomainError::storage(format!("Failed to count chunks: {}", e)))?;

        let mut stats = VectorStoreStats {
            total_chunks: total_chunks as u64,
            ..Default::default()
        };

        let mut stmt = conn
            .prepare("SELECT language, COUNT(*) FROM chunks GROUP BY language")
            .map_err(|e| DomainError::storage(format!("Failed to prepare stats query: {}", e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| DomainError::storage(format!("Failed to run stats query: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read stats row: {}", e)))?
        {
            let language: String = row.get(0).map_err(|e| DomainError::storage(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| DomainError::storage(e.to_string()))?;
            stats.languages.insert(language, count as u64);
        }
        drop(rows);
        drop(stmt);

        let mut stmt = conn
            .prepare("SELECT kind, COUNT(*) FROM chunks GROUP BY kind")
            .map_err(|e| DomainError::storage(format!("Failed to prepare stats query: {}", e)))?;
        let mut rows = stmt
            .query([])
            .map_err(|e| DomainError::storage(format!("Failed to run stats query: {}", e)))?;
        while let Some(row) = rows
            .next()
            .map_err(|e| DomainError::storage(format!("Failed to read stats row: {}", e)))?
        {
            let kind: String = row.get(0).map_err(|e| DomainError::storage(e.to_string()))?;
            let count: i64 = row.get(1).map_err(|e| DomainError::storage(e.to_string()))?;
            stats.kinds.insert(kind, count as u64);
        }

        Ok(stats)
    }

    async fn count(&self) -> Result<u64, DomainError> {
        if self.is_closed() {
            return Ok(0);
        }
        let conn = self.conn.lock().await;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| DomainError::storage(format!("Failed to count chunks: {}", e)))?;
        Ok(count as u64)
    }

    async fn close(&self) -> Result<(), DomainError> {
        // Idempotent: repeated closes (or closing an untouched store) are
        // fine; the connection is released when the Arc drops.
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(rel: &str, code: &str, start: u32, kind: ChunkKind) -> Chunk {
        let end = start + code.lines().count().max(1) as u32 - 1;
        Chunk::new(
            format!("/repo/{rel}"),
            rel.to_string(),
            code.to_string(),
            start,
            end,
            Language::Rust,
            kind,
        )
    }

    fn unit_vector(dims: usize, axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; dims];
        v[axis] = 1.0;
        v
    }

    #[tokio::test]
    async fn test_upsert_and_exact_vector_ranks_first() {
        let repo = DuckdbVectorRepository::in_memory_with_dimensions(3).unwrap();
        let chunks = vec![
            chunk("a.rs", "fn alpha() {}", 1, ChunkKind::Function),
            chunk("b.rs", "fn beta() {}", 1, ChunkKind::Function),
            chunk("c.rs", "fn gamma() {}", 1, ChunkKind::Function),
        ];
        let vectors = vec![
            unit_vector(3, 0),
            unit_vector(3, 1),
            unit_vector(3, 2),
        ];
        repo.upsert(&chunks, &vectors).await.unwrap();

        let query = SearchQuery::new("alpha").with_limit(3);
        let results = repo.search(&[0.9, 0.1, 0.0], &query).await.unwrap();

        assert_eq!(results[0].chunk().relative_path(), "a.rs");
        for other in &results[1..] {
            assert!(results[0].score() >= other.score());
        }
    }

    #[tokio::test]
    async fn test_empty_store_search_returns_empty() {
        let repo = DuckdbVectorRepository::in_memory_with_dimensions(3).unwrap();
        let results = repo
            .search(&[1.0, 0.0, 0.0], &SearchQuery::new("q"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_upsert_empty_is_noop() {
        let repo = DuckdbVectorRepository::in_memory_with_dimensions(3).unwrap();
        repo.upsert(&[], &[]).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_id() {
        let repo = DuckdbVectorRepository::in_memory_with_dimensions(3).unwrap();
        let c = chunk("a.rs", "fn alpha() {}", 1, ChunkKind::Function);
        let v = vec![unit_vector(3, 0)];

        repo.upsert(std::slice::from_ref(&c), &v).await.unwrap();
        repo.upsert(std::slice::from_ref(&c), &v).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_and_delete_by_file_path() {
        let repo = DuckdbVectorRepository::in_memory_with_dimensions(3).unwrap();
        let chunks = vec![
            chunk("a.rs", "fn alpha() {}", 1, ChunkKind::Function),
            chunk("a.rs", "fn alpha_two() {}", 10, ChunkKind::Function),
            chunk("b.rs", "fn beta() {}", 1, ChunkKind::Function),
        ];
        let vectors = vec![unit_vector(3, 0), unit_vector(3, 1), unit_vector(3, 2)];
        repo.upsert(&chunks, &vectors).await.unwrap();

        let rows = repo.get_by_file_path("a.rs").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].start_line(), 1);

        let deleted = repo.delete_by_file_path("a.rs").await.unwrap();
        assert_eq!(deleted, 2);
        assert!(repo.get_by_file_path("a.rs").await.unwrap().is_empty());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_language_and_kind_filters() {
        let repo = DuckdbVectorRepository::in_memory_with_dimensions(3).unwrap();
        let chunks = vec![
            chunk("a.rs", "fn alpha() {}", 1, ChunkKind::Function),
            chunk("b.rs", "struct Beta {}", 1, ChunkKind::Struct),
        ];
        let vectors = vec![unit_vector(3, 0), unit_vector(3, 1)];
        repo.upsert(&chunks, &vectors).await.unwrap();

        let query = SearchQuery::new("q")
            .with_limit(10)
            .with_kinds(vec!["struct".to_string()]);
        let results = repo.search(&[1.0, 0.0, 0.0], &query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk().kind(), ChunkKind::Struct);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let repo = DuckdbVectorRepository::in_memory_with_dimensions(3).unwrap();
        repo.close().await.unwrap();
        repo.close().await.unwrap();

        let results = repo
            .search(&[1.0, 0.0, 0.0], &SearchQuery::new("q"))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
