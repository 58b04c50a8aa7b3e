//! SQLite-backed document store.
//!
//! Embeddings are stored as little-endian `f32` blobs and scored in process;
//! guideline corpora are small enough that a full scan per query is cheap.
//! Blocking rusqlite calls run on the blocking thread pool.

use super::{rank, DocumentStore};
use crate::types::{DocumentChunk, ScoredChunk};
use chrono::{DateTime, Utc};
use medrag_core::{AppError, AppResult};
use rusqlite::{params, Connection, Transaction};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Document store persisted in a single SQLite file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the index database at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Knowledge(format!("Failed to create index directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;
        init_schema(&conn)?;

        tracing::debug!("Opened SQLite index at {:?}", db_path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: db_path.to_path_buf(),
        })
    }

    /// Number of distinct source documents.
    pub async fn source_count(&self) -> AppResult<usize> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(DISTINCT source_document) FROM chunks",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
            .map_err(|e| AppError::Knowledge(format!("Failed to count sources: {}", e)))
        })
        .await
    }

    async fn with_conn<T, F>(&self, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> AppResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| AppError::Knowledge("SQLite connection lock poisoned".to_string()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| AppError::Knowledge(format!("SQLite task failed: {}", e)))?
    }
}

fn init_schema(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_document TEXT NOT NULL,
            section TEXT,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            indexed_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_document);
        "#,
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))
}

fn insert_chunks(tx: &Transaction<'_>, chunks: &[DocumentChunk]) -> AppResult<()> {
    let mut stmt = tx
        .prepare(
            "INSERT OR REPLACE INTO chunks \
             (id, source_document, section, position, text, embedding, indexed_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare insert: {}", e)))?;

    for chunk in chunks {
        stmt.execute(params![
            chunk.id,
            chunk.source_document,
            chunk.section,
            chunk.position as i64,
            chunk.text,
            embedding_to_bytes(&chunk.embedding),
            chunk.indexed_at.to_rfc3339(),
        ])
        .map_err(|e| AppError::Knowledge(format!("Failed to insert chunk: {}", e)))?;
    }
    Ok(())
}

fn begin(conn: &mut Connection) -> AppResult<Transaction<'_>> {
    conn.transaction()
        .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))
}

fn commit(tx: Transaction<'_>) -> AppResult<()> {
    tx.commit()
        .map_err(|e| AppError::Knowledge(format!("Failed to commit chunks: {}", e)))
}

fn load_chunks(conn: &Connection) -> AppResult<Vec<Arc<DocumentChunk>>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_document, section, position, text, embedding, indexed_at FROM chunks",
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            let embedding: Vec<u8> = row.get(5)?;
            let indexed_at: String = row.get(6)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                embedding,
                indexed_at,
            ))
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to query chunks: {}", e)))?;

    let mut chunks = Vec::new();
    for row in rows {
        let (id, source_document, section, position, text, embedding, indexed_at) =
            row.map_err(|e| AppError::Knowledge(format!("Failed to read chunk row: {}", e)))?;

        let indexed_at = DateTime::parse_from_rfc3339(&indexed_at)
            .map_err(|e| {
                AppError::Knowledge(format!("Invalid indexed_at for chunk {}: {}", id, e))
            })?
            .with_timezone(&Utc);

        chunks.push(Arc::new(DocumentChunk {
            embedding: bytes_to_embedding(&embedding)?,
            id,
            source_document,
            section,
            position: position as u32,
            text,
            indexed_at,
        }));
    }

    Ok(chunks)
}

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn count(&self) -> AppResult<usize> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
                .map_err(|e| AppError::Knowledge(format!("Failed to count chunks: {}", e)))
        })
        .await
    }

    async fn search(&self, embedding: &[f32], limit: usize) -> AppResult<Vec<ScoredChunk>> {
        let query = embedding.to_vec();
        let results = self
            .with_conn(move |conn| Ok(rank(&load_chunks(conn)?, &query, limit)))
            .await?;

        tracing::debug!(
            "Retrieved {} chunks (requested top-{})",
            results.len(),
            limit
        );
        Ok(results)
    }

    async fn upsert(&self, chunks: Vec<DocumentChunk>) -> AppResult<usize> {
        self.with_conn(move |conn| {
            let tx = begin(conn)?;
            insert_chunks(&tx, &chunks)?;
            commit(tx)?;
            Ok(chunks.len())
        })
        .await
    }

    async fn replace_source(
        &self,
        source_document: &str,
        chunks: Vec<DocumentChunk>,
    ) -> AppResult<(usize, usize)> {
        let source_document = source_document.to_string();
        self.with_conn(move |conn| {
            // Dropping the transaction on error rolls the delete back.
            let tx = begin(conn)?;
            let removed = tx
                .execute(
                    "DELETE FROM chunks WHERE source_document = ?1",
                    params![source_document],
                )
                .map_err(|e| {
                    AppError::Knowledge(format!("Failed to delete source chunks: {}", e))
                })?;
            insert_chunks(&tx, &chunks)?;
            commit(tx)?;
            Ok((removed, chunks.len()))
        })
        .await
    }

    async fn reset(&self) -> AppResult<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM chunks", [])
                .map_err(|e| AppError::Knowledge(format!("Failed to delete chunks: {}", e)))?;
            Ok(())
        })
        .await?;

        tracing::info!("Reset knowledge base index at {:?}", self.path);
        Ok(())
    }
}

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn bytes_to_embedding(bytes: &[u8]) -> AppResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(AppError::Knowledge(
            "Invalid embedding bytes length".to_string(),
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, source: &str, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id: id.to_string(),
            source_document: source.to_string(),
            section: Some("Dosage".to_string()),
            position: 3,
            text: "Give 10 mg/kg.".to_string(),
            embedding,
            indexed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_search() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp.path().join("index.sqlite")).unwrap();

        store
            .upsert(vec![
                chunk("c1", "malaria.txt", vec![1.0, 0.0, 0.0]),
                chunk("c2", "malaria.txt", vec![0.0, 1.0, 0.0]),
                chunk("c3", "tb.txt", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "c1");
        assert_eq!(results[0].chunk.section.as_deref(), Some("Dosage"));
        assert_eq!(results[0].chunk.position, 3);
        assert_eq!(store.count().await.unwrap(), 3);
        assert_eq!(store.source_count().await.unwrap(), 2);

        let replaced = store
            .replace_source("malaria.txt", vec![chunk("c4", "malaria.txt", vec![1.0, 1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(replaced, (2, 1));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_old_chunks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.sqlite");
        let store = SqliteStore::open(&path).unwrap();
        store
            .upsert(vec![
                chunk("old-1", "malaria.txt", vec![1.0, 0.0]),
                chunk("old-2", "malaria.txt", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        // Make every insert of a replacement chunk fail, as a full disk would
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_new BEFORE INSERT ON chunks \
                 WHEN NEW.id LIKE 'new-%' BEGIN SELECT RAISE(ABORT, 'database or disk is full'); END;",
            )
            .unwrap();

        let err = store
            .replace_source(
                "malaria.txt",
                vec![chunk("new-1", "malaria.txt", vec![1.0, 1.0])],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Knowledge(_)));

        assert_eq!(store.count().await.unwrap(), 2);
        let ids: Vec<String> = store
            .search(&[1.0, 0.0], 5)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.id.clone())
            .collect();
        assert_eq!(ids, vec!["old-1", "old-2"]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("kb").join("index.sqlite");

        let original = chunk("c1", "malaria.txt", vec![0.25, -0.5]);
        {
            let store = SqliteStore::open(&path).unwrap();
            store.upsert(vec![original.clone()]).await.unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let results = reopened.search(&[0.25, -0.5], 1).await.unwrap();
        assert_eq!(results[0].chunk.embedding, original.embedding);
        assert_eq!(
            results[0].chunk.indexed_at.timestamp_micros(),
            original.indexed_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_reset() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::open(&temp.path().join("index.sqlite")).unwrap();
        store
            .upsert(vec![chunk("c1", "a.txt", vec![1.0])])
            .await
            .unwrap();

        store.reset().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&[1.0], 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_embedding_bytes() {
        let embedding = vec![0.5f32, -1.25, 3.0];
        let bytes = embedding_to_bytes(&embedding);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes).unwrap(), embedding);
        assert!(bytes_to_embedding(&bytes[..5]).is_err());
    }
}
