//! The Vector Store: persisted (vector, metadata, text) triples keyed by
//! stable Chunk IDs, queried by cosine similarity.
//!
//! Backed by SQLite under `<vault>/.obsidianrag/db`, in WAL mode, matching
//! teacher's `db::connect` setup. Internal structure is otherwise
//! unconstrained, so this store does a brute-force cosine scan over the
//! BLOB-encoded embeddings rather than an ANN index — simple, and
//! sufficient for a single personal vault.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;

use crate::embedder::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::models::VectorRecord;

pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Connect to (creating if missing) the vector store database under
    /// `db_dir`, and ensure its schema exists.
    pub async fn open(db_dir: &std::path::Path) -> Result<Self> {
        std::fs::create_dir_all(db_dir)
            .with_context(|| format!("failed to create vector store directory: {}", db_dir.display()))?;
        let db_path = db_dir.join("vectors.sqlite3");

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open vector store at {}", db_path.display()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_vectors (
                chunk_id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL DEFAULT 0,
                text TEXT NOT NULL,
                outbound_links TEXT NOT NULL,
                embedding BLOB NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_vectors_source ON chunk_vectors(source_path)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Add or replace records by Chunk ID. Atomic per call.
    pub async fn upsert(&self, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            let links = serde_json::to_string(&record.outbound_links)?;
            let blob = vec_to_blob(&record.embedding);
            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, source_path, chunk_index, text, outbound_links, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id) DO UPDATE SET
                    source_path = excluded.source_path,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    outbound_links = excluded.outbound_links,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&record.chunk_id)
            .bind(&record.source_path)
            .bind(record.chunk_index as i64)
            .bind(&record.text)
            .bind(&links)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Remove records by Chunk ID.
    pub async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM chunk_vectors WHERE chunk_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Return the `k` records with greatest cosine similarity to `query`, in
    /// descending order, paired with their similarity scores.
    pub async fn query(&self, query: &[f32], k: usize) -> Result<Vec<(VectorRecord, f64)>> {
        let rows = sqlx::query(
            "SELECT chunk_id, source_path, chunk_index, text, outbound_links, embedding FROM chunk_vectors",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<(VectorRecord, f64)> = rows
            .into_iter()
            .map(|row| {
                let embedding = blob_to_vec(row.get::<Vec<u8>, _>("embedding").as_slice());
                let links: Vec<String> =
                    serde_json::from_str(row.get::<String, _>("outbound_links").as_str()).unwrap_or_default();
                let score = cosine_similarity(query, &embedding);
                let record = VectorRecord {
                    chunk_id: row.get("chunk_id"),
                    embedding,
                    source_path: row.get("source_path"),
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    text: row.get("text"),
                    outbound_links: links,
                };
                (record, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// All stored records, used by the Lexical Store to rebuild at startup.
    pub async fn all_records(&self) -> Result<Vec<VectorRecord>> {
        let rows = sqlx::query(
            "SELECT chunk_id, source_path, chunk_index, text, outbound_links, embedding FROM chunk_vectors",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let embedding = blob_to_vec(row.get::<Vec<u8>, _>("embedding").as_slice());
                let links: Vec<String> =
                    serde_json::from_str(row.get::<String, _>("outbound_links").as_str()).unwrap_or_default();
                VectorRecord {
                    chunk_id: row.get("chunk_id"),
                    embedding,
                    source_path: row.get("source_path"),
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    text: row.get("text"),
                    outbound_links: links,
                }
            })
            .collect())
    }

    /// Fetch a single document's full text by concatenating its chunks in
    /// order, used by the Graph Expander. Returns `None` if no chunks for
    /// that path exist.
    pub async fn full_document_text(&self, source_path: &str) -> Result<Option<String>> {
        let rows = sqlx::query(
            "SELECT text FROM chunk_vectors WHERE source_path = ? ORDER BY chunk_index ASC",
        )
        .bind(source_path)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(None);
        }
        let text = rows
            .iter()
            .map(|r| r.get::<String, _>("text"))
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(Some(text))
    }

    /// Distinct source paths currently represented, for case-insensitive
    /// basename lookup in the Graph Expander.
    pub async fn distinct_source_paths(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT source_path FROM chunk_vectors")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("source_path")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, path: &str, embedding: Vec<f32>) -> VectorRecord {
        indexed_record(id, path, 0, embedding)
    }

    fn indexed_record(id: &str, path: &str, chunk_index: usize, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            chunk_id: id.to_string(),
            embedding,
            source_path: path.to_string(),
            chunk_index,
            text: format!("text for {id}"),
            outbound_links: vec![],
        }
    }

    #[tokio::test]
    async fn upsert_and_query_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path()).await.unwrap();

        store
            .upsert(&[
                record("a", "a.md", vec![1.0, 0.0]),
                record("b", "b.md", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        let results = store.query(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.chunk_id, "a");
        assert!((results[0].1 - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn upsert_replaces_by_chunk_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path()).await.unwrap();

        store.upsert(&[record("a", "a.md", vec![1.0, 0.0])]).await.unwrap();
        store.upsert(&[record("a", "a.md", vec![0.0, 1.0])]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let results = store.query(&[0.0, 1.0], 1).await.unwrap();
        assert!((results[0].1 - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path()).await.unwrap();
        store.upsert(&[record("a", "a.md", vec![1.0, 0.0])]).await.unwrap();
        store.delete(&["a".to_string()]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn full_document_text_joins_chunks_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path()).await.unwrap();
        store
            .upsert(&[record("a-0", "a.md", vec![1.0]), record("a-1", "a.md", vec![1.0])])
            .await
            .unwrap();
        let text = store.full_document_text("a.md").await.unwrap().unwrap();
        assert!(text.contains("text for a-0"));
        assert!(text.contains("text for a-1"));
    }

    /// Chunk IDs are content hashes with no relation to document order —
    /// reassembly must sort by `chunk_index`, not by `chunk_id`. These two
    /// chunk IDs sort alphabetically in the opposite order from their true
    /// position, so a regression back to `ORDER BY chunk_id` would flip them.
    #[tokio::test]
    async fn full_document_text_orders_by_chunk_index_not_chunk_id() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path()).await.unwrap();
        store
            .upsert(&[
                indexed_record("zzz-hash", "a.md", 0, vec![1.0]),
                indexed_record("aaa-hash", "a.md", 1, vec![1.0]),
            ])
            .await
            .unwrap();

        let text = store.full_document_text("a.md").await.unwrap().unwrap();
        let first = text.find("text for zzz-hash").unwrap();
        let second = text.find("text for aaa-hash").unwrap();
        assert!(first < second, "expected chunk_index order, got:\n{text}");
    }
}
