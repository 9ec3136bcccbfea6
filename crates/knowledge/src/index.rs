//! SQLite-backed vector index for knowledge chunks.
//!
//! Embeddings are stored as little-endian `f32` BLOBs and scored in process
//! with cosine similarity. Chunks are scanned in rowid order and sorted
//! stably, so equal scores keep insertion order.

use crate::types::{KnowledgeChunk, KnowledgeSource, ScoredChunk};
use ragloop_core::{AppError, AppResult};
use rusqlite::{params, Connection};
use std::path::Path;

/// Initialize the SQLite index database.
pub fn init_index(db_path: &Path) -> AppResult<Connection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::Knowledge(format!("Failed to create index directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Knowledge(format!("Failed to open SQLite index: {}", e)))?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            content_type TEXT NOT NULL,
            learned_at TEXT NOT NULL,
            size_bytes INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_id TEXT NOT NULL,
            position INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata TEXT,
            FOREIGN KEY (source_id) REFERENCES sources(id)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source_id);
        "#,
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to create tables: {}", e)))?;

    tracing::debug!("Initialized SQLite index at {:?}", db_path);
    Ok(conn)
}

/// Insert a source into the index.
pub fn insert_source(conn: &Connection, source: &KnowledgeSource) -> AppResult<()> {
    conn.execute(
        "INSERT OR REPLACE INTO sources (id, path, content_type, learned_at, size_bytes)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            source.id,
            source.location,
            source.content_type,
            source.learned_at.to_rfc3339(),
            source.size_bytes as i64,
        ],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to insert source: {}", e)))?;

    Ok(())
}

/// Remove sources previously learned from `location`, with their chunks.
pub fn delete_source_by_location(conn: &Connection, location: &str) -> AppResult<usize> {
    conn.execute(
        "DELETE FROM chunks WHERE source_id IN (SELECT id FROM sources WHERE path = ?1)",
        params![location],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to delete chunks: {}", e)))?;

    let removed = conn
        .execute("DELETE FROM sources WHERE path = ?1", params![location])
        .map_err(|e| AppError::Knowledge(format!("Failed to delete source: {}", e)))?;

    Ok(removed)
}

/// Replace everything learned from `source.location` with `source` and `chunks`.
///
/// Runs in one transaction: if any insert fails the previous rows stay.
/// Returns the number of sources replaced.
pub fn replace_source(
    conn: &mut Connection,
    source: &KnowledgeSource,
    chunks: &[KnowledgeChunk],
) -> AppResult<usize> {
    let tx = conn
        .transaction()
        .map_err(|e| AppError::Knowledge(format!("Failed to begin transaction: {}", e)))?;

    let replaced = delete_source_by_location(&tx, &source.location)?;
    insert_source(&tx, source)?;
    for chunk in chunks {
        insert_chunk(&tx, chunk)?;
    }

    tx.commit()
        .map_err(|e| AppError::Knowledge(format!("Failed to commit source: {}", e)))?;

    Ok(replaced)
}

/// Insert a chunk with embedding into the index.
pub fn insert_chunk(conn: &Connection, chunk: &KnowledgeChunk) -> AppResult<()> {
    let embedding_bytes = embedding_to_bytes(
        chunk
            .embedding
            .as_ref()
            .ok_or_else(|| AppError::Knowledge("Chunk missing embedding".to_string()))?,
    );

    let metadata_json = serde_json::to_string(&chunk.metadata)
        .map_err(|e| AppError::Knowledge(format!("Failed to serialize metadata: {}", e)))?;

    conn.execute(
        "INSERT OR REPLACE INTO chunks (id, source_id, position, text, embedding, metadata)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            chunk.id,
            chunk.source_id,
            chunk.position as i64,
            chunk.text,
            embedding_bytes,
            metadata_json,
        ],
    )
    .map_err(|e| AppError::Knowledge(format!("Failed to insert chunk: {}", e)))?;

    Ok(())
}

/// Query the index for the top-k most similar chunks.
///
/// Results are ordered by descending score; equal scores keep insertion order.
pub fn query_chunks(
    conn: &Connection,
    query_embedding: &[f32],
    top_k: usize,
) -> AppResult<Vec<ScoredChunk>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, source_id, position, text, embedding, metadata FROM chunks ORDER BY rowid",
        )
        .map_err(|e| AppError::Knowledge(format!("Failed to prepare query: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            let embedding_bytes: Vec<u8> = row.get(4)?;
            let metadata_json: Option<String> = row.get(5)?;

            Ok((
                KnowledgeChunk {
                    id: row.get(0)?,
                    source_id: row.get(1)?,
                    position: row.get::<_, i64>(2)? as u32,
                    text: row.get(3)?,
                    embedding: None,
                    metadata: serde_json::Value::Null,
                },
                embedding_bytes,
                metadata_json,
            ))
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to query chunks: {}", e)))?;

    let mut results = Vec::new();
    for row in rows {
        let (mut chunk, embedding_bytes, metadata_json) =
            row.map_err(|e| AppError::Knowledge(format!("Failed to read chunk: {}", e)))?;

        let embedding = bytes_to_embedding(&embedding_bytes)?;
        if let Some(json) = metadata_json {
            chunk.metadata = serde_json::from_str(&json)?;
        }

        let score = cosine_similarity(query_embedding, &embedding);
        chunk.embedding = Some(embedding);
        results.push(ScoredChunk { chunk, score });
    }

    // Stable sort: ties stay in rowid (insertion) order
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);

    tracing::debug!(
        "Retrieved {} chunks (requested top-{})",
        results.len(),
        top_k
    );

    Ok(results)
}

/// Get (sources, chunks) counts for the index.
pub fn get_stats(conn: &Connection) -> AppResult<(u32, u32)> {
    let sources_count: u32 = conn
        .query_row("SELECT COUNT(*) FROM sources", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u32)
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to count sources: {}", e)))?;

    let chunks_count: u32 = conn
        .query_row("SELECT COUNT(*) FROM chunks", [], |row| {
            row.get::<_, i64>(0).map(|v| v as u32)
        })
        .map_err(|e| AppError::Knowledge(format!("Failed to count chunks: {}", e)))?;

    Ok((sources_count, chunks_count))
}

/// Reset the index (delete all data).
pub fn reset_index(conn: &Connection) -> AppResult<()> {
    conn.execute("DELETE FROM chunks", [])
        .map_err(|e| AppError::Knowledge(format!("Failed to delete chunks: {}", e)))?;

    conn.execute("DELETE FROM sources", [])
        .map_err(|e| AppError::Knowledge(format!("Failed to delete sources: {}", e)))?;

    tracing::info!("Reset knowledge base index");
    Ok(())
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
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Cosine similarity between two vectors; 0.0 on length mismatch or zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn source(id: &str, location: &str) -> KnowledgeSource {
        KnowledgeSource {
            id: id.to_string(),
            location: location.to_string(),
            content_type: "text".to_string(),
            learned_at: Utc::now(),
            size_bytes: 100,
        }
    }

    fn chunk(id: &str, source_id: &str, embedding: Vec<f32>) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.to_string(),
            source_id: source_id.to_string(),
            position: 0,
            text: format!("text of {}", id),
            embedding: Some(embedding),
            metadata: serde_json::json!({ "path": "a.md" }),
        }
    }

    #[test]
    fn test_init_index() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("kb/index.sqlite")).unwrap();

        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table'",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert!(table_count >= 2);
    }

    #[test]
    fn test_insert_and_query() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("source1", "a.md")).unwrap();
        insert_chunk(&conn, &chunk("far", "source1", vec![0.0, 1.0, 0.0])).unwrap();
        insert_chunk(&conn, &chunk("near", "source1", vec![1.0, 0.1, 0.0])).unwrap();

        let results = query_chunks(&conn, &[1.0, 0.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.id, "near");
        assert_eq!(results[0].chunk.metadata["path"], "a.md");
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("s", "a.md")).unwrap();
        // Inserted out of id order on purpose
        for id in ["c", "a", "b"] {
            insert_chunk(&conn, &chunk(id, "s", vec![1.0, 0.0])).unwrap();
        }

        let ids: Vec<String> = query_chunks(&conn, &[1.0, 0.0], 10)
            .unwrap()
            .into_iter()
            .map(|r| r.chunk.id)
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn test_top_k_truncation() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("s", "a.md")).unwrap();
        for i in 0..20 {
            insert_chunk(&conn, &chunk(&format!("c{}", i), "s", vec![1.0, i as f32])).unwrap();
        }

        assert_eq!(query_chunks(&conn, &[1.0, 0.0], 15).unwrap().len(), 15);
    }

    #[test]
    fn test_delete_source_and_reset() {
        let temp = TempDir::new().unwrap();
        let conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("s1", "a.md")).unwrap();
        insert_source(&conn, &source("s2", "b.md")).unwrap();
        insert_chunk(&conn, &chunk("c1", "s1", vec![1.0])).unwrap();
        insert_chunk(&conn, &chunk("c2", "s2", vec![1.0])).unwrap();

        assert_eq!(delete_source_by_location(&conn, "a.md").unwrap(), 1);
        assert_eq!(get_stats(&conn).unwrap(), (1, 1));

        reset_index(&conn).unwrap();
        assert_eq!(get_stats(&conn).unwrap(), (0, 0));
    }

    #[test]
    fn test_replace_source_swaps_chunks() {
        let temp = TempDir::new().unwrap();
        let mut conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("old", "a.md")).unwrap();
        insert_chunk(&conn, &chunk("c1", "old", vec![1.0])).unwrap();

        let replaced = replace_source(
            &mut conn,
            &source("new", "a.md"),
            &[chunk("c2", "new", vec![1.0]), chunk("c3", "new", vec![0.5])],
        )
        .unwrap();

        assert_eq!(replaced, 1);
        assert_eq!(get_stats(&conn).unwrap(), (1, 2));
    }

    #[test]
    fn test_failed_replace_keeps_previous_rows() {
        let temp = TempDir::new().unwrap();
        let mut conn = init_index(&temp.path().join("index.sqlite")).unwrap();

        insert_source(&conn, &source("old", "a.md")).unwrap();
        insert_chunk(&conn, &chunk("c1", "old", vec![1.0, 0.0])).unwrap();

        let mut broken = chunk("c3", "new", vec![]);
        broken.embedding = None;
        let result = replace_source(
            &mut conn,
            &source("new", "a.md"),
            &[chunk("c2", "new", vec![1.0, 0.0]), broken],
        );

        assert!(result.is_err());
        assert_eq!(get_stats(&conn).unwrap(), (1, 1));
        let results = query_chunks(&conn, &[1.0, 0.0], 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "c1");
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0]), 0.0);
    }
}
