//! Vector embedding storage and semantic search.
//!
//! Vectors are stored as little-endian f32 BLOBs, exactly one per
//! (chunk, model). Search is a brute-force cosine scan, which is the right
//! trade-off at catalog scale; `vector_search` is the seam where an ANN
//! library would slot in.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use fixfinder_core::{AuditOperation, Chunk, ChunkId, ChunkStatus, EmbeddingModel};
use rusqlite::params;

/// A chunk matched by semantic search.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub chunk: Chunk,
    /// Cosine similarity against the query vector.
    pub similarity: f32,
}

/// Calculate cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot_product = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot_product += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denominator = norm_a.sqrt() * norm_b.sqrt();
    if denominator == 0.0 {
        return 0.0;
    }

    dot_product / denominator
}

fn decode_vector(bytes: &[u8], dimensions: usize) -> Vec<f32> {
    bytes
        .chunks(4)
        .take(dimensions)
        .map(|b| {
            if b.len() == 4 {
                f32::from_le_bytes([b[0], b[1], b[2], b[3]])
            } else {
                0.0
            }
        })
        .collect()
}

impl Database {
    /// Store or replace the embedding for a chunk under the given model.
    ///
    /// A vector whose length does not match the model's configured dimension
    /// is rejected outright, never truncated. The upsert is keyed by
    /// (chunk, model) so retried ingestion tasks are safe to re-run.
    pub fn upsert_embedding(
        &self,
        chunk_id: &ChunkId,
        model: &EmbeddingModel,
        vector: &[f32],
    ) -> DbResult<()> {
        if vector.len() != model.dimensions {
            return Err(DbError::DimensionMismatch {
                expected: model.dimensions,
                actual: vector.len(),
            });
        }

        // Reject embeddings for unknown chunks up front
        let chunk = self.get_chunk(chunk_id)?;

        let conn = self.conn()?;
        let vector_bytes: Vec<u8> = vector.iter().flat_map(|f| f.to_le_bytes()).collect();

        let existed = match conn.query_row(
            "SELECT 1 FROM embeddings WHERE chunk_id = ?1 AND model = ?2",
            params![chunk_id, model.name],
            |_| Ok(()),
        ) {
            Ok(()) => true,
            Err(rusqlite::Error::QueryReturnedNoRows) => false,
            Err(e) => return Err(DbError::from(e)),
        };

        conn.execute(
            r#"
            INSERT OR REPLACE INTO embeddings (chunk_id, model, model_version, vector, dimensions)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                chunk_id,
                model.name,
                model.version,
                vector_bytes,
                model.dimensions as i64,
            ],
        )?;

        self.record_audit(
            &conn,
            "embeddings",
            chunk_id,
            if existed {
                AuditOperation::Update
            } else {
                AuditOperation::Insert
            },
            None,
            Some(&serde_json::json!({
                "chunk_id": chunk.id,
                "model": model.name,
                "model_version": model.version,
                "dimensions": model.dimensions,
            })),
        )?;

        Ok(())
    }

    /// Get the stored embedding for a chunk under the given model.
    pub fn get_embedding(&self, chunk_id: &ChunkId, model: &EmbeddingModel) -> DbResult<Option<Vec<f32>>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            "SELECT vector, dimensions FROM embeddings WHERE chunk_id = ?1 AND model = ?2",
            params![chunk_id, model.name],
            |row| {
                let bytes: Vec<u8> = row.get(0)?;
                let dimensions: i64 = row.get(1)?;
                Ok((bytes, dimensions))
            },
        );

        match result {
            Ok((bytes, dimensions)) => Ok(Some(decode_vector(&bytes, dimensions as usize))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Find chunks semantically similar to the query vector.
    ///
    /// Only chunks with `status = completed` are eligible. Results below the
    /// similarity threshold are excluded entirely, not down-ranked.
    pub fn vector_search(
        &self,
        query_vector: &[f32],
        model: &EmbeddingModel,
        threshold: f32,
        k: usize,
    ) -> DbResult<Vec<SemanticHit>> {
        if query_vector.len() != model.dimensions {
            return Err(DbError::DimensionMismatch {
                expected: model.dimensions,
                actual: query_vector.len(),
            });
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.text, c.fingerprint, c.status,
                   e.vector, e.dimensions
            FROM embeddings e
            JOIN chunks c ON c.id = e.chunk_id
            WHERE e.model = ?1 AND c.status = 'completed'
            "#,
        )?;

        let rows = stmt.query_map(params![model.name], |row| {
            let status_str: String = row.get(5)?;
            let chunk = Chunk {
                id: row.get(0)?,
                document_id: row.get(1)?,
                chunk_index: row.get(2)?,
                text: row.get(3)?,
                fingerprint: row.get(4)?,
                status: ChunkStatus::from_str(&status_str).unwrap_or(ChunkStatus::Pending),
            };
            let vector_bytes: Vec<u8> = row.get(6)?;
            let dimensions: i64 = row.get(7)?;
            Ok((chunk, vector_bytes, dimensions))
        })?;

        let mut results: Vec<SemanticHit> = Vec::new();

        for row_result in rows {
            let (chunk, vector_bytes, dimensions) = row_result?;
            let vector = decode_vector(&vector_bytes, dimensions as usize);
            let similarity = cosine_similarity(query_vector, &vector);

            if similarity >= threshold {
                results.push(SemanticHit { chunk, similarity });
            }
        }

        results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        results.truncate(k);

        Ok(results)
    }

    /// Chunks that have no embedding yet under the given model.
    pub fn unembedded_chunks(&self, model: &EmbeddingModel, limit: usize) -> DbResult<Vec<Chunk>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.text, c.fingerprint, c.status
            FROM chunks c
            LEFT JOIN embeddings e ON e.chunk_id = c.id AND e.model = ?1
            WHERE e.chunk_id IS NULL
            ORDER BY c.document_id, c.chunk_index
            LIMIT ?2
            "#,
        )?;

        let chunks = stmt
            .query_map(params![model.name, limit as i64], |row| {
                let status_str: String = row.get(5)?;
                Ok(Chunk {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    chunk_index: row.get(2)?,
                    text: row.get(3)?,
                    fingerprint: row.get(4)?,
                    status: ChunkStatus::from_str(&status_str).unwrap_or(ChunkStatus::Pending),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(chunks)
    }

    /// Embedding statistics: (embedded_count, total_chunk_count).
    pub fn embedding_stats(&self) -> DbResult<(i64, i64)> {
        let conn = self.conn()?;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        let embedded: i64 =
            conn.query_row("SELECT COUNT(DISTINCT chunk_id) FROM embeddings", [], |row| {
                row.get(0)
            })?;

        Ok((embedded, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::content::content_hash;
    use fixfinder_core::{ResourceLink, ResourceType};

    fn test_model() -> EmbeddingModel {
        EmbeddingModel::new("test-model", "v1", 4)
    }

    fn setup_chunk(db: &Database, text: &str) -> Chunk {
        let doc = ResourceLink::new(ResourceType::Manual, "Manual");
        db.create_resource(&doc).unwrap();
        let chunk = Chunk::new(doc.id, 0, text, content_hash(text.as_bytes()));
        db.create_chunk(&chunk).unwrap()
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);

        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 0.0001);

        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) - (-1.0)).abs() < 0.0001);

        let a: Vec<f32> = vec![];
        let b: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &b), 0.0);

        let a = vec![1.0, 0.0];
        let b = vec![1.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let db = Database::open_in_memory().unwrap();
        let chunk = setup_chunk(&db, "Some text");

        let result = db.upsert_embedding(&chunk.id, &test_model(), &[0.1, 0.2, 0.3]);
        assert!(matches!(
            result,
            Err(DbError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));

        // Nothing was indexed
        assert_eq!(db.get_embedding(&chunk.id, &test_model()).unwrap(), None);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let chunk = setup_chunk(&db, "Some text");
        let model = test_model();

        db.upsert_embedding(&chunk.id, &model, &[1.0, 0.0, 0.0, 0.0])
            .unwrap();
        db.upsert_embedding(&chunk.id, &model, &[0.0, 1.0, 0.0, 0.0])
            .unwrap();

        let (embedded, _) = db.embedding_stats().unwrap();
        assert_eq!(embedded, 1);

        let stored = db.get_embedding(&chunk.id, &model).unwrap().unwrap();
        assert!((stored[1] - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_replacing_upsert_audited_as_update() {
        let db = Database::open_in_memory().unwrap();
        let chunk = setup_chunk(&db, "Some text");
        let model = test_model();

        db.upsert_embedding(&chunk.id, &model, &[1.0, 0.0, 0.0, 0.0])
            .unwrap();
        db.upsert_embedding(&chunk.id, &model, &[0.0, 1.0, 0.0, 0.0])
            .unwrap();

        let trail = db.get_audit_trail("embeddings", &chunk.id).unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].operation, AuditOperation::Insert);
        assert_eq!(trail[1].operation, AuditOperation::Update);
    }

    #[test]
    fn test_vector_search_only_completed_chunks() {
        let db = Database::open_in_memory().unwrap();
        let model = test_model();

        let pending = setup_chunk(&db, "Pending chunk");
        let completed = setup_chunk(&db, "Completed chunk");
        db.set_chunk_status(&completed.id, ChunkStatus::Completed)
            .unwrap();

        db.upsert_embedding(&pending.id, &model, &[1.0, 0.0, 0.0, 0.0])
            .unwrap();
        db.upsert_embedding(&completed.id, &model, &[1.0, 0.0, 0.0, 0.0])
            .unwrap();

        let hits = db
            .vector_search(&[1.0, 0.0, 0.0, 0.0], &model, 0.0, 10)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, completed.id);
    }

    #[test]
    fn test_vector_search_threshold_excludes() {
        let db = Database::open_in_memory().unwrap();
        let model = test_model();

        let close = setup_chunk(&db, "Close chunk");
        let far = setup_chunk(&db, "Far chunk");
        db.set_chunk_status(&close.id, ChunkStatus::Completed).unwrap();
        db.set_chunk_status(&far.id, ChunkStatus::Completed).unwrap();

        db.upsert_embedding(&close.id, &model, &[1.0, 0.0, 0.0, 0.0])
            .unwrap();
        db.upsert_embedding(&far.id, &model, &[0.0, 1.0, 0.0, 0.0])
            .unwrap();

        let hits = db
            .vector_search(&[0.9, 0.1, 0.0, 0.0], &model, 0.5, 10)
            .unwrap();

        // The orthogonal vector is excluded entirely, not down-ranked
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.id, close.id);
    }

    #[test]
    fn test_unembedded_chunks() {
        let db = Database::open_in_memory().unwrap();
        let model = test_model();

        let embedded = setup_chunk(&db, "Embedded chunk");
        let bare = setup_chunk(&db, "Bare chunk");

        db.upsert_embedding(&embedded.id, &model, &[1.0, 0.0, 0.0, 0.0])
            .unwrap();

        let unembedded = db.unembedded_chunks(&model, 10).unwrap();
        assert_eq!(unembedded.len(), 1);
        assert_eq!(unembedded[0].id, bare.id);
    }
}
