//! Chunk operations and the FTS5 lexical index.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use fixfinder_core::{AuditOperation, Chunk, ChunkId, ChunkStatus, ResourceId, ResourceType};
use rusqlite::params;
use tracing::debug;

/// Quote each query term so tokens like `C-2801` survive the FTS5 parser,
/// which would otherwise treat the dash as syntax.
pub(crate) fn fts_quote(query: &str) -> String {
    query
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

impl Database {
    /// Create a chunk, idempotent per (document, fingerprint).
    ///
    /// Re-submitting text with a fingerprint the document already has returns
    /// the existing chunk and leaves the FTS index untouched.
    pub fn create_chunk(&self, chunk: &Chunk) -> DbResult<Chunk> {
        let conn = self.conn()?;

        let inserted = conn.execute(
            r#"
            INSERT INTO chunks (id, document_id, chunk_index, text, fingerprint, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(document_id, fingerprint) DO NOTHING
            "#,
            params![
                chunk.id,
                chunk.document_id,
                chunk.chunk_index,
                chunk.text,
                chunk.fingerprint,
                chunk.status.as_str(),
            ],
        )?;

        if inserted == 0 {
            debug!(
                "Chunk with fingerprint {} already indexed for document {}",
                chunk.fingerprint, chunk.document_id
            );
            drop(conn);
            return self.get_chunk_by_fingerprint(&chunk.document_id, &chunk.fingerprint)?
                .ok_or_else(|| {
                    DbError::Other(format!(
                        "Chunk vanished after fingerprint conflict: {}",
                        chunk.fingerprint
                    ))
                });
        }

        self.record_audit(
            &conn,
            "chunks",
            &chunk.id,
            AuditOperation::Insert,
            None,
            Some(&serde_json::to_value(chunk)?),
        )?;

        Ok(chunk.clone())
    }

    /// Get a chunk by ID.
    pub fn get_chunk(&self, id: &ChunkId) -> DbResult<Chunk> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, document_id, chunk_index, text, fingerprint, status FROM chunks WHERE id = ?1",
            params![id],
            row_to_chunk,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                DbError::NotFound(format!("Chunk not found: {}", id))
            }
            _ => DbError::from(e),
        })
    }

    /// Look up a chunk by its per-document fingerprint.
    pub fn get_chunk_by_fingerprint(
        &self,
        document_id: &ResourceId,
        fingerprint: &str,
    ) -> DbResult<Option<Chunk>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, document_id, chunk_index, text, fingerprint, status
             FROM chunks WHERE document_id = ?1 AND fingerprint = ?2",
            params![document_id, fingerprint],
            row_to_chunk,
        );

        match result {
            Ok(chunk) => Ok(Some(chunk)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Get all chunks for a document, ordered by index.
    pub fn get_chunks_by_document(&self, document_id: &ResourceId) -> DbResult<Vec<Chunk>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, document_id, chunk_index, text, fingerprint, status
             FROM chunks WHERE document_id = ?1 ORDER BY chunk_index",
        )?;

        let chunks = stmt.query_map(params![document_id], row_to_chunk)?;
        chunks.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Flip a chunk's processing status.
    pub fn set_chunk_status(&self, id: &ChunkId, status: ChunkStatus) -> DbResult<()> {
        let old = self.get_chunk(id)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE chunks SET status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;

        let mut new = old.clone();
        new.status = status;
        self.record_audit(
            &conn,
            "chunks",
            id,
            AuditOperation::Update,
            Some(&serde_json::to_value(&old)?),
            Some(&serde_json::to_value(&new)?),
        )?;

        Ok(())
    }

    /// Lexical full-text search over chunk text.
    ///
    /// Ranked by bm25, normalized into (0, 1); filterable by the owning
    /// document's manufacturer and resource type.
    pub fn search_chunks(
        &self,
        query: &str,
        manufacturer_id: Option<&str>,
        doc_type: Option<ResourceType>,
        limit: usize,
    ) -> DbResult<Vec<(Chunk, f32)>> {
        let fts_query = fts_quote(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.document_id, c.chunk_index, c.text, c.fingerprint, c.status,
                   bm25(chunks_fts)
            FROM chunks_fts
            JOIN chunks c ON c.rowid = chunks_fts.rowid
            JOIN resources r ON r.id = c.document_id
            WHERE chunks_fts MATCH ?1
              AND (?2 IS NULL OR r.manufacturer_id = ?2)
              AND (?3 IS NULL OR r.resource_type = ?3)
            ORDER BY bm25(chunks_fts)
            LIMIT ?4
            "#,
        )?;

        let results = stmt.query_map(
            params![
                fts_query,
                manufacturer_id,
                doc_type.map(|t| t.as_str()),
                limit as i64
            ],
            |row| {
                let chunk = row_to_chunk(row)?;
                let bm25: f64 = row.get(6)?;
                // bm25 is negative, more negative = better match
                let score = 1.0 / (1.0 + (bm25 as f32).exp());
                Ok((chunk, score))
            },
        )?;

        results.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Number of stored chunks.
    pub fn chunk_count(&self) -> DbResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_chunk(row: &rusqlite::Row) -> rusqlite::Result<Chunk> {
    let status_str: String = row.get(5)?;

    Ok(Chunk {
        id: row.get(0)?,
        document_id: row.get(1)?,
        chunk_index: row.get(2)?,
        text: row.get(3)?,
        fingerprint: row.get(4)?,
        status: ChunkStatus::from_str(&status_str).unwrap_or(ChunkStatus::Pending),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::content::content_hash;
    use fixfinder_core::ResourceLink;

    fn make_document(db: &Database, title: &str, manufacturer: Option<&str>) -> ResourceLink {
        let mut doc = ResourceLink::new(ResourceType::Manual, title);
        if let Some(m) = manufacturer {
            doc = doc.with_manufacturer(m);
        }
        db.create_resource(&doc).unwrap();
        doc
    }

    fn make_chunk(document_id: &str, index: i32, text: &str) -> Chunk {
        Chunk::new(
            document_id.to_string(),
            index,
            text,
            content_hash(text.as_bytes()),
        )
    }

    #[test]
    fn test_chunk_fingerprint_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let doc = make_document(&db, "Printer manual", None);

        let chunk = make_chunk(&doc.id, 0, "Clearing a paper jam in tray two");
        let first = db.create_chunk(&chunk).unwrap();

        // Same text, fresh chunk id: must resolve to the existing row
        let resubmit = make_chunk(&doc.id, 0, "Clearing a paper jam in tray two");
        let second = db.create_chunk(&resubmit).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(db.chunk_count().unwrap(), 1);
    }

    #[test]
    fn test_same_fingerprint_different_documents() {
        let db = Database::open_in_memory().unwrap();
        let doc_a = make_document(&db, "Manual A", None);
        let doc_b = make_document(&db, "Manual B", None);

        let a = db
            .create_chunk(&make_chunk(&doc_a.id, 0, "Shared boilerplate text"))
            .unwrap();
        let b = db
            .create_chunk(&make_chunk(&doc_b.id, 0, "Shared boilerplate text"))
            .unwrap();

        // Fingerprint uniqueness is scoped per document
        assert_ne!(a.id, b.id);
        assert_eq!(db.chunk_count().unwrap(), 2);
    }

    #[test]
    fn test_lexical_search() {
        let db = Database::open_in_memory().unwrap();
        let doc = make_document(&db, "Printer manual", None);

        db.create_chunk(&make_chunk(&doc.id, 0, "Paper jam in the fuser assembly"))
            .unwrap();
        db.create_chunk(&make_chunk(&doc.id, 1, "Replacing the toner cartridge"))
            .unwrap();

        let results = db.search_chunks("paper jam", None, None, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].0.text.contains("fuser"));
        assert!(results[0].1 > 0.0 && results[0].1 < 1.0);
    }

    #[test]
    fn test_lexical_search_survives_error_codes() {
        let db = Database::open_in_memory().unwrap();
        let doc = make_document(&db, "Printer manual", None);

        db.create_chunk(&make_chunk(&doc.id, 0, "Error C-2801 indicates a fuser fault"))
            .unwrap();

        // The dash must not be parsed as FTS syntax
        let results = db.search_chunks("C-2801", None, None, 10).unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_lexical_search_manufacturer_filter() {
        let db = Database::open_in_memory().unwrap();
        let doc_a = make_document(&db, "Acme manual", Some("acme"));
        let doc_b = make_document(&db, "Globex manual", Some("globex"));

        db.create_chunk(&make_chunk(&doc_a.id, 0, "Fuser maintenance procedure"))
            .unwrap();
        db.create_chunk(&make_chunk(&doc_b.id, 0, "Fuser maintenance procedure steps"))
            .unwrap();

        let results = db.search_chunks("fuser", Some("acme"), None, 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.document_id, doc_a.id);
    }

    #[test]
    fn test_set_chunk_status() {
        let db = Database::open_in_memory().unwrap();
        let doc = make_document(&db, "Manual", None);

        let chunk = db
            .create_chunk(&make_chunk(&doc.id, 0, "Some text"))
            .unwrap();
        db.set_chunk_status(&chunk.id, ChunkStatus::Completed).unwrap();

        let fetched = db.get_chunk(&chunk.id).unwrap();
        assert_eq!(fetched.status, ChunkStatus::Completed);

        // Status flips are audited
        let trail = db.get_audit_trail("chunks", &chunk.id).unwrap();
        assert_eq!(trail.len(), 2);
    }

    #[test]
    fn test_fts_quote() {
        assert_eq!(fts_quote("paper jam"), "\"paper\" OR \"jam\"");
        assert_eq!(fts_quote("C-2801"), "\"C-2801\"");
        assert_eq!(fts_quote(""), "");
    }
}
