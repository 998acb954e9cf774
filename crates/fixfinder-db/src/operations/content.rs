//! Content-addressable store operations.
//!
//! Every byte sequence is stored at most once, keyed by its SHA-256 hash.
//! Documents, images, and any other raw payloads all go through `put_content`.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use fixfinder_core::{AuditOperation, ContentRecord};
use rusqlite::params;
use sha2::{Digest, Sha256};
use tracing::debug;

/// SHA-256 of raw bytes, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl Database {
    /// Store raw bytes, deduplicated by content hash.
    ///
    /// Returns the existing record unchanged when identical bytes were seen
    /// before; nothing downstream is re-triggered. Under concurrent puts of
    /// identical bytes the unique hash constraint picks one winner and the
    /// loser resolves to the winner's row instead of surfacing an error.
    pub fn put_content(&self, bytes: &[u8]) -> DbResult<ContentRecord> {
        let hash = content_hash(bytes);

        if let Some(existing) = self.get_content_by_hash(&hash)? {
            debug!("Content already stored: {}", hash);
            return Ok(existing);
        }

        let conn = self.conn()?;
        let record = ContentRecord::new(&hash, bytes.len() as i64);

        let inserted = conn.execute(
            r#"
            INSERT INTO content (id, content_hash, size, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(content_hash) DO NOTHING
            "#,
            params![
                record.id,
                record.content_hash,
                record.size,
                record.created_at.to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            // Lost the insert race; the winner's row is authoritative.
            return self
                .get_content_by_hash(&hash)?
                .ok_or_else(|| DbError::Other(format!("Content vanished after conflict: {}", hash)));
        }

        self.record_audit(
            &conn,
            "content",
            &record.id,
            AuditOperation::Insert,
            None,
            Some(&serde_json::to_value(&record)?),
        )?;

        Ok(record)
    }

    /// Look up a content record by its hash.
    pub fn get_content_by_hash(&self, hash: &str) -> DbResult<Option<ContentRecord>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, content_hash, size, created_at FROM content WHERE content_hash = ?1",
            params![hash],
            row_to_content_record,
        );

        match result {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Get a content record by ID.
    pub fn get_content(&self, id: &str) -> DbResult<ContentRecord> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, content_hash, size, created_at FROM content WHERE id = ?1",
            params![id],
            row_to_content_record,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                DbError::NotFound(format!("Content not found: {}", id))
            }
            _ => DbError::from(e),
        })
    }

    /// Number of stored content records.
    pub fn content_count(&self) -> DbResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM content", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_content_record(row: &rusqlite::Row) -> rusqlite::Result<ContentRecord> {
    let created_at_str: String = row.get(3)?;

    Ok(ContentRecord {
        id: row.get(0)?,
        content_hash: row.get(1)?,
        size: row.get(2)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_content_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        let first = db.put_content(b"service manual PDF bytes").unwrap();
        let second = db.put_content(b"service manual PDF bytes").unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.content_hash, second.content_hash);
        assert_eq!(db.content_count().unwrap(), 1);
    }

    #[test]
    fn test_distinct_bytes_get_distinct_records() {
        let db = Database::open_in_memory().unwrap();

        let a = db.put_content(b"manual A").unwrap();
        let b = db.put_content(b"manual B").unwrap();

        assert_ne!(a.id, b.id);
        assert_ne!(a.content_hash, b.content_hash);
        assert_eq!(db.content_count().unwrap(), 2);
    }

    #[test]
    fn test_lookup_by_hash() {
        let db = Database::open_in_memory().unwrap();

        let stored = db.put_content(b"bulletin bytes").unwrap();
        let found = db.get_content_by_hash(&stored.content_hash).unwrap();
        assert!(found.is_some());
        assert_eq!(found.unwrap().id, stored.id);

        let missing = db.get_content_by_hash("deadbeef").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_size_recorded() {
        let db = Database::open_in_memory().unwrap();
        let record = db.put_content(b"12345").unwrap();
        assert_eq!(record.size, 5);
    }

    #[test]
    fn test_concurrent_put_single_winner() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("dedup.db")).unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let db = db.clone();
            handles.push(std::thread::spawn(move || {
                db.put_content(b"identical bytes").unwrap().id
            }));
        }

        let ids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(db.content_count().unwrap(), 1);
    }
}
