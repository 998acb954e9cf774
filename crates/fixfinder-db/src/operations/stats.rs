//! Database statistics rollup.

use crate::database::Database;
use crate::error::DbResult;
use crate::operations::queue::QueueCounts;

/// Row counts across every store, for `fixfinder stats`.
#[derive(Debug, Clone, Default)]
pub struct DatabaseStats {
    pub content_records: i64,
    pub resources: i64,
    pub chunks: i64,
    pub embedded_chunks: i64,
    pub embeddings: i64,
    pub error_codes: i64,
    pub verified_error_codes: i64,
    pub queue: QueueCounts,
    pub audit_entries: i64,
}

impl Database {
    /// Collect row counts from every store.
    pub fn get_stats(&self) -> DbResult<DatabaseStats> {
        let (embedded_chunks, _total_chunks) = self.embedding_stats()?;

        let (embeddings, verified, audit_entries) = {
            let conn = self.conn()?;
            let embeddings: i64 =
                conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
            let verified: i64 = conn.query_row(
                "SELECT COUNT(*) FROM error_codes WHERE verified = 1 AND superseded_by IS NULL",
                [],
                |row| row.get(0),
            )?;
            let audit_entries: i64 =
                conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
            (embeddings, verified, audit_entries)
        };

        Ok(DatabaseStats {
            content_records: self.content_count()?,
            resources: self.resource_count()?,
            chunks: self.chunk_count()?,
            embedded_chunks,
            embeddings,
            error_codes: self.error_code_count()?,
            verified_error_codes: verified,
            queue: self.queue_counts()?,
            audit_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixfinder_core::{ResourceLink, ResourceType};

    #[test]
    fn test_stats_rollup() {
        let db = Database::open_in_memory().unwrap();

        db.put_content(b"service manual bytes").unwrap();
        db.create_resource(&ResourceLink::new(ResourceType::Manual, "X100 manual"))
            .unwrap();

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.content_records, 1);
        assert_eq!(stats.resources, 1);
        assert_eq!(stats.chunks, 0);
        // Both writes were audited
        assert!(stats.audit_entries >= 2);
    }
}
