//! Append-only audit log.
//!
//! Every mutating operation on a tracked store calls [`Database::record_audit`]
//! on its own connection before returning, so the audit contract lives in
//! application code rather than in database triggers. Rows are never updated
//! or deleted.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use fixfinder_core::{new_id, AuditOperation, AuditRecord};
use rusqlite::{params, Connection};

impl Database {
    /// Write one audit row for a mutation. Called by every mutating store
    /// operation on the same connection as the mutation itself.
    pub(crate) fn record_audit(
        &self,
        conn: &Connection,
        entity_name: &str,
        entity_id: &str,
        operation: AuditOperation,
        old_value: Option<&serde_json::Value>,
        new_value: Option<&serde_json::Value>,
    ) -> DbResult<()> {
        conn.execute(
            r#"
            INSERT INTO audit_log (id, entity_name, entity_id, operation, old_value, new_value, actor, timestamp)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                new_id(),
                entity_name,
                entity_id,
                operation.as_str(),
                old_value.map(|v| v.to_string()),
                new_value.map(|v| v.to_string()),
                self.actor(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Get the full audit trail for one entity, oldest first.
    pub fn get_audit_trail(&self, entity_name: &str, entity_id: &str) -> DbResult<Vec<AuditRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_name, entity_id, operation, old_value, new_value, actor, timestamp
             FROM audit_log WHERE entity_name = ?1 AND entity_id = ?2 ORDER BY timestamp ASC",
        )?;

        let records = stmt.query_map(params![entity_name, entity_id], row_to_audit_record)?;
        records.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Get audit records within a time range, oldest first.
    pub fn audit_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DbResult<Vec<AuditRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, entity_name, entity_id, operation, old_value, new_value, actor, timestamp
             FROM audit_log WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp ASC",
        )?;

        let records = stmt.query_map(
            params![start.to_rfc3339(), end.to_rfc3339()],
            row_to_audit_record,
        )?;
        records.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

fn row_to_audit_record(row: &rusqlite::Row) -> rusqlite::Result<AuditRecord> {
    let operation_str: String = row.get(3)?;
    let old_value_str: Option<String> = row.get(4)?;
    let new_value_str: Option<String> = row.get(5)?;
    let timestamp_str: String = row.get(7)?;

    Ok(AuditRecord {
        id: row.get(0)?,
        entity_name: row.get(1)?,
        entity_id: row.get(2)?,
        operation: AuditOperation::from_str(&operation_str).unwrap_or(AuditOperation::Update),
        old_value: old_value_str.and_then(|s| serde_json::from_str(&s).ok()),
        new_value: new_value_str.and_then(|s| serde_json::from_str(&s).ok()),
        actor: row.get(6)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_audit_trail_records_mutations() {
        let db = Database::open_in_memory().unwrap();

        let record = db.put_content(b"bulletin bytes").unwrap();
        let trail = db.get_audit_trail("content", &record.id).unwrap();

        assert_eq!(trail.len(), 1);
        assert_eq!(trail[0].operation, AuditOperation::Insert);
        assert_eq!(trail[0].actor, "system");
        assert!(trail[0].new_value.is_some());
    }

    #[test]
    fn test_audit_actor_attribution() {
        let db = Database::open_in_memory().unwrap();
        let reviewer_db = db.with_actor("reviewer-7");

        let record = reviewer_db.put_content(b"some bytes").unwrap();
        let trail = db.get_audit_trail("content", &record.id).unwrap();

        assert_eq!(trail[0].actor, "reviewer-7");
    }

    #[test]
    fn test_audit_between() {
        let db = Database::open_in_memory().unwrap();
        db.put_content(b"a").unwrap();
        db.put_content(b"b").unwrap();

        let now = Utc::now();
        let records = db
            .audit_between(now - Duration::hours(1), now + Duration::hours(1))
            .unwrap();
        assert_eq!(records.len(), 2);

        let records = db
            .audit_between(now - Duration::hours(2), now - Duration::hours(1))
            .unwrap();
        assert!(records.is_empty());
    }
}
