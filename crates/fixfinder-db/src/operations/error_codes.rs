//! Error-code catalog operations.
//!
//! Candidates arrive from extraction (pattern match or AI) and are folded by
//! (code, manufacturer, source document), keeping the highest-confidence
//! entry. Folded-away candidates are logged to a diagnostics table rather
//! than silently dropped, and records are superseded rather than deleted.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use fixfinder_core::{
    new_id, normalize_error_code, AuditOperation, ErrorCodeId, ErrorCodeRecord, ErrorCodeSource,
    Severity,
};
use rusqlite::params;
use tracing::debug;

/// A candidate that was folded into a higher-confidence record.
#[derive(Debug, Clone)]
pub struct DuplicateErrorCode {
    pub id: String,
    pub error_code: String,
    pub manufacturer_id: Option<String>,
    pub document_id: Option<String>,
    /// The record the duplicate was folded into.
    pub kept_id: ErrorCodeId,
    pub discarded_confidence: f64,
    pub seen_at: DateTime<Utc>,
}

impl Database {
    /// Insert or fold an error-code candidate.
    ///
    /// A candidate matching an existing record on
    /// (error_code, manufacturer_id, source document_id) is folded: the
    /// higher-confidence entry wins and the loser lands in the duplicates
    /// table. Returns the surviving record.
    pub fn upsert_error_code_candidate(&self, candidate: &ErrorCodeRecord) -> DbResult<ErrorCodeRecord> {
        if candidate.source.is_empty() {
            return Err(DbError::InvalidSourceReference(format!(
                "error code '{}' has no chunk, document, or manufacturer source",
                candidate.error_code
            )));
        }

        let normalized = normalize_error_code(&candidate.error_code);

        let existing = {
            let conn = self.conn()?;
            let result = conn.query_row(
                "SELECT id, error_code, description, solution, severity, confidence,
                        chunk_id, document_id, manufacturer_id, verified, verified_by,
                        ai_extracted, superseded_by, created_at
                 FROM error_codes
                 WHERE normalized_code = ?1
                   AND manufacturer_id IS ?2
                   AND document_id IS ?3
                   AND superseded_by IS NULL",
                params![
                    normalized,
                    candidate.source.manufacturer_id,
                    candidate.source.document_id
                ],
                row_to_error_code,
            );
            match result {
                Ok(record) => Some(record),
                Err(rusqlite::Error::QueryReturnedNoRows) => None,
                Err(e) => return Err(DbError::from(e)),
            }
        };

        match existing {
            None => {
                let conn = self.conn()?;
                conn.execute(
                    r#"
                    INSERT INTO error_codes (id, error_code, normalized_code, description, solution,
                                             severity, confidence, chunk_id, document_id,
                                             manufacturer_id, verified, verified_by, ai_extracted,
                                             superseded_by, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
                    "#,
                    params![
                        candidate.id,
                        candidate.error_code,
                        normalized,
                        candidate.description,
                        candidate.solution,
                        candidate.severity.as_str(),
                        candidate.confidence,
                        candidate.source.chunk_id,
                        candidate.source.document_id,
                        candidate.source.manufacturer_id,
                        candidate.verified,
                        candidate.verified_by,
                        candidate.ai_extracted,
                        candidate.superseded_by,
                        candidate.created_at.to_rfc3339(),
                    ],
                )?;

                self.record_audit(
                    &conn,
                    "error_codes",
                    &candidate.id,
                    AuditOperation::Insert,
                    None,
                    Some(&serde_json::to_value(candidate)?),
                )?;

                Ok(candidate.clone())
            }
            Some(kept) if candidate.confidence <= kept.confidence => {
                debug!(
                    "Folding duplicate error code {} (confidence {:.2} <= {:.2})",
                    candidate.error_code, candidate.confidence, kept.confidence
                );
                self.log_duplicate(candidate, &kept.id)?;
                Ok(kept)
            }
            Some(old) => {
                // The new candidate wins; the old values are the duplicate.
                let conn = self.conn()?;
                conn.execute(
                    "UPDATE error_codes
                     SET error_code = ?2, description = ?3, solution = ?4, severity = ?5,
                         confidence = ?6, chunk_id = ?7, ai_extracted = ?8
                     WHERE id = ?1",
                    params![
                        old.id,
                        candidate.error_code,
                        candidate.description,
                        candidate.solution,
                        candidate.severity.as_str(),
                        candidate.confidence,
                        candidate.source.chunk_id,
                        candidate.ai_extracted,
                    ],
                )?;

                let mut updated = candidate.clone();
                updated.id = old.id.clone();
                self.record_audit(
                    &conn,
                    "error_codes",
                    &old.id,
                    AuditOperation::Update,
                    Some(&serde_json::to_value(&old)?),
                    Some(&serde_json::to_value(&updated)?),
                )?;
                drop(conn);

                self.log_duplicate_values(
                    &old.error_code,
                    old.source.manufacturer_id.as_deref(),
                    old.source.document_id.as_deref(),
                    &old.id,
                    old.confidence,
                )?;

                Ok(updated)
            }
        }
    }

    fn log_duplicate(&self, discarded: &ErrorCodeRecord, kept_id: &str) -> DbResult<()> {
        self.log_duplicate_values(
            &discarded.error_code,
            discarded.source.manufacturer_id.as_deref(),
            discarded.source.document_id.as_deref(),
            kept_id,
            discarded.confidence,
        )
    }

    fn log_duplicate_values(
        &self,
        error_code: &str,
        manufacturer_id: Option<&str>,
        document_id: Option<&str>,
        kept_id: &str,
        discarded_confidence: f64,
    ) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO error_code_duplicates (id, error_code, manufacturer_id, document_id,
                                               kept_id, discarded_confidence, seen_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                new_id(),
                error_code,
                manufacturer_id,
                document_id,
                kept_id,
                discarded_confidence,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Find catalog records for an error code, optionally scoped to a
    /// manufacturer. Matching is normalized (case and dash insensitive);
    /// verified records sort first, then by confidence.
    pub fn find_error_codes(
        &self,
        code: &str,
        manufacturer_id: Option<&str>,
    ) -> DbResult<Vec<ErrorCodeRecord>> {
        let normalized = normalize_error_code(code);
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, error_code, description, solution, severity, confidence,
                    chunk_id, document_id, manufacturer_id, verified, verified_by,
                    ai_extracted, superseded_by, created_at
             FROM error_codes
             WHERE normalized_code = ?1
               AND superseded_by IS NULL
               AND (?2 IS NULL OR manufacturer_id = ?2)
             ORDER BY verified DESC, confidence DESC",
        )?;

        let records = stmt.query_map(params![normalized, manufacturer_id], row_to_error_code)?;
        records.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Get an error-code record by ID.
    pub fn get_error_code(&self, id: &ErrorCodeId) -> DbResult<ErrorCodeRecord> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, error_code, description, solution, severity, confidence,
                    chunk_id, document_id, manufacturer_id, verified, verified_by,
                    ai_extracted, superseded_by, created_at
             FROM error_codes WHERE id = ?1",
            params![id],
            row_to_error_code,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                DbError::NotFound(format!("Error code record not found: {}", id))
            }
            _ => DbError::from(e),
        })
    }

    /// Promote a record to verified after human review.
    pub fn mark_error_code_verified(&self, id: &ErrorCodeId, reviewer: &str) -> DbResult<()> {
        let old = self.get_error_code(id)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE error_codes SET verified = 1, verified_by = ?2 WHERE id = ?1",
            params![id, reviewer],
        )?;

        let mut new = old.clone();
        new.verified = true;
        new.verified_by = Some(reviewer.to_string());
        self.record_audit(
            &conn,
            "error_codes",
            id,
            AuditOperation::Update,
            Some(&serde_json::to_value(&old)?),
            Some(&serde_json::to_value(&new)?),
        )?;

        Ok(())
    }

    /// Mark a record as superseded by a newer one. Records are never deleted.
    pub fn supersede_error_code(&self, old_id: &ErrorCodeId, new_id: &ErrorCodeId) -> DbResult<()> {
        let old = self.get_error_code(old_id)?;
        self.get_error_code(new_id)?;

        let conn = self.conn()?;
        conn.execute(
            "UPDATE error_codes SET superseded_by = ?2 WHERE id = ?1",
            params![old_id, new_id],
        )?;

        let mut new = old.clone();
        new.superseded_by = Some(new_id.clone());
        self.record_audit(
            &conn,
            "error_codes",
            old_id,
            AuditOperation::Update,
            Some(&serde_json::to_value(&old)?),
            Some(&serde_json::to_value(&new)?),
        )?;

        Ok(())
    }

    /// Diagnostic: all candidates that were folded into existing records.
    pub fn find_duplicate_error_codes(&self) -> DbResult<Vec<DuplicateErrorCode>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, error_code, manufacturer_id, document_id, kept_id,
                    discarded_confidence, seen_at
             FROM error_code_duplicates ORDER BY seen_at DESC",
        )?;

        let duplicates = stmt.query_map([], |row| {
            let seen_at_str: String = row.get(6)?;
            Ok(DuplicateErrorCode {
                id: row.get(0)?,
                error_code: row.get(1)?,
                manufacturer_id: row.get(2)?,
                document_id: row.get(3)?,
                kept_id: row.get(4)?,
                discarded_confidence: row.get(5)?,
                seen_at: DateTime::parse_from_rfc3339(&seen_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        duplicates
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    /// Number of live (non-superseded) catalog records.
    pub fn error_code_count(&self) -> DbResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM error_codes WHERE superseded_by IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_error_code(row: &rusqlite::Row) -> rusqlite::Result<ErrorCodeRecord> {
    let severity_str: String = row.get(4)?;
    let created_at_str: String = row.get(13)?;

    Ok(ErrorCodeRecord {
        id: row.get(0)?,
        error_code: row.get(1)?,
        description: row.get(2)?,
        solution: row.get(3)?,
        severity: Severity::from_str(&severity_str).unwrap_or_default(),
        confidence: row.get(5)?,
        source: ErrorCodeSource {
            chunk_id: row.get(6)?,
            document_id: row.get(7)?,
            manufacturer_id: row.get(8)?,
        },
        verified: row.get(9)?,
        verified_by: row.get(10)?,
        ai_extracted: row.get(11)?,
        superseded_by: row.get(12)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(code: &str, confidence: f64, doc: &str) -> ErrorCodeRecord {
        ErrorCodeRecord::new(code, format!("Description for {}", code), ErrorCodeSource::from_document(doc))
            .with_confidence(confidence)
    }

    #[test]
    fn test_candidate_requires_source() {
        let db = Database::open_in_memory().unwrap();

        let orphan = ErrorCodeRecord::new("C-2801", "No source", ErrorCodeSource::default());
        let result = db.upsert_error_code_candidate(&orphan);
        assert!(matches!(result, Err(DbError::InvalidSourceReference(_))));
    }

    #[test]
    fn test_duplicates_fold_to_highest_confidence() {
        let db = Database::open_in_memory().unwrap();

        let low = candidate("C-2801", 0.4, "doc-1");
        let kept = db.upsert_error_code_candidate(&low).unwrap();

        // Lower confidence folds into the existing record
        let lower = candidate("C-2801", 0.3, "doc-1");
        let still_kept = db.upsert_error_code_candidate(&lower).unwrap();
        assert_eq!(still_kept.id, kept.id);
        assert_eq!(still_kept.confidence, 0.4);

        // Higher confidence replaces the values, same record id
        let higher = candidate("C-2801", 0.9, "doc-1");
        let winner = db.upsert_error_code_candidate(&higher).unwrap();
        assert_eq!(winner.id, kept.id);
        assert_eq!(winner.confidence, 0.9);

        assert_eq!(db.error_code_count().unwrap(), 1);

        // Both folds were logged, not silently dropped
        let duplicates = db.find_duplicate_error_codes().unwrap();
        assert_eq!(duplicates.len(), 2);
        assert!(duplicates.iter().all(|d| d.kept_id == kept.id));
    }

    #[test]
    fn test_fold_scoped_by_document() {
        let db = Database::open_in_memory().unwrap();

        db.upsert_error_code_candidate(&candidate("C-2801", 0.5, "doc-1"))
            .unwrap();
        db.upsert_error_code_candidate(&candidate("C-2801", 0.5, "doc-2"))
            .unwrap();

        // Different source documents are distinct records
        assert_eq!(db.error_code_count().unwrap(), 2);
    }

    #[test]
    fn test_find_normalized() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_error_code_candidate(&candidate("C-2801", 0.5, "doc-1"))
            .unwrap();

        assert_eq!(db.find_error_codes("c2801", None).unwrap().len(), 1);
        assert_eq!(db.find_error_codes("C-2801", None).unwrap().len(), 1);
        assert_eq!(db.find_error_codes("C-9999", None).unwrap().len(), 0);
    }

    #[test]
    fn test_find_by_manufacturer() {
        let db = Database::open_in_memory().unwrap();

        let acme = ErrorCodeRecord::new("SC542", "Fuser thermistor", ErrorCodeSource::from_document("doc-1").with_manufacturer("acme"))
            .with_confidence(0.8);
        let globex = ErrorCodeRecord::new("SC542", "Different meaning", ErrorCodeSource::from_document("doc-2").with_manufacturer("globex"))
            .with_confidence(0.8);
        db.upsert_error_code_candidate(&acme).unwrap();
        db.upsert_error_code_candidate(&globex).unwrap();

        let hits = db.find_error_codes("SC542", Some("acme")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source.manufacturer_id.as_deref(), Some("acme"));

        let all = db.find_error_codes("SC542", None).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_mark_verified() {
        let db = Database::open_in_memory().unwrap();
        let record = db
            .upsert_error_code_candidate(&candidate("C-2801", 0.5, "doc-1"))
            .unwrap();

        db.mark_error_code_verified(&record.id, "reviewer-7").unwrap();

        let fetched = db.get_error_code(&record.id).unwrap();
        assert!(fetched.verified);
        assert_eq!(fetched.verified_by.as_deref(), Some("reviewer-7"));
    }

    #[test]
    fn test_supersede_keeps_record() {
        let db = Database::open_in_memory().unwrap();

        let old = db
            .upsert_error_code_candidate(&candidate("C-2801", 0.5, "doc-1"))
            .unwrap();
        let new = db
            .upsert_error_code_candidate(&candidate("C-2801", 0.6, "doc-2"))
            .unwrap();

        db.supersede_error_code(&old.id, &new.id).unwrap();

        // Superseded records stay queryable by id but drop out of find()
        let fetched = db.get_error_code(&old.id).unwrap();
        assert_eq!(fetched.superseded_by.as_deref(), Some(new.id.as_str()));

        let live = db.find_error_codes("C-2801", None).unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id, new.id);
    }

    #[test]
    fn test_verified_sorts_first() {
        let db = Database::open_in_memory().unwrap();

        let low = db
            .upsert_error_code_candidate(&candidate("E-100", 0.3, "doc-1"))
            .unwrap();
        db.upsert_error_code_candidate(&candidate("E-100", 0.9, "doc-2"))
            .unwrap();

        db.mark_error_code_verified(&low.id, "reviewer").unwrap();

        let hits = db.find_error_codes("E-100", None).unwrap();
        assert_eq!(hits[0].id, low.id);
    }
}
