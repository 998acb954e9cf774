//! Database migrations and schema management.

use crate::error::{DbError, DbResult};
use rusqlite::Connection;
use tracing::info;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema.
pub fn initialize_schema(conn: &Connection) -> DbResult<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(DbError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    if current_version == 0 {
        info!("Creating initial database schema...");
        create_initial_schema(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating database from version {} to {}",
            current_version, SCHEMA_VERSION
        );
        run_migrations(conn, current_version)?;
    }

    Ok(())
}

fn get_schema_version(conn: &Connection) -> DbResult<i32> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> DbResult<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

fn create_initial_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        r#"
        -- Content-addressable store. One row per distinct byte sequence;
        -- the unique hash constraint is the dedup backbone.
        CREATE TABLE IF NOT EXISTS content (
            id TEXT PRIMARY KEY,
            content_hash TEXT NOT NULL UNIQUE,
            size INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_content_hash ON content(content_hash);

        -- Resources: bulletins, manuals, videos, external links, spare parts.
        -- Bulletins and manuals are the documents chunks belong to.
        CREATE TABLE IF NOT EXISTS resources (
            id TEXT PRIMARY KEY,
            resource_type TEXT NOT NULL,
            title TEXT NOT NULL,
            manufacturer_id TEXT,
            series_id TEXT,
            document_id TEXT REFERENCES resources(id),
            content_id TEXT REFERENCES content(id),
            url TEXT,
            part_number TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_resources_type ON resources(resource_type);
        CREATE INDEX IF NOT EXISTS idx_resources_manufacturer ON resources(manufacturer_id);
        CREATE INDEX IF NOT EXISTS idx_resources_series ON resources(series_id);
        CREATE INDEX IF NOT EXISTS idx_resources_document ON resources(document_id);
        CREATE INDEX IF NOT EXISTS idx_resources_content ON resources(content_id);

        -- Chunked document text. Fingerprint uniqueness is scoped per
        -- document so re-indexing identical text is a no-op.
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL REFERENCES resources(id),
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            UNIQUE(document_id, fingerprint)
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_status ON chunks(status);

        -- Full-text search on chunk text
        CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
            text,
            content='chunks',
            content_rowid='rowid'
        );

        -- Triggers to keep FTS in sync
        CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
            INSERT INTO chunks_fts(rowid, text) VALUES (NEW.rowid, NEW.text);
        END;

        CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
            INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES('delete', OLD.rowid, OLD.text);
        END;

        CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE OF text ON chunks BEGIN
            INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES('delete', OLD.rowid, OLD.text);
            INSERT INTO chunks_fts(rowid, text) VALUES (NEW.rowid, NEW.text);
        END;

        -- Vector embeddings, exactly one per (chunk, model)
        CREATE TABLE IF NOT EXISTS embeddings (
            chunk_id TEXT NOT NULL REFERENCES chunks(id) ON DELETE CASCADE,
            model TEXT NOT NULL,
            model_version TEXT NOT NULL,
            vector BLOB NOT NULL,
            dimensions INTEGER NOT NULL,
            PRIMARY KEY (chunk_id, model)
        );

        -- Error-code catalog. Superseded records are marked, never deleted.
        CREATE TABLE IF NOT EXISTS error_codes (
            id TEXT PRIMARY KEY,
            error_code TEXT NOT NULL,
            normalized_code TEXT NOT NULL,
            description TEXT NOT NULL,
            solution TEXT,
            severity TEXT NOT NULL DEFAULT 'medium',
            confidence REAL NOT NULL,
            chunk_id TEXT REFERENCES chunks(id),
            document_id TEXT REFERENCES resources(id),
            manufacturer_id TEXT,
            verified INTEGER NOT NULL DEFAULT 0,
            verified_by TEXT,
            ai_extracted INTEGER NOT NULL DEFAULT 0,
            superseded_by TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_error_codes_code ON error_codes(normalized_code);
        CREATE INDEX IF NOT EXISTS idx_error_codes_manufacturer ON error_codes(manufacturer_id);
        CREATE INDEX IF NOT EXISTS idx_error_codes_document ON error_codes(document_id);

        -- Folded duplicate candidates, kept for diagnostics
        CREATE TABLE IF NOT EXISTS error_code_duplicates (
            id TEXT PRIMARY KEY,
            error_code TEXT NOT NULL,
            manufacturer_id TEXT,
            document_id TEXT,
            kept_id TEXT NOT NULL,
            discarded_confidence REAL NOT NULL,
            seen_at TEXT NOT NULL
        );

        -- Ingestion task queue
        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            task_type TEXT NOT NULL,
            target_ref TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            timeout_secs INTEGER NOT NULL DEFAULT 300,
            cancel_requested INTEGER NOT NULL DEFAULT 0,
            scheduled_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
        CREATE INDEX IF NOT EXISTS idx_tasks_claim ON tasks(status, priority, scheduled_at);

        -- Append-only audit log
        CREATE TABLE IF NOT EXISTS audit_log (
            id TEXT PRIMARY KEY,
            entity_name TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            operation TEXT NOT NULL,
            old_value TEXT,
            new_value TEXT,
            actor TEXT NOT NULL,
            timestamp TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_log(entity_name, entity_id);
        CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON audit_log(timestamp);

        -- Enable foreign keys
        PRAGMA foreign_keys = ON;
        "#,
    )?;

    Ok(())
}

fn run_migrations(conn: &Connection, from_version: i32) -> DbResult<()> {
    // Future migrations go here
    let _ = (conn, from_version);

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_schema_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();

        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();

        let result = initialize_schema(&conn);
        assert!(matches!(result, Err(DbError::Migration(_))));
    }
}
