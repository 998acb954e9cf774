//! Resource operations: bulletins, manuals, videos, links, spare parts.

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use fixfinder_core::{AuditOperation, ResourceId, ResourceLink, ResourceType};
use rusqlite::{params, params_from_iter};

impl Database {
    /// Create a resource.
    ///
    /// Videos, links, and parts must carry at least one association
    /// (manufacturer, series, or document); an orphan resource would never be
    /// retrievable and is rejected at write time.
    pub fn create_resource(&self, resource: &ResourceLink) -> DbResult<()> {
        if !resource.resource_type.is_document() && !resource.has_association() {
            return Err(DbError::InvalidSourceReference(format!(
                "{} '{}' has no manufacturer, series, or document association",
                resource.resource_type, resource.title
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO resources (id, resource_type, title, manufacturer_id, series_id,
                                   document_id, content_id, url, part_number, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                resource.id,
                resource.resource_type.as_str(),
                resource.title,
                resource.manufacturer_id,
                resource.series_id,
                resource.document_id,
                resource.content_id,
                resource.url,
                resource.part_number,
                resource.created_at.to_rfc3339(),
            ],
        )?;

        self.record_audit(
            &conn,
            "resources",
            &resource.id,
            AuditOperation::Insert,
            None,
            Some(&serde_json::to_value(resource)?),
        )?;

        Ok(())
    }

    /// Get a resource by ID.
    pub fn get_resource(&self, id: &ResourceId) -> DbResult<ResourceLink> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT id, resource_type, title, manufacturer_id, series_id, document_id,
                    content_id, url, part_number, created_at
             FROM resources WHERE id = ?1",
            params![id],
            row_to_resource,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                DbError::NotFound(format!("Resource not found: {}", id))
            }
            _ => DbError::from(e),
        })
    }

    /// List resources, optionally filtered by type.
    pub fn list_resources(&self, resource_type: Option<ResourceType>) -> DbResult<Vec<ResourceLink>> {
        let conn = self.conn()?;

        let resources = match resource_type {
            Some(rt) => {
                let mut stmt = conn.prepare(
                    "SELECT id, resource_type, title, manufacturer_id, series_id, document_id,
                            content_id, url, part_number, created_at
                     FROM resources WHERE resource_type = ?1 ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map(params![rt.as_str()], row_to_resource)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(
                    "SELECT id, resource_type, title, manufacturer_id, series_id, document_id,
                            content_id, url, part_number, created_at
                     FROM resources ORDER BY created_at DESC",
                )?;
                let rows = stmt.query_map([], row_to_resource)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(resources)
    }

    /// Find the document resource backed by a given content record, if any.
    pub fn find_resource_by_content(&self, content_id: &str) -> DbResult<Option<ResourceLink>> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT id, resource_type, title, manufacturer_id, series_id, document_id,
                    content_id, url, part_number, created_at
             FROM resources WHERE content_id = ?1",
            params![content_id],
            row_to_resource,
        );

        match result {
            Ok(resource) => Ok(Some(resource)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Resources sharing a manufacturer, series, or document association with
    /// a hit set. This is the ranker's attached-resource fetch.
    pub fn related_resources(
        &self,
        manufacturer_ids: &[String],
        series_ids: &[String],
        document_ids: &[String],
    ) -> DbResult<Vec<ResourceLink>> {
        if manufacturer_ids.is_empty() && series_ids.is_empty() && document_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = |n: usize| {
            std::iter::repeat("?")
                .take(n)
                .collect::<Vec<_>>()
                .join(", ")
        };

        // Dynamic IN lists; empty lists become a never-true clause
        let mut clauses = Vec::new();
        if !manufacturer_ids.is_empty() {
            clauses.push(format!(
                "manufacturer_id IN ({})",
                placeholders(manufacturer_ids.len())
            ));
        }
        if !series_ids.is_empty() {
            clauses.push(format!("series_id IN ({})", placeholders(series_ids.len())));
        }
        if !document_ids.is_empty() {
            clauses.push(format!(
                "document_id IN ({})",
                placeholders(document_ids.len())
            ));
        }

        let sql = format!(
            "SELECT id, resource_type, title, manufacturer_id, series_id, document_id,
                    content_id, url, part_number, created_at
             FROM resources WHERE {}",
            clauses.join(" OR ")
        );

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;

        let bound: Vec<&String> = manufacturer_ids
            .iter()
            .chain(series_ids.iter())
            .chain(document_ids.iter())
            .collect();

        let resources = stmt.query_map(params_from_iter(bound), row_to_resource)?;
        resources
            .collect::<Result<Vec<_>, _>>()
            .map_err(DbError::from)
    }

    /// Number of stored resources.
    pub fn resource_count(&self) -> DbResult<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))?;
        Ok(count)
    }
}

fn row_to_resource(row: &rusqlite::Row) -> rusqlite::Result<ResourceLink> {
    let type_str: String = row.get(1)?;
    let created_at_str: String = row.get(9)?;

    Ok(ResourceLink {
        id: row.get(0)?,
        resource_type: ResourceType::from_str(&type_str).unwrap_or(ResourceType::Link),
        title: row.get(2)?,
        manufacturer_id: row.get(3)?,
        series_id: row.get(4)?,
        document_id: row.get(5)?,
        content_id: row.get(6)?,
        url: row.get(7)?,
        part_number: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}
