//! Ingestion task queue operations.
//!
//! Claiming uses a compare-and-set update on status so that concurrent
//! workers over the same pool never process the same task twice. Scheduling
//! order is priority ascending, then scheduled_at ascending (FIFO within a
//! priority band).

use crate::database::Database;
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Duration, Utc};
use fixfinder_core::{AuditOperation, IngestionTask, TaskId, TaskStatus, TaskType};
use rusqlite::params;
use serde_json::json;
use tracing::{debug, warn};

/// Per-status task counts for queue introspection.
#[derive(Debug, Clone, Default)]
pub struct QueueCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}

impl QueueCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.processing + self.completed + self.failed + self.cancelled
    }
}

const TASK_COLUMNS: &str = "id, task_type, target_ref, priority, status, retry_count, max_retries,
                            timeout_secs, cancel_requested, scheduled_at, started_at, completed_at,
                            error_message, created_at";

impl Database {
    /// Add a task to the queue.
    pub fn enqueue_task(&self, task: &IngestionTask) -> DbResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO tasks (id, task_type, target_ref, priority, status, retry_count,
                               max_retries, timeout_secs, cancel_requested, scheduled_at,
                               started_at, completed_at, error_message, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                task.id,
                task.task_type.as_str(),
                task.target_ref,
                task.priority,
                task.status.as_str(),
                task.retry_count,
                task.max_retries,
                task.timeout_secs,
                task.cancel_requested,
                task.scheduled_at.to_rfc3339(),
                task.started_at.map(|t| t.to_rfc3339()),
                task.completed_at.map(|t| t.to_rfc3339()),
                task.error_message,
                task.created_at.to_rfc3339(),
            ],
        )?;

        self.record_audit(
            &conn,
            "tasks",
            &task.id,
            AuditOperation::Insert,
            None,
            Some(&serde_json::to_value(task)?),
        )?;

        debug!("Enqueued {} task {}", task.task_type, task.id);
        Ok(())
    }

    /// Get a task by ID.
    pub fn get_task(&self, id: &TaskId) -> DbResult<IngestionTask> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            params![id],
            row_to_task,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                DbError::NotFound(format!("Task not found: {}", id))
            }
            _ => DbError::from(e),
        })
    }

    /// Claim the next due pending task, atomically moving it to processing.
    ///
    /// Candidates are ordered by priority ascending (lower runs first), then
    /// scheduled_at ascending. Each candidate is claimed with a conditional
    /// update; if another worker won the race the next candidate is tried.
    /// Returns `None` when nothing is due.
    pub fn claim_next_task(&self) -> DbResult<Option<IngestionTask>> {
        let now = Utc::now();

        loop {
            let candidate: Option<TaskId> = {
                let conn = self.conn()?;
                let result = conn.query_row(
                    "SELECT id FROM tasks
                     WHERE status = 'pending' AND scheduled_at <= ?1
                     ORDER BY priority ASC, scheduled_at ASC
                     LIMIT 1",
                    params![now.to_rfc3339()],
                    |row| row.get(0),
                );
                match result {
                    Ok(id) => Some(id),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(DbError::from(e)),
                }
            };

            let Some(id) = candidate else {
                return Ok(None);
            };

            let conn = self.conn()?;
            let claimed = conn.execute(
                "UPDATE tasks
                 SET status = 'processing', started_at = ?2
                 WHERE id = ?1 AND status = 'pending'",
                params![id, Utc::now().to_rfc3339()],
            )?;

            if claimed == 0 {
                // Lost the race to another worker; try the next candidate
                debug!("Task {} was claimed concurrently, retrying", id);
                continue;
            }

            self.record_audit(
                &conn,
                "tasks",
                &id,
                AuditOperation::Update,
                Some(&json!({"status": "pending"})),
                Some(&json!({"status": "processing"})),
            )?;
            drop(conn);

            return self.get_task(&id).map(Some);
        }
    }

    /// Mark a processing task as completed.
    pub fn complete_task(&self, id: &TaskId) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE tasks
             SET status = 'completed', completed_at = ?2, error_message = NULL
             WHERE id = ?1 AND status = 'processing'",
            params![id, Utc::now().to_rfc3339()],
        )?;

        if updated == 0 {
            return Err(DbError::InvalidTransition(format!(
                "task {} is not processing",
                id
            )));
        }

        self.record_audit(
            &conn,
            "tasks",
            id,
            AuditOperation::Update,
            Some(&json!({"status": "processing"})),
            Some(&json!({"status": "completed"})),
        )?;

        Ok(())
    }

    /// Record a task failure.
    ///
    /// Below the retry cap the task goes back to pending with exponential
    /// backoff (`backoff_secs * 2^retry_count`); at the cap it is terminally
    /// failed and stays visible as a dead letter.
    pub fn fail_task(&self, id: &TaskId, error: &str, backoff_secs: i64) -> DbResult<()> {
        let task = self.get_task(id)?;
        if task.status != TaskStatus::Processing {
            return Err(DbError::InvalidTransition(format!(
                "task {} is not processing",
                id
            )));
        }

        let retry_count = task.retry_count + 1;
        let conn = self.conn()?;

        if retry_count < task.max_retries {
            let delay = backoff_secs.saturating_mul(1 << task.retry_count.min(16));
            let scheduled_at = Utc::now() + Duration::seconds(delay);

            conn.execute(
                "UPDATE tasks
                 SET status = 'pending', retry_count = ?2, scheduled_at = ?3,
                     started_at = NULL, error_message = ?4
                 WHERE id = ?1",
                params![id, retry_count, scheduled_at.to_rfc3339(), error],
            )?;

            self.record_audit(
                &conn,
                "tasks",
                id,
                AuditOperation::Update,
                Some(&json!({"status": "processing", "retry_count": task.retry_count})),
                Some(&json!({"status": "pending", "retry_count": retry_count, "error": error})),
            )?;

            warn!(
                "Task {} failed (attempt {}/{}), retrying in {}s: {}",
                id, retry_count, task.max_retries, delay, error
            );
        } else {
            conn.execute(
                "UPDATE tasks
                 SET status = 'failed', retry_count = ?2, completed_at = ?3, error_message = ?4
                 WHERE id = ?1",
                params![id, retry_count, Utc::now().to_rfc3339(), error],
            )?;

            self.record_audit(
                &conn,
                "tasks",
                id,
                AuditOperation::Update,
                Some(&json!({"status": "processing", "retry_count": task.retry_count})),
                Some(&json!({"status": "failed", "retry_count": retry_count, "error": error})),
            )?;

            warn!(
                "Task {} failed terminally after {} attempts: {}",
                id, retry_count, error
            );
        }

        Ok(())
    }

    /// Request cancellation of a task.
    ///
    /// A pending task is cancelled immediately. A processing task gets the
    /// cancel flag set; the worker observes it and finishes via
    /// [`Database::mark_task_cancelled`]. Terminal tasks are left alone.
    pub fn cancel_task(&self, id: &TaskId) -> DbResult<bool> {
        let task = self.get_task(id)?;
        if task.status.is_terminal() {
            return Ok(false);
        }

        let conn = self.conn()?;
        let cancelled_now = conn.execute(
            "UPDATE tasks
             SET status = 'cancelled', cancel_requested = 1, completed_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, Utc::now().to_rfc3339()],
        )?;

        if cancelled_now == 0 {
            // In flight; flag it for the worker
            conn.execute(
                "UPDATE tasks SET cancel_requested = 1 WHERE id = ?1",
                params![id],
            )?;
        }

        self.record_audit(
            &conn,
            "tasks",
            id,
            AuditOperation::Update,
            Some(&json!({"status": task.status.as_str()})),
            Some(&json!({"cancel_requested": true})),
        )?;

        Ok(cancelled_now > 0)
    }

    /// Finish a claimed task whose cancel flag was observed by the worker.
    /// Does not count against the retry budget.
    pub fn mark_task_cancelled(&self, id: &TaskId) -> DbResult<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE tasks
             SET status = 'cancelled', completed_at = ?2
             WHERE id = ?1 AND status = 'processing'",
            params![id, Utc::now().to_rfc3339()],
        )?;

        if updated == 0 {
            return Err(DbError::InvalidTransition(format!(
                "task {} is not processing",
                id
            )));
        }

        self.record_audit(
            &conn,
            "tasks",
            id,
            AuditOperation::Update,
            Some(&json!({"status": "processing"})),
            Some(&json!({"status": "cancelled"})),
        )?;

        Ok(())
    }

    /// Route timed-out processing tasks back through the failure path.
    ///
    /// A task is stale when it has been processing longer than its own
    /// timeout_secs. This also recovers tasks orphaned by a crashed worker.
    /// Returns the number of tasks swept.
    pub fn requeue_stale_tasks(&self, backoff_secs: i64) -> DbResult<usize> {
        let now = Utc::now();
        let stale: Vec<IngestionTask> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM tasks WHERE status = 'processing' AND started_at IS NOT NULL",
                TASK_COLUMNS
            ))?;
            let tasks = stmt.query_map([], row_to_task)?;
            tasks
                .collect::<Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|t| {
                    t.started_at
                        .map(|s| now - s > Duration::seconds(t.timeout_secs))
                        .unwrap_or(false)
                })
                .collect()
        };

        let mut swept = 0;
        for task in &stale {
            warn!(
                "Task {} exceeded its {}s timeout, failing",
                task.id, task.timeout_secs
            );
            match self.fail_task(&task.id, "task timed out", backoff_secs) {
                Ok(()) => swept += 1,
                // Another sweeper failed or finished it between the select
                // and the update; skip it and keep sweeping
                Err(DbError::InvalidTransition(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(swept)
    }

    /// List tasks, optionally filtered by status and type, newest first.
    pub fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        task_type: Option<TaskType>,
        limit: usize,
    ) -> DbResult<Vec<IngestionTask>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks
             WHERE (?1 IS NULL OR status = ?1)
               AND (?2 IS NULL OR task_type = ?2)
             ORDER BY created_at DESC
             LIMIT ?3",
            TASK_COLUMNS
        ))?;

        let tasks = stmt.query_map(
            params![
                status.map(|s| s.as_str()),
                task_type.map(|t| t.as_str()),
                limit as i64
            ],
            row_to_task,
        )?;
        tasks.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Terminally failed tasks awaiting operator attention.
    pub fn dead_letter_tasks(&self) -> DbResult<Vec<IngestionTask>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM tasks WHERE status = 'failed' ORDER BY completed_at DESC",
            TASK_COLUMNS
        ))?;
        let tasks = stmt.query_map([], row_to_task)?;
        tasks.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Task counts per status.
    pub fn queue_counts(&self) -> DbResult<QueueCounts> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = QueueCounts::default();
        for row in rows {
            let (status, count) = row?;
            match TaskStatus::from_str(&status) {
                Some(TaskStatus::Pending) => counts.pending = count,
                Some(TaskStatus::Processing) => counts.processing = count,
                Some(TaskStatus::Completed) => counts.completed = count,
                Some(TaskStatus::Failed) => counts.failed = count,
                Some(TaskStatus::Cancelled) => counts.cancelled = count,
                None => {}
            }
        }
        Ok(counts)
    }
}

fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<IngestionTask> {
    let type_str: String = row.get(1)?;
    let status_str: String = row.get(4)?;
    let scheduled_at_str: String = row.get(9)?;
    let started_at_str: Option<String> = row.get(10)?;
    let completed_at_str: Option<String> = row.get(11)?;
    let created_at_str: String = row.get(13)?;

    let parse = |s: &str| {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    };

    Ok(IngestionTask {
        id: row.get(0)?,
        task_type: TaskType::from_str(&type_str).unwrap_or(TaskType::IngestDocument),
        target_ref: row.get(2)?,
        priority: row.get(3)?,
        status: TaskStatus::from_str(&status_str).unwrap_or_default(),
        retry_count: row.get(5)?,
        max_retries: row.get(6)?,
        timeout_secs: row.get(7)?,
        cancel_requested: row.get(8)?,
        scheduled_at: parse(&scheduled_at_str),
        started_at: started_at_str.as_deref().map(parse),
        completed_at: completed_at_str.as_deref().map(parse),
        error_message: row.get(12)?,
        created_at: parse(&created_at_str),
    })
}
