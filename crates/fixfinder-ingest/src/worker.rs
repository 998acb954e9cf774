//! Queue workers.
//!
//! A worker claims tasks one at a time, dispatches them to a handler, and
//! settles the outcome: completed, failed with retry, or cancelled when the
//! task's cancel flag was set after claiming. Timed-out tasks are swept back
//! through the retry path before each claim.

use crate::error::{IngestError, IngestResult};
use fixfinder_config::QueueConfig;
use fixfinder_core::IngestionTask;
use fixfinder_db::Database;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Executes a claimed task. Implemented by the ingestion pipeline glue in
/// the CLI; closures work for tests.
pub trait TaskHandler: Send + Sync {
    fn handle(&self, task: &IngestionTask) -> IngestResult<()>;
}

impl<F> TaskHandler for F
where
    F: Fn(&IngestionTask) -> IngestResult<()> + Send + Sync,
{
    fn handle(&self, task: &IngestionTask) -> IngestResult<()> {
        self(task)
    }
}

pub struct Worker {
    db: Database,
    config: QueueConfig,
    handler: Arc<dyn TaskHandler>,
}

impl Worker {
    pub fn new(db: Database, config: QueueConfig, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            db,
            config,
            handler,
        }
    }

    /// Sweep stale tasks, then claim and run at most one task.
    /// Returns `true` if a task was processed.
    pub fn run_once(&self) -> IngestResult<bool> {
        self.db
            .requeue_stale_tasks(self.config.retry_backoff_secs as i64)?;

        let Some(task) = self.db.claim_next_task()? else {
            return Ok(false);
        };

        if task.cancel_requested {
            debug!("Task {} cancelled before execution", task.id);
            self.db.mark_task_cancelled(&task.id)?;
            return Ok(true);
        }

        debug!("Running {} task {} ({})", task.task_type, task.id, task.target_ref);
        match self.handler.handle(&task) {
            Ok(()) => {
                self.db.complete_task(&task.id)?;
            }
            Err(e) => {
                self.db.fail_task(
                    &task.id,
                    &e.to_string(),
                    self.config.retry_backoff_secs as i64,
                )?;
            }
        }

        Ok(true)
    }

    /// Process tasks until the queue has nothing due. Retried tasks with a
    /// future schedule are left for a later run.
    pub fn run_until_idle(&self) -> IngestResult<usize> {
        let mut processed = 0;
        while self.run_once()? {
            processed += 1;
        }
        Ok(processed)
    }
}

/// A set of polling worker threads over one database.
pub struct WorkerPool {
    db: Database,
    config: QueueConfig,
    handler: Arc<dyn TaskHandler>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(db: Database, config: QueueConfig, handler: Arc<dyn TaskHandler>) -> Self {
        Self {
            db,
            config,
            handler,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked by every worker thread between tasks.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Run `count` worker threads until the stop flag is set. Blocks the
    /// caller until all workers exit.
    pub fn run(&self, count: usize) -> IngestResult<()> {
        info!("Starting {} queue workers", count);

        let poll = Duration::from_secs(self.config.poll_interval_secs);
        let handles: Vec<_> = (0..count)
            .map(|n| {
                let worker = Worker::new(
                    self.db.clone(),
                    self.config.clone(),
                    Arc::clone(&self.handler),
                );
                let stop = Arc::clone(&self.stop);
                std::thread::spawn(move || {
                    while !stop.load(Ordering::Relaxed) {
                        match worker.run_once() {
                            Ok(true) => {}
                            Ok(false) => std::thread::sleep(poll),
                            Err(e) => {
                                error!("Worker {} error: {}", n, e);
                                std::thread::sleep(poll);
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            if handle.join().is_err() {
                return Err(IngestError::TaskFailed("worker thread panicked".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fixfinder_core::{TaskStatus, TaskType};
    use std::sync::atomic::AtomicUsize;

    fn queue_config() -> QueueConfig {
        QueueConfig {
            max_retries: 3,
            retry_backoff_secs: 0,
            task_timeout_secs: 300,
            poll_interval_secs: 0,
        }
    }

    #[test]
    fn test_worker_completes_task() {
        let db = Database::open_in_memory().unwrap();
        let task = IngestionTask::new(TaskType::EmbedChunk, "chunk-1");
        db.enqueue_task(&task).unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_handler = Arc::clone(&seen);
        let handler = Arc::new(move |t: &IngestionTask| -> IngestResult<()> {
            assert_eq!(t.target_ref, "chunk-1");
            seen_in_handler.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let worker = Worker::new(db.clone(), queue_config(), handler);
        assert!(worker.run_once().unwrap());
        assert!(!worker.run_once().unwrap());

        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(db.get_task(&task.id).unwrap().status, TaskStatus::Completed);
    }

    #[test]
    fn test_failing_handler_exhausts_retries() {
        let db = Database::open_in_memory().unwrap();
        let task = IngestionTask::new(TaskType::ExtractErrorCodes, "chunk-1").with_max_retries(3);
        db.enqueue_task(&task).unwrap();

        let handler = Arc::new(|_t: &IngestionTask| -> IngestResult<()> {
            Err(IngestError::TaskFailed("boom".to_string()))
        });
        let worker = Worker::new(db.clone(), queue_config(), handler);

        // Zero backoff, so each retry is immediately due
        let processed = worker.run_until_idle().unwrap();
        assert_eq!(processed, 3);

        let dead = db.get_task(&task.id).unwrap();
        assert_eq!(dead.status, TaskStatus::Failed);
        assert_eq!(dead.retry_count, 3);
    }

    #[test]
    fn test_cancel_observed_after_claim() {
        let db = Database::open_in_memory().unwrap();
        let task = IngestionTask::new(TaskType::IngestDocument, "/docs/a.pdf");
        db.enqueue_task(&task).unwrap();

        // Simulate a cancel racing the claim: flag set while still pending
        {
            let conn = db.conn().unwrap();
            conn.execute("UPDATE tasks SET cancel_requested = 1 WHERE id = ?1", [&task.id])
                .unwrap();
        }

        let handler = Arc::new(|_t: &IngestionTask| -> IngestResult<()> {
            panic!("cancelled task must not run");
        });
        let worker = Worker::new(db.clone(), queue_config(), handler);
        assert!(worker.run_once().unwrap());

        assert_eq!(db.get_task(&task.id).unwrap().status, TaskStatus::Cancelled);
    }

    #[test]
    fn test_mixed_queue_drains() {
        let db = Database::open_in_memory().unwrap();
        for i in 0..5 {
            db.enqueue_task(&IngestionTask::new(
                TaskType::EmbedChunk,
                format!("chunk-{}", i),
            ))
            .unwrap();
        }

        let handler = Arc::new(|t: &IngestionTask| -> IngestResult<()> {
            if t.target_ref == "chunk-3" {
                Err(IngestError::TaskFailed("bad chunk".to_string()))
            } else {
                Ok(())
            }
        });
        let worker = Worker::new(db.clone(), queue_config(), handler);
        worker.run_until_idle().unwrap();

        let counts = db.queue_counts().unwrap();
        assert_eq!(counts.completed, 4);
        assert_eq!(counts.failed, 1);
    }
}
