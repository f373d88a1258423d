//! Queue worker
//!
//! The worker claims stage tasks from the queue and runs up to
//! `max-concurrent-jobs` of them at once. The queue never hands out a task
//! for a job that already has one claimed, so the tasks running together
//! always belong to different jobs.

use crate::config::WorkerConfig;
use crate::pipeline::{Pipeline, TaskOutcome};
use crate::storage::{lock, now_timestamp, Storage};
use crate::Result;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Counters of one worker run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub tasks_run: usize,
    pub committed: usize,
    pub skipped: usize,
    pub rescheduled: usize,
    pub failed: usize,
    /// Tasks that ended with a storage error or panicked
    pub errors: usize,
}

impl WorkerStats {
    fn record(&mut self, joined: std::result::Result<Result<TaskOutcome>, JoinError>) {
        self.tasks_run += 1;
        match joined {
            Ok(Ok(TaskOutcome::Committed(_))) => self.committed += 1,
            Ok(Ok(TaskOutcome::Skipped)) => self.skipped += 1,
            Ok(Ok(TaskOutcome::Rescheduled { .. })) => self.rescheduled += 1,
            Ok(Ok(TaskOutcome::Failed(_))) => self.failed += 1,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "stage task failed to record its outcome");
                self.errors += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "stage task panicked");
                self.errors += 1;
            }
        }
    }
}

/// Polls the stage queue and runs tasks
pub struct Worker {
    pipeline: Arc<Pipeline>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        let config = pipeline.config().worker.clone();
        Self { pipeline, config }
    }

    /// Runs until no task is running and none is queued
    ///
    /// Tasks waiting out a backoff keep the worker polling until they run.
    pub async fn run_until_idle(&self) -> Result<WorkerStats> {
        self.drive(CancellationToken::new(), true).await
    }

    /// Runs until `shutdown` is cancelled, then waits for running tasks
    pub async fn run(&self, shutdown: CancellationToken) -> Result<WorkerStats> {
        self.drive(shutdown, false).await
    }

    async fn drive(&self, shutdown: CancellationToken, until_idle: bool) -> Result<WorkerStats> {
        let max_jobs = self.config.max_concurrent_jobs.max(1);
        let storage = self.pipeline.storage().clone();
        let mut running: JoinSet<Result<TaskOutcome>> = JoinSet::new();
        let mut stats = WorkerStats::default();

        tracing::info!(max_jobs, until_idle, "worker starting");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            while running.len() < max_jobs {
                let task = {
                    let mut storage = lock(&storage)?;
                    storage.claim_next_task(&now_timestamp())?
                };
                let Some(task) = task else {
                    break;
                };
                tracing::debug!(
                    audit_id = task.audit_id,
                    task_id = %task.task_id,
                    stage = %task.stage,
                    "task claimed"
                );
                let pipeline = Arc::clone(&self.pipeline);
                running.spawn(async move { pipeline.run_task(task).await });
            }

            if running.is_empty() {
                if until_idle {
                    let queued = lock(&storage)?.count_queued_tasks()?;
                    if queued == 0 {
                        break;
                    }
                }
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.config.poll_interval()) => {}
                }
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                joined = running.join_next() => {
                    if let Some(joined) = joined {
                        stats.record(joined);
                    }
                }
            }
        }

        if !running.is_empty() {
            tracing::info!(count = running.len(), "waiting for running tasks to finish");
        }
        while let Some(joined) = running.join_next().await {
            stats.record(joined);
        }

        tracing::info!(
            tasks = stats.tasks_run,
            committed = stats.committed,
            rescheduled = stats.rescheduled,
            failed = stats.failed,
            "worker stopped"
        );
        Ok(stats)
    }
}
