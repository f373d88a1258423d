//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::analysis::PageRecord;
use crate::checker::{LinkCheckResult, LinkScope};
use crate::crawler::PageExport;
use crate::state::{AuditStatus, Stage, StageOutput};
use crate::storage::{AuditJob, FailureRecord, NewAudit, StageSummary, StageTask};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// The store holds audit jobs, stage outputs and the stage queue. Every
/// status change is a conditional update on the status (and, for recovery,
/// the last-updated timestamp) the caller observed, so a write based on a
/// stale read matches no row and reports `false` instead of regressing
/// the job.
pub trait Storage: Send {
    // ===== Audit Jobs =====

    /// Creates a PENDING audit and queues its crawl stage in one transaction
    ///
    /// # Returns
    ///
    /// The new audit id and the queued task
    fn create_audit(&mut self, audit: &NewAudit) -> StorageResult<(i64, StageTask)>;

    /// Gets an audit by id
    fn get_audit(&self, audit_id: i64) -> StorageResult<Option<AuditJob>>;

    /// Most recently created audits, newest first
    fn list_recent_audits(&self, limit: usize) -> StorageResult<Vec<AuditJob>>;

    /// Non-terminal audits last updated strictly before `updated_before`
    fn list_stale_audits(&self, updated_before: &str) -> StorageResult<Vec<AuditJob>>;

    // ===== Status Transitions =====

    /// Moves an audit from `from` to `to` and refreshes its timestamp
    ///
    /// `from == to` only refreshes the timestamp.
    ///
    /// # Returns
    ///
    /// `false` if the audit was not in status `from`
    fn transition(&mut self, audit_id: i64, from: AuditStatus, to: AuditStatus) -> StorageResult<bool>;

    /// Commits a finished stage in one transaction
    ///
    /// Writes the stage output, records the stage as complete, moves the
    /// audit from the stage's status to the next one, queues the next stage
    /// and deletes the finished task. Nothing is written when the audit is
    /// no longer in the stage's status.
    ///
    /// # Arguments
    ///
    /// * `audit_id` - The audit
    /// * `output` - Output of the finished stage
    /// * `finished_task` - The task that ran the stage, if any
    ///
    /// # Returns
    ///
    /// `true` if the stage was committed
    fn commit_stage(
        &mut self,
        audit_id: i64,
        output: &StageOutput,
        finished_task: Option<&str>,
    ) -> StorageResult<bool>;

    /// Marks a non-terminal audit FAILED and drops its queued tasks
    ///
    /// # Returns
    ///
    /// `false` if the audit was already terminal
    fn fail_audit(&mut self, audit_id: i64, failure: &FailureRecord) -> StorageResult<bool>;

    /// Appends a line to the technical detail of any audit, terminal or not
    fn append_technical_detail(&mut self, audit_id: i64, detail: &str) -> StorageResult<()>;

    // ===== Recovery =====

    /// Drops the audit's tasks and queues `stage` again, provided the audit
    /// still has the observed status and timestamp
    fn requeue_if_unchanged(
        &mut self,
        audit_id: i64,
        status: AuditStatus,
        updated_at: &str,
        stage: Stage,
    ) -> StorageResult<Option<StageTask>>;

    /// Fails the audit, provided it still has the observed status and timestamp
    fn fail_if_unchanged(
        &mut self,
        audit_id: i64,
        status: AuditStatus,
        updated_at: &str,
        failure: &FailureRecord,
    ) -> StorageResult<bool>;

    // ===== Stage Outputs =====

    /// Completion record of a stage, if it finished
    fn load_stage_summary(&self, audit_id: i64, stage: Stage) -> StorageResult<Option<StageSummary>>;

    /// Pages exported by the crawl stage
    fn load_crawl_pages(&self, audit_id: i64) -> StorageResult<Vec<PageExport>>;

    /// Page records produced by the analysis stage
    fn load_page_records(&self, audit_id: i64) -> StorageResult<Vec<PageRecord>>;

    /// Link results of one scope in recorded order
    fn load_link_results(&self, audit_id: i64, scope: LinkScope) -> StorageResult<Vec<LinkCheckResult>>;

    // ===== Stage Queue =====

    /// Queues a stage unless an unclaimed task for the same audit and stage
    /// exists, in which case that task is returned
    fn enqueue_stage(
        &mut self,
        audit_id: i64,
        stage: Stage,
        attempt: u32,
        available_at: &str,
    ) -> StorageResult<StageTask>;

    /// Claims the oldest available task whose audit has no claimed task
    fn claim_next_task(&mut self, now: &str) -> StorageResult<Option<StageTask>>;

    /// Replaces a claimed task with its next attempt
    fn retry_task(&mut self, task: &StageTask, available_at: &str) -> StorageResult<StageTask>;

    /// Removes a finished task
    fn complete_task(&mut self, task_id: &str) -> StorageResult<()>;

    /// The claimed task of an audit, if a worker holds one
    fn active_claim(&self, audit_id: i64) -> StorageResult<Option<StageTask>>;

    /// Tasks not yet claimed
    fn count_queued_tasks(&self) -> StorageResult<usize>;
}
