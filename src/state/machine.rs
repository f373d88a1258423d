//! Audit state machine
//!
//! Statuses only move forward through the stage order. Every write is
//! conditional on the status the caller observed, so a duplicate or stale
//! delivery of the same stage finds nothing to update and becomes a no-op.

use crate::failure::{user_message_for, FailureKind};
use crate::state::{AuditStatus, Stage, StageOutput};
use crate::storage::{AuditJob, FailureRecord, NewAudit, StageTask, Storage};
use crate::Result;

/// Creates a PENDING audit and queues its crawl stage
///
/// # Returns
///
/// The new audit id and the queued crawl task
pub fn start(storage: &mut dyn Storage, audit: &NewAudit) -> Result<(i64, StageTask)> {
    let (audit_id, task) = storage.create_audit(audit)?;
    tracing::info!(audit_id, task_id = %task.task_id, url = %audit.url, "audit created");
    Ok((audit_id, task))
}

/// Returns true for COMPLETE and FAILED jobs
pub fn is_terminal(job: &AuditJob) -> bool {
    job.status.is_terminal()
}

/// True when a task for `stage` may run against a job in `status`
///
/// The crawl stage starts from PENDING. A job already in the stage's own
/// status is being retried or resumed.
pub fn can_run(status: AuditStatus, stage: Stage) -> bool {
    status == stage.status() || (stage == Stage::Crawl && status == AuditStatus::Pending)
}

/// Marks the job as running `stage`
///
/// # Returns
///
/// `false` when the job is terminal or not at this stage, in which case the
/// caller must not run the stage
pub fn begin(storage: &mut dyn Storage, job: &AuditJob, stage: Stage) -> Result<bool> {
    if is_terminal(job) || !can_run(job.status, stage) {
        tracing::debug!(
            audit_id = job.id,
            status = %job.status,
            %stage,
            "stage does not match job status, skipping"
        );
        return Ok(false);
    }
    Ok(storage.transition(job.id, job.status, stage.status())?)
}

/// Persists a finished stage and moves the job to its next status
///
/// Advancing a job that is terminal or has already moved past the stage
/// writes nothing.
///
/// # Arguments
///
/// * `storage` - The store
/// * `audit_id` - The audit
/// * `output` - Output of the finished stage
/// * `task_id` - The queue task that ran the stage
///
/// # Returns
///
/// `true` if the job advanced
pub fn advance(
    storage: &mut dyn Storage,
    audit_id: i64,
    output: &StageOutput,
    task_id: Option<&str>,
) -> Result<bool> {
    let stage = output.stage();
    let advanced = storage.commit_stage(audit_id, output, task_id)?;
    if advanced {
        tracing::info!(
            audit_id,
            %stage,
            status = %stage.completed_status(),
            "stage committed"
        );
    } else {
        tracing::warn!(audit_id, %stage, "job no longer at this stage, advance ignored");
    }
    Ok(advanced)
}

/// Fails a job from any non-terminal status
///
/// The user-facing message is derived from `technical_detail`. A terminal
/// job keeps its status and only receives the technical detail.
///
/// # Returns
///
/// `true` if the job moved to FAILED
pub fn fail(
    storage: &mut dyn Storage,
    audit_id: i64,
    kind: FailureKind,
    technical_detail: &str,
) -> Result<bool> {
    let failure = FailureRecord::new(kind, user_message_for(technical_detail), technical_detail);
    if storage.fail_audit(audit_id, &failure)? {
        tracing::warn!(audit_id, kind = %kind, detail = technical_detail, "audit failed");
        return Ok(true);
    }

    storage.append_technical_detail(audit_id, technical_detail)?;
    tracing::debug!(audit_id, "audit already terminal, detail appended");
    Ok(false)
}
