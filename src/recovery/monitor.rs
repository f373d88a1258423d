use crate::config::RecoveryConfig;
use crate::failure::FailureKind;
use crate::state::Stage;
use crate::storage::{
    lock, parse_timestamp, timestamp, AuditJob, FailureRecord, SharedStorage, StageTask, Storage,
};
use crate::{AuditError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Message stored on jobs the monitor had to fail
const RECOVERY_USER_MESSAGE: &str = "Analysis stopped unexpectedly. Please start a new audit.";

/// What `recover` did to a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// The job is COMPLETE or FAILED and was left alone
    AlreadyTerminal,
    /// The job was updated recently and is still progressing
    NotStale,
    /// A worker claimed the job's stage and its lease has not run out
    Running { stage: Stage, lease_expires_at: String },
    /// The job's current stage was queued again
    Requeued { stage: Stage, task_id: String },
    /// The stage could not be resumed and the job was failed
    Failed,
    /// The job changed between the read and the conditional write
    Raced,
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyTerminal => write!(f, "already terminal"),
            Self::NotStale => write!(f, "not stale"),
            Self::Running {
                stage,
                lease_expires_at,
            } => write!(f, "{} running until {}", stage, lease_expires_at),
            Self::Requeued { stage, .. } => write!(f, "requeued {}", stage),
            Self::Failed => write!(f, "failed"),
            Self::Raced => write!(f, "changed during recovery"),
        }
    }
}

/// Result of recovering one job
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryOutcome {
    pub action: RecoveryAction,
    /// The job as stored after recovery
    pub job: AuditJob,
}

/// Finds and resolves stuck jobs
pub struct RecoveryMonitor {
    storage: SharedStorage,
    config: RecoveryConfig,
}

impl RecoveryMonitor {
    pub fn new(storage: SharedStorage, config: RecoveryConfig) -> Self {
        Self { storage, config }
    }

    /// Jobs updated before this are stale
    fn stale_cutoff(&self, now: DateTime<Utc>) -> String {
        timestamp(now - chrono::Duration::seconds(self.config.stale_after as i64))
    }

    /// When a claim stops protecting its job, or `None` for an unreadable claim time
    fn lease_expiry(&self, claim: &StageTask) -> Option<DateTime<Utc>> {
        let claimed_at = parse_timestamp(claim.claimed_at.as_deref()?)?;
        Some(claimed_at + chrono::Duration::seconds(self.config.claim_lease as i64))
    }

    /// Non-terminal jobs not updated within the staleness threshold
    pub fn list_stuck(&self) -> Result<Vec<AuditJob>> {
        self.list_stuck_at(Utc::now())
    }

    pub fn list_stuck_at(&self, now: DateTime<Utc>) -> Result<Vec<AuditJob>> {
        let cutoff = self.stale_cutoff(now);
        let jobs = lock(&self.storage)?.list_stale_audits(&cutoff)?;
        Ok(jobs)
    }

    /// The most recent jobs, newest first
    pub fn status(&self) -> Result<Vec<AuditJob>> {
        let jobs = lock(&self.storage)?.list_recent_audits(self.config.status_limit)?;
        Ok(jobs)
    }

    /// Resumes or fails one stuck job
    ///
    /// A job whose previous stage output is stored is resumed by queueing its
    /// current stage again. Otherwise it is failed with diagnostic detail.
    /// Terminal and recently updated jobs are returned without any write, as
    /// are jobs whose stage a worker claimed within the claim lease.
    ///
    /// # Arguments
    ///
    /// * `audit_id` - The job to recover
    ///
    /// # Returns
    ///
    /// * `Ok(RecoveryOutcome)` - What was done and the job as stored afterwards
    /// * `Err(AuditError::AuditNotFound)` - No such job
    pub fn recover(&self, audit_id: i64) -> Result<RecoveryOutcome> {
        self.recover_at(audit_id, Utc::now())
    }

    pub fn recover_at(&self, audit_id: i64, now: DateTime<Utc>) -> Result<RecoveryOutcome> {
        let mut storage = lock(&self.storage)?;
        let job = storage
            .get_audit(audit_id)?
            .ok_or(AuditError::AuditNotFound(audit_id))?;

        if job.is_terminal() {
            return Ok(RecoveryOutcome {
                action: RecoveryAction::AlreadyTerminal,
                job,
            });
        }
        if job.updated_at >= self.stale_cutoff(now) {
            return Ok(RecoveryOutcome {
                action: RecoveryAction::NotStale,
                job,
            });
        }

        if let Some(claim) = storage.active_claim(audit_id)? {
            if let Some(expiry) = self.lease_expiry(&claim).filter(|expiry| *expiry > now) {
                tracing::debug!(
                    audit_id,
                    stage = %claim.stage,
                    task_id = %claim.task_id,
                    "stale audit still held by a worker"
                );
                return Ok(RecoveryOutcome {
                    action: RecoveryAction::Running {
                        stage: claim.stage,
                        lease_expires_at: timestamp(expiry),
                    },
                    job,
                });
            }
        }

        let Some(stage) = job.status.stage() else {
            return Ok(RecoveryOutcome {
                action: RecoveryAction::AlreadyTerminal,
                job,
            });
        };

        let missing = match stage.previous() {
            Some(previous) if storage.load_stage_summary(audit_id, previous)?.is_none() => {
                Some(previous)
            }
            _ => None,
        };

        let action = match missing {
            None => match storage.requeue_if_unchanged(audit_id, job.status, &job.updated_at, stage)? {
                Some(task) => {
                    tracing::info!(
                        audit_id,
                        %stage,
                        task_id = %task.task_id,
                        stale_since = %job.updated_at,
                        "stuck audit requeued"
                    );
                    RecoveryAction::Requeued {
                        stage,
                        task_id: task.task_id,
                    }
                }
                None => RecoveryAction::Raced,
            },
            Some(previous) => {
                let detail = format!(
                    "recovery: {} output missing, cannot resume {} (status {}, last updated {})",
                    previous, stage, job.status, job.updated_at
                );
                let failure =
                    FailureRecord::new(FailureKind::Recovery, RECOVERY_USER_MESSAGE, detail.as_str());
                if storage.fail_if_unchanged(audit_id, job.status, &job.updated_at, &failure)? {
                    tracing::warn!(audit_id, %stage, detail = %detail, "stuck audit failed");
                    RecoveryAction::Failed
                } else {
                    RecoveryAction::Raced
                }
            }
        };

        if action == RecoveryAction::Raced {
            tracing::warn!(
                audit_id,
                error = %AuditError::RecoveryRace { audit_id },
                "audit moved on, recovery skipped"
            );
        }

        let job = storage
            .get_audit(audit_id)?
            .ok_or(AuditError::AuditNotFound(audit_id))?;
        Ok(RecoveryOutcome { action, job })
    }

    /// Recovers every stuck job
    pub fn auto_recover(&self) -> Result<Vec<RecoveryOutcome>> {
        self.auto_recover_at(Utc::now())
    }

    pub fn auto_recover_at(&self, now: DateTime<Utc>) -> Result<Vec<RecoveryOutcome>> {
        let stuck = self.list_stuck_at(now)?;
        if !stuck.is_empty() {
            tracing::info!(count = stuck.len(), "recovering stuck audits");
        }
        stuck
            .iter()
            .map(|job| self.recover_at(job.id, now))
            .collect()
    }

    /// Scans for stuck jobs every scan interval until `shutdown` is cancelled
    ///
    /// A failed scan is logged and retried on the next interval.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            stale_after_secs = self.config.stale_after,
            scan_interval_secs = self.config.scan_interval,
            "recovery monitor starting"
        );

        loop {
            match self.auto_recover() {
                Ok(outcomes) => {
                    for outcome in &outcomes {
                        tracing::debug!(audit_id = outcome.job.id, action = %outcome.action, "recovery result");
                    }
                }
                Err(e) => tracing::error!(error = %e, "recovery scan failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.scan_interval()) => {}
            }
        }

        tracing::info!("recovery monitor stopped");
    }
}
