//! Front-end operations
//!
//! The request-handling front end starts audits and reads them back through
//! [`AuditService`]. Requests are validated here, so a rejected request never
//! creates a job.

use crate::config::Config;
use crate::output::AuditReport;
use crate::state::{machine, AuditStatus};
use crate::storage::{lock, AuditJob, NewAudit, SharedStorage, Storage};
use crate::url::validate_target_url;
use crate::{AuditError, Result};
use serde::Serialize;
use std::sync::Arc;

/// Reply to a started audit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartedAudit {
    pub audit_id: i64,
    pub task_id: String,
    pub status: AuditStatus,
}

/// A job as shown to end users
///
/// Technical failure detail is left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditView {
    pub id: i64,
    pub url: String,
    pub max_pages: u32,
    pub status: AuditStatus,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub correlation_id: Option<String>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub report: Option<AuditReport>,
}

impl From<AuditJob> for AuditView {
    fn from(job: AuditJob) -> Self {
        Self {
            id: job.id,
            url: job.url,
            max_pages: job.max_pages,
            status: job.status,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            correlation_id: job.correlation_id,
            error_kind: job.error_kind.map(|kind| kind.to_string()),
            error_message: job.error_message,
            report: job.report,
        }
    }
}

/// Starts and reads audits
pub struct AuditService {
    storage: SharedStorage,
    config: Arc<Config>,
    config_hash: String,
}

impl AuditService {
    /// Creates the service
    ///
    /// # Arguments
    ///
    /// * `storage` - The shared store
    /// * `config` - Loaded configuration
    /// * `config_hash` - Fingerprint of the configuration, stamped on new audits
    pub fn new(storage: SharedStorage, config: Arc<Config>, config_hash: impl Into<String>) -> Self {
        Self {
            storage,
            config,
            config_hash: config_hash.into(),
        }
    }

    /// Validates a request and queues a new audit
    ///
    /// # Arguments
    ///
    /// * `url` - Target site; `https://` is assumed when no scheme is given
    /// * `max_pages` - Page limit, or the configured default
    /// * `user_id` - Requesting user, if known
    /// * `correlation_id` - Caller's request id, echoed in the callback
    ///
    /// # Returns
    ///
    /// * `Ok(StartedAudit)` - The PENDING audit and its crawl task
    /// * `Err(AuditError::Validation)` - The request was rejected
    pub fn start_audit(
        &self,
        url: &str,
        max_pages: Option<u32>,
        user_id: Option<String>,
        correlation_id: Option<String>,
    ) -> Result<StartedAudit> {
        let target = validate_target_url(url)
            .map_err(|e| AuditError::Validation(format!("invalid URL '{}': {}", url, e)))?;

        let limit = self.config.crawler.max_pages_limit;
        let max_pages = max_pages.unwrap_or(self.config.crawler.default_max_pages);
        if max_pages == 0 || max_pages > limit {
            return Err(AuditError::Validation(format!(
                "max_pages must be between 1 and {}, got {}",
                limit, max_pages
            )));
        }

        let audit = NewAudit {
            url: target.to_string(),
            max_pages,
            user_id,
            correlation_id,
            config_hash: self.config_hash.clone(),
        };
        let (audit_id, task) = {
            let mut storage = lock(&self.storage)?;
            machine::start(&mut *storage, &audit)?
        };

        Ok(StartedAudit {
            audit_id,
            task_id: task.task_id,
            status: AuditStatus::Pending,
        })
    }

    /// Reads an audit for the front end
    pub fn get_audit(&self, audit_id: i64) -> Result<AuditView> {
        let job = lock(&self.storage)?.get_audit(audit_id)?;
        job.map(AuditView::from)
            .ok_or(AuditError::AuditNotFound(audit_id))
    }
}
