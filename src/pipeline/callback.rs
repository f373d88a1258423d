//! Completion webhook
//!
//! When a job reaches COMPLETE or FAILED the configured endpoint receives a
//! small JSON notification. Delivery failures are logged by the caller and
//! never change the job's status.

use crate::config::{CallbackConfig, UserAgentConfig};
use crate::state::AuditStatus;
use crate::storage::AuditJob;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Body POSTed to the callback endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackPayload {
    pub audit_id: i64,
    pub url: String,
    pub status: AuditStatus,
    pub correlation_id: Option<String>,
    pub completed_at: Option<String>,
}

impl CallbackPayload {
    pub fn for_job(job: &AuditJob) -> Self {
        Self {
            audit_id: job.id,
            url: job.url.clone(),
            status: job.status,
            correlation_id: job.correlation_id.clone(),
            completed_at: job.completed_at.clone(),
        }
    }
}

/// Posts terminal job notifications
#[derive(Debug, Clone)]
pub struct CallbackNotifier {
    client: Client,
    url: String,
}

impl CallbackNotifier {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Builds a notifier with its own client
    pub fn from_config(
        config: &CallbackConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent.header_value())
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self::new(client, config.url.clone()))
    }

    /// Sends the notification for a terminal job
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The endpoint answered with a success status
    /// * `Err(reqwest::Error)` - The request failed or the endpoint answered
    ///   with an error status
    pub async fn notify(&self, job: &AuditJob) -> Result<(), reqwest::Error> {
        let payload = CallbackPayload::for_job(job);
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        tracing::info!(audit_id = job.id, status = %job.status, "callback delivered");
        Ok(())
    }
}
