//! Stage execution
//!
//! A [`Pipeline`] runs one claimed stage task at a time against the shared
//! store: it checks the job is still at the task's stage, runs the stage with
//! the configured collaborators, and commits the output together with the
//! next stage's task. [`Worker`] drives the queue and [`CallbackNotifier`]
//! reports terminal jobs.

mod callback;
mod worker;

pub use callback::{CallbackNotifier, CallbackPayload};
pub use worker::{Worker, WorkerStats};

use crate::analysis::{analyze_pages, external_candidates, internal_occurrences};
use crate::checker::{
    ExternalLinkVerifier, ExternalMeta, FalsePositiveFilter, HttpProbe, InternalLinkVerifier,
    LinkProbe, LinkScope, RawOutcome, RetryPolicy, StageBackoff,
};
use crate::config::Config;
use crate::crawler::{build_http_client, CrawlError, HttpCrawler, SiteCrawler};
use crate::failure::FailureKind;
use crate::output::{compile_report, InternalMeta, ReportInput};
use crate::state::{machine, AuditStatus, Stage, StageOutput};
use crate::storage::{lock, now_timestamp, timestamp, AuditJob, SharedStorage, StageTask, Storage};
use crate::url::extract_domain;
use crate::{AuditError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// What happened to a claimed task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The stage ran and the job moved to this status
    Committed(AuditStatus),
    /// The job was terminal, missing or at another stage
    Skipped,
    /// The stage was rate limited and queued again
    Rescheduled { attempt: u32, available_at: String },
    /// The job failed
    Failed(FailureKind),
}

/// Runs stage tasks
pub struct Pipeline {
    storage: SharedStorage,
    config: Arc<Config>,
    crawler: Arc<dyn SiteCrawler>,
    probe: Arc<dyn LinkProbe>,
    filter: FalsePositiveFilter,
    notifier: Option<CallbackNotifier>,
}

impl Pipeline {
    pub fn new(
        storage: SharedStorage,
        config: Arc<Config>,
        crawler: Arc<dyn SiteCrawler>,
        probe: Arc<dyn LinkProbe>,
    ) -> Self {
        let filter = FalsePositiveFilter::from_config(&config.false_positive);
        Self {
            storage,
            config,
            crawler,
            probe,
            filter,
            notifier: None,
        }
    }

    /// Builds a pipeline with the HTTP crawler, probe and callback from the configuration
    pub fn from_config(storage: SharedStorage, config: Arc<Config>) -> Result<Self> {
        let crawler = HttpCrawler::from_config(&config)?;
        let probe = HttpProbe::new(build_http_client(
            &config.user_agent,
            config.external_links.request_timeout(),
        )?);
        let notifier = config
            .callback
            .as_ref()
            .map(|callback| CallbackNotifier::from_config(callback, &config.user_agent))
            .transpose()?;

        let mut pipeline = Self::new(storage, config, Arc::new(crawler), Arc::new(probe));
        pipeline.notifier = notifier;
        Ok(pipeline)
    }

    pub fn with_notifier(mut self, notifier: CallbackNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn storage(&self) -> &SharedStorage {
        &self.storage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one claimed task to completion
    ///
    /// Stage errors are recorded on the job and reported through the
    /// returned outcome. Only storage errors that prevent recording the
    /// outcome are returned as `Err`.
    pub async fn run_task(&self, task: StageTask) -> Result<TaskOutcome> {
        let audit_id = task.audit_id;
        let stage = task.stage;

        let job = {
            let mut storage = lock(&self.storage)?;
            let Some(job) = storage.get_audit(audit_id)? else {
                tracing::warn!(audit_id, task_id = %task.task_id, "task for unknown audit dropped");
                storage.complete_task(&task.task_id)?;
                return Ok(TaskOutcome::Skipped);
            };
            if !machine::begin(&mut *storage, &job, stage)? {
                storage.complete_task(&task.task_id)?;
                return Ok(TaskOutcome::Skipped);
            }
            job
        };

        tracing::info!(audit_id, %stage, attempt = task.attempt, "stage started");

        let output = match self.execute(&job, stage).await {
            Ok(output) => output,
            Err(error) => return self.handle_stage_error(&task, error).await,
        };

        let advanced = {
            let mut storage = lock(&self.storage)?;
            let advanced = machine::advance(&mut *storage, audit_id, &output, Some(&task.task_id))?;
            if !advanced {
                storage.complete_task(&task.task_id)?;
            }
            advanced
        };
        if !advanced {
            return Ok(TaskOutcome::Skipped);
        }

        let status = stage.completed_status();
        if status.is_terminal() {
            self.notify(audit_id).await?;
        }
        Ok(TaskOutcome::Committed(status))
    }

    async fn execute(&self, job: &AuditJob, stage: Stage) -> Result<StageOutput> {
        match stage {
            Stage::Crawl => self.crawl(job).await,
            Stage::Analyze => self.analyze(job),
            Stage::InternalLinks => self.check_internal_links(job).await,
            Stage::ExternalLinks => self.check_external_links(job).await,
            Stage::CompileReport => self.compile(job),
        }
    }

    async fn crawl(&self, job: &AuditJob) -> Result<StageOutput> {
        let start_url = Url::parse(&job.url)?;
        let stage_timeout = self.config.crawler.stage_timeout();

        let pages = tokio::time::timeout(stage_timeout, self.crawler.crawl(&start_url, job.max_pages))
            .await
            .map_err(|_| AuditError::StageTimeout {
                stage: Stage::Crawl,
                seconds: stage_timeout.as_secs(),
            })??;

        tracing::info!(audit_id = job.id, pages = pages.len(), "crawl finished");
        Ok(StageOutput::Crawl(pages))
    }

    fn analyze(&self, job: &AuditJob) -> Result<StageOutput> {
        let pages = lock(&self.storage)?.load_crawl_pages(job.id)?;
        let host = site_host(&job.url)?;
        Ok(StageOutput::Analysis(analyze_pages(&pages, &host)))
    }

    async fn check_internal_links(&self, job: &AuditJob) -> Result<StageOutput> {
        let (records, pages) = {
            let storage = lock(&self.storage)?;
            (storage.load_page_records(job.id)?, storage.load_crawl_pages(job.id)?)
        };

        let known: HashMap<String, RawOutcome> = pages
            .iter()
            .map(|page| (page.url.clone(), RawOutcome::Status(page.status_code)))
            .collect();

        let verifier = InternalLinkVerifier::new(
            Arc::clone(&self.probe),
            self.config.internal_links.clone(),
            RetryPolicy::from_config(&self.config.retry),
        );
        let stage_timeout = self.config.internal_links.stage_timeout();
        let verification = tokio::time::timeout(
            stage_timeout,
            verifier.verify(internal_occurrences(&records), &known),
        )
        .await
        .map_err(|_| AuditError::StageTimeout {
            stage: Stage::InternalLinks,
            seconds: stage_timeout.as_secs(),
        })?;

        if verification.rate_limited {
            return Err(AuditError::RateLimitExceeded {
                stage: Stage::InternalLinks,
                attempts: 1,
            });
        }

        Ok(StageOutput::InternalLinks {
            results: verification.results,
            meta: InternalMeta {
                checked: verification.checked,
                truncated: verification.truncated,
            },
        })
    }

    async fn check_external_links(&self, job: &AuditJob) -> Result<StageOutput> {
        let records = lock(&self.storage)?.load_page_records(job.id)?;

        let verifier = ExternalLinkVerifier::new(
            Arc::clone(&self.probe),
            self.config.external_links.clone(),
            RetryPolicy::from_config(&self.config.retry),
        )
        .with_filter(self.filter.clone());
        let verification = verifier.verify(external_candidates(&records)).await;

        // Every link that got an answer was refused with 429: back off as a stage
        let answered = verification
            .results
            .iter()
            .filter(|r| r.outcome != RawOutcome::Indeterminate)
            .count();
        if verification.meta.rate_limited > 0 && verification.meta.rate_limited == answered {
            return Err(AuditError::RateLimitExceeded {
                stage: Stage::ExternalLinks,
                attempts: 1,
            });
        }

        let warning = verification.warning();
        if let Some(warning) = &warning {
            tracing::warn!(audit_id = job.id, warning = %warning, "external verification incomplete");
        }

        Ok(StageOutput::ExternalLinks {
            results: verification.results,
            meta: verification.meta,
            warning,
        })
    }

    fn compile(&self, job: &AuditJob) -> Result<StageOutput> {
        let storage = lock(&self.storage)?;
        let records = storage.load_page_records(job.id)?;
        let internal_results = storage.load_link_results(job.id, LinkScope::Internal)?;
        let external_results = storage.load_link_results(job.id, LinkScope::External)?;

        let mut warnings = Vec::new();
        let mut internal_meta = InternalMeta::default();
        let mut external_meta = ExternalMeta::default();
        for stage in Stage::ALL {
            let Some(summary) = storage.load_stage_summary(job.id, stage)? else {
                continue;
            };
            match stage {
                Stage::InternalLinks => internal_meta = serde_json::from_value(summary.summary)?,
                Stage::ExternalLinks => external_meta = serde_json::from_value(summary.summary)?,
                _ => {}
            }
            warnings.extend(summary.warning);
        }
        drop(storage);

        let generated_at = now_timestamp();
        let report = compile_report(ReportInput {
            audit_id: job.id,
            url: &job.url,
            generated_at: &generated_at,
            records: &records,
            internal_results: &internal_results,
            internal_meta,
            external_results: &external_results,
            external_meta: &external_meta,
            warnings: &warnings,
        });
        tracing::info!(
            audit_id = job.id,
            problems = report.problems.len(),
            pages = report.summary.pages_analyzed,
            "report compiled"
        );
        Ok(StageOutput::Report(report))
    }

    /// Reschedules a rate-limited or transiently failing stage, or fails the job
    async fn handle_stage_error(&self, task: &StageTask, error: AuditError) -> Result<TaskOutcome> {
        let backoff = StageBackoff::from_config(&self.config.retry);
        let rate_limited = matches!(
            error,
            AuditError::RateLimitExceeded { .. } | AuditError::Crawl(CrawlError::RateLimited(_))
        );
        let retryable = rate_limited || matches!(&error, AuditError::Crawl(e) if e.is_retryable());

        if retryable && backoff.can_retry(task.attempt) {
            let delay = backoff.delay_for(task.attempt);
            let available_at =
                timestamp(Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64));
            let next = lock(&self.storage)?.retry_task(task, &available_at)?;
            tracing::warn!(
                audit_id = task.audit_id,
                stage = %task.stage,
                attempt = next.attempt,
                delay_secs = delay.as_secs(),
                error = %error,
                "stage rescheduled with backoff"
            );
            return Ok(TaskOutcome::Rescheduled {
                attempt: next.attempt,
                available_at: next.available_at,
            });
        }

        let error = if rate_limited {
            AuditError::RateLimitExceeded {
                stage: task.stage,
                attempts: task.attempt + 1,
            }
        } else {
            error
        };
        let kind = FailureKind::for_error(&error);
        let failed = {
            let mut storage = lock(&self.storage)?;
            let failed = machine::fail(&mut *storage, task.audit_id, kind, &error.to_string())?;
            storage.complete_task(&task.task_id)?;
            failed
        };
        if failed {
            self.notify(task.audit_id).await?;
        }
        Ok(TaskOutcome::Failed(kind))
    }

    /// Notifies the callback endpoint about a terminal job
    async fn notify(&self, audit_id: i64) -> Result<()> {
        let Some(notifier) = &self.notifier else {
            return Ok(());
        };
        let job = {
            let storage = lock(&self.storage)?;
            storage.get_audit(audit_id)?
        };
        let Some(job) = job else {
            return Ok(());
        };

        if let Err(e) = notifier.notify(&job).await {
            tracing::warn!(audit_id, error = %e, "callback delivery failed");
            lock(&self.storage)?
                .append_technical_detail(audit_id, &format!("callback delivery failed: {}", e))?;
        }
        Ok(())
    }
}

fn site_host(url: &str) -> Result<String> {
    let parsed = Url::parse(url)?;
    extract_domain(&parsed).ok_or_else(|| AuditError::Validation(format!("{} has no host", url)))
}
