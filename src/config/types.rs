use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Site-Audit
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "external-links", default)]
    pub external_links: ExternalLinksConfig,
    #[serde(rename = "internal-links", default)]
    pub internal_links: InternalLinksConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub callback: Option<CallbackConfig>,
    #[serde(rename = "false-positive", default)]
    pub false_positive: Vec<FalsePositiveRuleConfig>,
}

impl Config {
    /// The longest time any stage may run before its deadline fires (seconds)
    pub fn longest_stage_deadline(&self) -> u64 {
        self.crawler
            .stage_timeout
            .max(self.internal_links.stage_timeout)
            .max(self.external_links.global_timeout)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the auditing agent
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the auditing agent
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the agent
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for agent-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Site crawl configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Page limit used when a request does not name one
    #[serde(rename = "default-max-pages", default = "default_max_pages")]
    pub default_max_pages: u32,

    /// Largest page limit a request may ask for
    #[serde(rename = "max-pages-limit", default = "default_max_pages_limit")]
    pub max_pages_limit: u32,

    /// Maximum link depth from the start page
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Minimum time between page requests (milliseconds)
    #[serde(rename = "minimum-time-on-page", default = "default_minimum_time_on_page")]
    pub minimum_time_on_page: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Deadline for the whole crawl stage (seconds)
    #[serde(rename = "stage-timeout", default = "default_crawl_stage_timeout")]
    pub stage_timeout: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            default_max_pages: default_max_pages(),
            max_pages_limit: default_max_pages_limit(),
            max_depth: default_max_depth(),
            minimum_time_on_page: default_minimum_time_on_page(),
            request_timeout: default_request_timeout(),
            stage_timeout: default_crawl_stage_timeout(),
        }
    }
}

impl CrawlerConfig {
    pub fn politeness_delay(&self) -> Duration {
        Duration::from_millis(self.minimum_time_on_page)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout)
    }
}

/// External link verification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalLinksConfig {
    /// Ceiling on external URLs verified per audit
    #[serde(rename = "max-links", default = "default_external_max_links")]
    pub max_links: usize,

    /// Maximum URLs per chunk
    #[serde(rename = "chunk-size", default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunks verified at the same time
    #[serde(rename = "max-concurrent-chunks", default = "default_max_concurrent_chunks")]
    pub max_concurrent_chunks: usize,

    /// Per-chunk deadline (seconds)
    #[serde(rename = "chunk-timeout", default = "default_chunk_timeout")]
    pub chunk_timeout: u64,

    /// Deadline for the whole verification (seconds)
    #[serde(rename = "global-timeout", default = "default_global_timeout")]
    pub global_timeout: u64,

    /// Delay between requests in a single-domain chunk (milliseconds)
    #[serde(rename = "single-domain-delay", default = "default_single_domain_delay")]
    pub single_domain_delay: u64,

    /// Delay between requests to one domain in a multi-domain chunk (milliseconds)
    #[serde(rename = "multi-domain-delay", default = "default_multi_domain_delay")]
    pub multi_domain_delay: u64,

    /// Parallel requests per domain in a multi-domain chunk
    #[serde(rename = "per-domain-parallelism", default = "default_per_domain_parallelism")]
    pub per_domain_parallelism: usize,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,
}

impl Default for ExternalLinksConfig {
    fn default() -> Self {
        Self {
            max_links: default_external_max_links(),
            chunk_size: default_chunk_size(),
            max_concurrent_chunks: default_max_concurrent_chunks(),
            chunk_timeout: default_chunk_timeout(),
            global_timeout: default_global_timeout(),
            single_domain_delay: default_single_domain_delay(),
            multi_domain_delay: default_multi_domain_delay(),
            per_domain_parallelism: default_per_domain_parallelism(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl ExternalLinksConfig {
    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_secs(self.global_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// Internal link verification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct InternalLinksConfig {
    /// Ceiling on distinct internal URLs verified per audit
    #[serde(rename = "max-links", default = "default_internal_max_links")]
    pub max_links: usize,

    /// Delay between requests (milliseconds)
    #[serde(rename = "request-delay", default = "default_internal_request_delay")]
    pub request_delay: u64,

    /// Deadline for the whole internal link stage (seconds)
    #[serde(rename = "stage-timeout", default = "default_internal_stage_timeout")]
    pub stage_timeout: u64,
}

impl Default for InternalLinksConfig {
    fn default() -> Self {
        Self {
            max_links: default_internal_max_links(),
            request_delay: default_internal_request_delay(),
            stage_timeout: default_internal_stage_timeout(),
        }
    }
}

impl InternalLinksConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout)
    }
}

/// Request-level and stage-level retry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Extra attempts for a link answering 5xx
    #[serde(rename = "server-error-retries", default = "default_server_error_retries")]
    pub server_error_retries: u32,

    /// Fixed delay between those attempts (milliseconds)
    #[serde(rename = "server-error-delay", default = "default_server_error_delay")]
    pub server_error_delay: u64,

    /// Total attempts for a rate-limited stage
    #[serde(rename = "stage-max-attempts", default = "default_stage_max_attempts")]
    pub stage_max_attempts: u32,

    /// Base of the exponential stage backoff (seconds)
    #[serde(rename = "stage-backoff-base", default = "default_stage_backoff_base")]
    pub stage_backoff_base: u64,

    /// Upper bound on a single stage backoff (seconds)
    #[serde(rename = "stage-backoff-cap", default = "default_stage_backoff_cap")]
    pub stage_backoff_cap: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            server_error_retries: default_server_error_retries(),
            server_error_delay: default_server_error_delay(),
            stage_max_attempts: default_stage_max_attempts(),
            stage_backoff_base: default_stage_backoff_base(),
            stage_backoff_cap: default_stage_backoff_cap(),
        }
    }
}

/// Stage worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Jobs processed at the same time
    #[serde(rename = "max-concurrent-jobs", default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Queue poll interval when idle (milliseconds)
    #[serde(rename = "poll-interval", default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            poll_interval: default_poll_interval(),
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval)
    }
}

/// Stuck-job recovery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// A non-terminal job untouched for this long is stuck (seconds)
    #[serde(rename = "stale-after", default = "default_stale_after")]
    pub stale_after: u64,

    /// Interval between periodic scans (seconds)
    #[serde(rename = "scan-interval", default = "default_scan_interval")]
    pub scan_interval: u64,

    /// Number of jobs listed by the status report
    #[serde(rename = "status-limit", default = "default_status_limit")]
    pub status_limit: usize,

    /// How long a worker's claim on a stage protects the job from recovery
    /// (seconds). Must exceed every stage deadline.
    #[serde(rename = "claim-lease", default = "default_claim_lease")]
    pub claim_lease: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            stale_after: default_stale_after(),
            scan_interval: default_scan_interval(),
            status_limit: default_status_limit(),
            claim_lease: default_claim_lease(),
        }
    }
}

impl RecoveryConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease)
    }
}

/// Completion webhook configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConfig {
    /// Endpoint receiving terminal job notifications
    pub url: String,

    /// Request timeout (seconds)
    #[serde(default = "default_callback_timeout")]
    pub timeout: u64,
}

/// One configured false-positive suppression rule
#[derive(Debug, Clone, Deserialize)]
pub struct FalsePositiveRuleConfig {
    /// Host pattern (`*`, `example.com`, `*.example.com` or `login.*`)
    pub host: String,

    /// Optional path prefix the URL must start with
    #[serde(rename = "path-prefix", default)]
    pub path_prefix: Option<String>,

    /// Category names the rule applies to
    pub categories: Vec<String>,

    /// Reason recorded on suppressed results
    pub reason: String,
}

fn default_max_pages() -> u32 {
    100
}

fn default_max_pages_limit() -> u32 {
    500
}

fn default_max_depth() -> u32 {
    5
}

fn default_minimum_time_on_page() -> u64 {
    250
}

fn default_request_timeout() -> u64 {
    10
}

fn default_crawl_stage_timeout() -> u64 {
    900
}

fn default_external_max_links() -> usize {
    100
}

fn default_chunk_size() -> usize {
    20
}

fn default_max_concurrent_chunks() -> usize {
    3
}

fn default_chunk_timeout() -> u64 {
    300
}

fn default_global_timeout() -> u64 {
    600
}

fn default_single_domain_delay() -> u64 {
    2000
}

fn default_multi_domain_delay() -> u64 {
    1000
}

fn default_per_domain_parallelism() -> usize {
    2
}

fn default_internal_max_links() -> usize {
    500
}

fn default_internal_request_delay() -> u64 {
    250
}

fn default_internal_stage_timeout() -> u64 {
    600
}

fn default_server_error_retries() -> u32 {
    2
}

fn default_server_error_delay() -> u64 {
    500
}

fn default_stage_max_attempts() -> u32 {
    5
}

fn default_stage_backoff_base() -> u64 {
    2
}

fn default_stage_backoff_cap() -> u64 {
    300
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_stale_after() -> u64 {
    900
}

fn default_scan_interval() -> u64 {
    60
}

fn default_status_limit() -> usize {
    50
}

fn default_claim_lease() -> u64 {
    960
}

fn default_callback_timeout() -> u64 {
    10
}
