use crate::checker::LinkCategory;
use crate::config::types::{
    CallbackConfig, Config, CrawlerConfig, ExternalLinksConfig, FalsePositiveRuleConfig,
    InternalLinksConfig, RecoveryConfig, RetryConfig, StorageConfig, UserAgentConfig,
    WorkerConfig,
};
use crate::ConfigError;
use url::Url;

/// Smallest delay allowed between requests in a single-domain chunk (ms)
pub const MIN_SINGLE_DOMAIN_DELAY_MS: u64 = 2000;

/// Smallest delay allowed between same-domain requests in a multi-domain chunk (ms)
pub const MIN_MULTI_DOMAIN_DELAY_MS: u64 = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_crawler_config(&config.crawler)?;
    validate_external_links_config(&config.external_links)?;
    validate_internal_links_config(&config.internal_links)?;
    validate_retry_config(&config.retry)?;
    validate_worker_config(&config.worker)?;
    validate_recovery_config(&config.recovery)?;
    validate_claim_lease(config)?;
    if let Some(callback) = &config.callback {
        validate_callback_config(callback)?;
    }
    for rule in &config.false_positive {
        validate_false_positive_rule(rule)?;
    }
    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// Validates crawl configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages_limit < 1 {
        return Err(ConfigError::Validation(format!(
            "max_pages_limit must be >= 1, got {}",
            config.max_pages_limit
        )));
    }

    if config.default_max_pages < 1 || config.default_max_pages > config.max_pages_limit {
        return Err(ConfigError::Validation(format!(
            "default_max_pages must be between 1 and {}, got {}",
            config.max_pages_limit, config.default_max_pages
        )));
    }

    if config.minimum_time_on_page < 100 {
        return Err(ConfigError::Validation(format!(
            "minimum_time_on_page must be >= 100ms, got {}ms",
            config.minimum_time_on_page
        )));
    }

    if config.request_timeout == 0 || config.stage_timeout == 0 {
        return Err(ConfigError::Validation(
            "crawler timeouts must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates external link verification configuration
fn validate_external_links_config(config: &ExternalLinksConfig) -> Result<(), ConfigError> {
    if config.chunk_size < 1 {
        return Err(ConfigError::Validation(format!(
            "chunk_size must be >= 1, got {}",
            config.chunk_size
        )));
    }

    if config.max_concurrent_chunks < 1 || config.max_concurrent_chunks > 32 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_chunks must be between 1 and 32, got {}",
            config.max_concurrent_chunks
        )));
    }

    if config.per_domain_parallelism < 1 {
        return Err(ConfigError::Validation(format!(
            "per_domain_parallelism must be >= 1, got {}",
            config.per_domain_parallelism
        )));
    }

    if config.chunk_timeout == 0 {
        return Err(ConfigError::Validation(
            "chunk_timeout must be > 0".to_string(),
        ));
    }

    if config.global_timeout < config.chunk_timeout {
        return Err(ConfigError::Validation(format!(
            "global_timeout ({}s) must be >= chunk_timeout ({}s)",
            config.global_timeout, config.chunk_timeout
        )));
    }

    if config.single_domain_delay < MIN_SINGLE_DOMAIN_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "single_domain_delay must be >= {}ms, got {}ms",
            MIN_SINGLE_DOMAIN_DELAY_MS, config.single_domain_delay
        )));
    }

    if config.multi_domain_delay < MIN_MULTI_DOMAIN_DELAY_MS {
        return Err(ConfigError::Validation(format!(
            "multi_domain_delay must be >= {}ms, got {}ms",
            MIN_MULTI_DOMAIN_DELAY_MS, config.multi_domain_delay
        )));
    }

    Ok(())
}

fn validate_internal_links_config(config: &InternalLinksConfig) -> Result<(), ConfigError> {
    if config.stage_timeout == 0 {
        return Err(ConfigError::Validation(
            "internal links stage_timeout must be > 0".to_string(),
        ));
    }
    Ok(())
}

/// A claim must outlive the stage holding it, or recovery could hand a
/// running stage to a second worker
fn validate_claim_lease(config: &Config) -> Result<(), ConfigError> {
    let deadline = config.longest_stage_deadline();
    if config.recovery.claim_lease <= deadline {
        return Err(ConfigError::Validation(format!(
            "recovery claim_lease ({}s) must be greater than the longest stage deadline ({}s)",
            config.recovery.claim_lease, deadline
        )));
    }
    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.stage_max_attempts < 1 {
        return Err(ConfigError::Validation(
            "stage_max_attempts must be >= 1".to_string(),
        ));
    }

    if config.stage_backoff_cap < config.stage_backoff_base {
        return Err(ConfigError::Validation(format!(
            "stage_backoff_cap ({}s) must be >= stage_backoff_base ({}s)",
            config.stage_backoff_cap, config.stage_backoff_base
        )));
    }

    Ok(())
}

fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_jobs < 1 || config.max_concurrent_jobs > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_jobs must be between 1 and 64, got {}",
            config.max_concurrent_jobs
        )));
    }
    Ok(())
}

fn validate_recovery_config(config: &RecoveryConfig) -> Result<(), ConfigError> {
    if config.stale_after == 0 || config.scan_interval == 0 {
        return Err(ConfigError::Validation(
            "recovery stale_after and scan_interval must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_callback_config(config: &CallbackConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid callback url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "Callback url '{}' must use http or https",
            config.url
        )));
    }

    Ok(())
}

/// Validates one false-positive rule
fn validate_false_positive_rule(rule: &FalsePositiveRuleConfig) -> Result<(), ConfigError> {
    validate_host_pattern(&rule.host)?;

    if let Some(prefix) = &rule.path_prefix {
        if !prefix.starts_with('/') {
            return Err(ConfigError::InvalidPattern(format!(
                "path-prefix '{}' must start with '/'",
                prefix
            )));
        }
    }

    if rule.categories.is_empty() {
        return Err(ConfigError::Validation(format!(
            "false-positive rule for '{}' must name at least one category",
            rule.host
        )));
    }

    for name in &rule.categories {
        if LinkCategory::from_db_string(name).is_none() {
            return Err(ConfigError::Validation(format!(
                "Unknown link category '{}' in false-positive rule",
                name
            )));
        }
    }

    if rule.reason.trim().is_empty() {
        return Err(ConfigError::Validation(
            "false-positive rule reason cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates a host pattern (`*`, `*.example.com`, `login.*` or a plain host)
fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern == "*" {
        return Ok(());
    }

    if let Some(domain) = pattern.strip_prefix("*.") {
        return validate_domain_string(domain);
    }

    if let Some(label) = pattern.strip_suffix(".*") {
        if label.is_empty() || !label.chars().all(|c| c.is_alphanumeric() || c == '-') {
            return Err(ConfigError::InvalidPattern(format!(
                "Host label pattern '{}' must be a single label followed by '.*'",
                pattern
            )));
        }
        return Ok(());
    }

    validate_domain_string(pattern)
}

/// Validates a domain string (without wildcard prefix)
fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' must contain at least one dot (e.g., 'example.com')",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
