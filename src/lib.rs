//! Site-Audit: a multi-stage website audit pipeline
//!
//! This crate runs audit jobs that crawl a site, analyze its pages, verify
//! internal and external links, compile a report and notify a callback
//! endpoint. Jobs move through a persisted state machine, stage work is
//! dispatched through a durable queue, and a stateless recovery monitor
//! resolves jobs that stop making progress.

pub mod analysis;
pub mod checker;
pub mod config;
pub mod crawler;
pub mod failure;
pub mod output;
pub mod pipeline;
pub mod recovery;
pub mod robots;
pub mod service;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Site-Audit operations
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Crawl error: {0}")]
    Crawl(#[from] crawler::CrawlError),

    #[error("Stage {stage} timed out after {seconds}s")]
    StageTimeout { stage: state::Stage, seconds: u64 },

    #[error("Rate limit exceeded during {stage} after {attempts} attempts")]
    RateLimitExceeded { stage: state::Stage, attempts: u32 },

    #[error("Persistence error: {0}")]
    Persistence(#[from] storage::StorageError),

    #[error("Audit {audit_id} changed while recovery was deciding")]
    RecoveryRace { audit_id: i64 },

    #[error("Audit not found: {0}")]
    AuditNotFound(i64),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Site-Audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use checker::{LinkCategory, LinkCheckResult, RawOutcome};
pub use config::Config;
pub use service::AuditService;
pub use state::{AuditStatus, Stage};
pub use url::{extract_domain, normalize_url, registrable_domain};
