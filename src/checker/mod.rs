//! Link verification
//!
//! This module contains everything needed to decide whether a link works:
//! - The outcome and category types shared by both link stages
//! - The pure classifier mapping outcomes to categories
//! - Request-level retries and stage-level backoff
//! - The HTTP probe that issues requests
//! - Domain-aware chunking and the concurrent external verifier
//! - The sequential internal verifier
//! - The false-positive filter applied to external results

mod chunking;
mod classifier;
mod external;
mod filter;
mod internal;
mod probe;
mod retry;

pub use chunking::{build_chunks, cap_candidates, Chunk, ChunkPolicy};
pub use classifier::{classify, classify_final, Verdict};
pub use external::{ChunkResult, ChunkStatus, ExternalLinkVerifier, ExternalMeta, ExternalVerification};
pub use filter::{FalsePositiveFilter, FilterRule};
pub use internal::{InternalLinkVerifier, InternalVerification};
pub use probe::HttpProbe;
pub(crate) use probe::network_error_kind;
pub use retry::{check_with_retry, RetryPolicy, StageBackoff};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Final category of a checked link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkCategory {
    /// 2xx or 3xx
    Success,
    /// 404 or 410
    Broken,
    /// 403
    PermissionIssue,
    /// 405
    MethodIssue,
    /// No response: connection, DNS, TLS or timeout failure
    Unreachable,
    /// Any other 4xx
    OtherClientError,
    /// 5xx that persisted through every request-level retry
    ServerError,
    /// Verification never completed (chunk timed out or was cancelled,
    /// or a third party kept rate limiting)
    Indeterminate,
}

impl LinkCategory {
    pub const ALL: [LinkCategory; 8] = [
        Self::Success,
        Self::Broken,
        Self::PermissionIssue,
        Self::MethodIssue,
        Self::Unreachable,
        Self::OtherClientError,
        Self::ServerError,
        Self::Indeterminate,
    ];

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Broken => "BROKEN",
            Self::PermissionIssue => "PERMISSION_ISSUE",
            Self::MethodIssue => "METHOD_ISSUE",
            Self::Unreachable => "UNREACHABLE",
            Self::OtherClientError => "OTHER_CLIENT_ERROR",
            Self::ServerError => "SERVER_ERROR",
            Self::Indeterminate => "INDETERMINATE",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.to_db_string() == s)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Kind of failure when no HTTP response arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkErrorKind {
    Dns,
    Connect,
    Timeout,
    Tls,
    Redirect,
    Other,
}

impl NetworkErrorKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Dns => "dns",
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Tls => "tls",
            Self::Redirect => "redirect",
            Self::Other => "other",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "dns" => Some(Self::Dns),
            "connect" => Some(Self::Connect),
            "timeout" => Some(Self::Timeout),
            "tls" => Some(Self::Tls),
            "redirect" => Some(Self::Redirect),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// What happened when a link was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RawOutcome {
    /// An HTTP response with this status code
    Status(u16),
    /// No response at all
    Network(NetworkErrorKind),
    /// The check never finished
    Indeterminate,
}

impl RawOutcome {
    /// Stored form: `"404"`, `"network:timeout"` or `"indeterminate"`
    pub fn to_db_string(&self) -> String {
        match self {
            Self::Status(code) => code.to_string(),
            Self::Network(kind) => format!("network:{}", kind.to_db_string()),
            Self::Indeterminate => "indeterminate".to_string(),
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        if s == "indeterminate" {
            return Some(Self::Indeterminate);
        }
        if let Some(kind) = s.strip_prefix("network:") {
            return NetworkErrorKind::from_db_string(kind).map(Self::Network);
        }
        s.parse::<u16>().ok().map(Self::Status)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Status(429))
    }
}

impl fmt::Display for RawOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

impl From<RawOutcome> for String {
    fn from(outcome: RawOutcome) -> Self {
        outcome.to_db_string()
    }
}

impl TryFrom<String> for RawOutcome {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RawOutcome::from_db_string(&value).ok_or_else(|| format!("invalid outcome '{}'", value))
    }
}

/// Whether a link points inside or outside the audited site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkScope {
    Internal,
    External,
}

impl LinkScope {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::External => "external",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "internal" => Some(Self::Internal),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// A link to check together with the page it was found on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkTarget {
    pub url: String,
    pub source_page: String,
}

impl LinkTarget {
    pub fn new(url: impl Into<String>, source_page: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_page: source_page.into(),
        }
    }
}

/// One recorded link check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCheckResult {
    pub url: String,
    pub source_page: String,
    pub scope: LinkScope,
    pub outcome: RawOutcome,
    pub category: LinkCategory,
    /// Reason of the false-positive rule that suppressed this result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppressed: Option<String>,
}

impl LinkCheckResult {
    pub fn new(target: &LinkTarget, scope: LinkScope, outcome: RawOutcome) -> Self {
        Self {
            url: target.url.clone(),
            source_page: target.source_page.clone(),
            scope,
            outcome,
            category: classify_final(&outcome),
            suppressed: None,
        }
    }

    /// A result for a link whose check never completed
    pub fn indeterminate(target: &LinkTarget, scope: LinkScope) -> Self {
        Self::new(target, scope, RawOutcome::Indeterminate)
    }

    /// True when the result belongs in the report's problem list
    pub fn is_problem(&self) -> bool {
        !self.category.is_success() && self.suppressed.is_none()
    }
}

/// Issues a single request for a link and reports what happened
#[async_trait]
pub trait LinkProbe: Send + Sync {
    async fn probe(&self, url: &str) -> RawOutcome;
}
