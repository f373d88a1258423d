//! Failure kinds and user-facing failure messages
//!
//! A failed audit carries two messages: a short generic one that is safe to
//! show to end users, and the technical detail kept for operators. This
//! module maps technical error text to the user-facing message.

use crate::AuditError;
use std::fmt;

/// Category of a job failure, persisted alongside FAILED audits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Validation,
    Crawl,
    StageTimeout,
    RateLimitExceeded,
    Persistence,
    Recovery,
    Internal,
}

impl FailureKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Crawl => "CRAWL",
            Self::StageTimeout => "STAGE_TIMEOUT",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::Persistence => "PERSISTENCE",
            Self::Recovery => "RECOVERY",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "VALIDATION" => Some(Self::Validation),
            "CRAWL" => Some(Self::Crawl),
            "STAGE_TIMEOUT" => Some(Self::StageTimeout),
            "RATE_LIMIT_EXCEEDED" => Some(Self::RateLimitExceeded),
            "PERSISTENCE" => Some(Self::Persistence),
            "RECOVERY" => Some(Self::Recovery),
            "INTERNAL" => Some(Self::Internal),
            _ => None,
        }
    }

    /// Picks the failure kind for an error raised while running a stage
    pub fn for_error(error: &AuditError) -> Self {
        match error {
            AuditError::Validation(_) | AuditError::Url(_) | AuditError::UrlParse(_) => {
                Self::Validation
            }
            AuditError::Crawl(_) => Self::Crawl,
            AuditError::StageTimeout { .. } => Self::StageTimeout,
            AuditError::RateLimitExceeded { .. } => Self::RateLimitExceeded,
            AuditError::Persistence(_) => Self::Persistence,
            AuditError::RecoveryRace { .. } => Self::Recovery,
            _ => Self::Internal,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Message shown when no pattern matches the technical detail
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Something went wrong while analyzing this website. Please try again.";

/// Ordered list of (needles, user message). First match wins.
const MESSAGE_PATTERNS: &[(&[&str], &str)] = &[
    (
        &["dns", "name or service not known", "failed to lookup", "nodename nor servname"],
        "Website not found. Please check the URL and try again.",
    ),
    (
        &["connection refused", "connection reset"],
        "Website is currently unavailable. Please try again later.",
    ),
    (
        &["timed out", "timeout"],
        "Analysis took too long to complete. Please try again.",
    ),
    (
        &["certificate", "ssl", "tls"],
        "Website has security certificate issues.",
    ),
    (
        &["too many redirects", "redirect loop"],
        "Website has too many redirects.",
    ),
    (
        &["rate limit", "429"],
        "The website is limiting our requests. Please try again later.",
    ),
    (
        &["robots.txt"],
        "This website does not allow automated analysis.",
    ),
    (
        &["401", "403", "forbidden", "unauthorized"],
        "Access to this website is restricted.",
    ),
    (
        &["404", "not found"],
        "The requested page could not be found.",
    ),
    (
        &["500", "502", "503", "504", "server error"],
        "The website is experiencing technical difficulties.",
    ),
    (
        &["no pages", "no usable", "empty"],
        "Website has no accessible content to analyze.",
    ),
];

/// Derives the short user-facing message for a technical error description
///
/// # Arguments
///
/// * `technical` - The technical error text
///
/// # Returns
///
/// A short, generic message suitable for end users
pub fn user_message_for(technical: &str) -> &'static str {
    let lowered = technical.to_lowercase();
    MESSAGE_PATTERNS
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lowered.contains(needle)))
        .map(|(_, message)| *message)
        .unwrap_or(GENERIC_FAILURE_MESSAGE)
}
