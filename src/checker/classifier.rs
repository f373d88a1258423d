//! Outcome classification
//!
//! | Outcome | Verdict |
//! |---|---|
//! | 1xx / 2xx / 3xx | SUCCESS |
//! | 404, 410 | BROKEN |
//! | 403 | PERMISSION_ISSUE |
//! | 405 | METHOD_ISSUE |
//! | 429 | rate limited (handled by the stage, not per link) |
//! | other 4xx | OTHER_CLIENT_ERROR |
//! | 5xx | retry |
//! | outside 100-599 | SERVER_ERROR |
//! | no response | UNREACHABLE |
//! | never completed | INDETERMINATE |

use crate::checker::{LinkCategory, RawOutcome};

/// Result of classifying a single raw outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The outcome maps to a final category
    Classified(LinkCategory),
    /// Server error; retry before classifying
    RetryServerError,
    /// The target is rate limiting; escalate to the stage
    RateLimited,
}

/// Classifies a raw outcome
///
/// Pure and deterministic: the same outcome always yields the same verdict.
pub fn classify(outcome: &RawOutcome) -> Verdict {
    match *outcome {
        RawOutcome::Status(code) => match code {
            100..=399 => Verdict::Classified(LinkCategory::Success),
            404 | 410 => Verdict::Classified(LinkCategory::Broken),
            403 => Verdict::Classified(LinkCategory::PermissionIssue),
            405 => Verdict::Classified(LinkCategory::MethodIssue),
            429 => Verdict::RateLimited,
            400..=499 => Verdict::Classified(LinkCategory::OtherClientError),
            500..=599 => Verdict::RetryServerError,
            // Not a valid HTTP status; the server misbehaved
            _ => Verdict::Classified(LinkCategory::ServerError),
        },
        RawOutcome::Network(_) => Verdict::Classified(LinkCategory::Unreachable),
        RawOutcome::Indeterminate => Verdict::Classified(LinkCategory::Indeterminate),
    }
}

/// Category to record once no further retry will happen
///
/// A 5xx that survived every request-level retry becomes SERVER_ERROR. A 429
/// that reaches this point was not resolved by the stage and is recorded as
/// INDETERMINATE.
pub fn classify_final(outcome: &RawOutcome) -> LinkCategory {
    match classify(outcome) {
        Verdict::Classified(category) => category,
        Verdict::RetryServerError => LinkCategory::ServerError,
        Verdict::RateLimited => LinkCategory::Indeterminate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::NetworkErrorKind;

    fn status(code: u16) -> Verdict {
        classify(&RawOutcome::Status(code))
    }

    #[test]
    fn test_classification_table() {
        assert_eq!(status(404), Verdict::Classified(LinkCategory::Broken));
        assert_eq!(status(410), Verdict::Classified(LinkCategory::Broken));
        assert_eq!(status(403), Verdict::Classified(LinkCategory::PermissionIssue));
        assert_eq!(status(405), Verdict::Classified(LinkCategory::MethodIssue));
        assert_eq!(
            classify(&RawOutcome::Network(NetworkErrorKind::Connect)),
            Verdict::Classified(LinkCategory::Unreachable)
        );
        assert_eq!(status(429), Verdict::RateLimited);
    }

    #[test]
    fn test_success_range() {
        for code in [200, 204, 301, 302, 308, 399] {
            assert_eq!(status(code), Verdict::Classified(LinkCategory::Success));
        }
    }

    #[test]
    fn test_other_client_errors() {
        for code in [400, 401, 402, 406, 418, 451, 499] {
            assert_eq!(
                status(code),
                Verdict::Classified(LinkCategory::OtherClientError)
            );
        }
    }

    #[test]
    fn test_status_codes_outside_client_range() {
        for code in [100, 101, 103] {
            assert_eq!(status(code), Verdict::Classified(LinkCategory::Success));
        }
        for code in [0, 99, 600, 999] {
            assert_eq!(status(code), Verdict::Classified(LinkCategory::ServerError));
        }
    }

    #[test]
    fn test_server_errors_are_not_classified() {
        for code in [500, 502, 503, 504, 599] {
            assert_eq!(status(code), Verdict::RetryServerError);
        }
    }

    #[test]
    fn test_every_network_failure_is_unreachable() {
        for kind in [
            NetworkErrorKind::Dns,
            NetworkErrorKind::Connect,
            NetworkErrorKind::Timeout,
            NetworkErrorKind::Tls,
            NetworkErrorKind::Redirect,
            NetworkErrorKind::Other,
        ] {
            assert_eq!(
                classify_final(&RawOutcome::Network(kind)),
                LinkCategory::Unreachable
            );
        }
    }

    #[test]
    fn test_indeterminate_is_distinct_from_unreachable() {
        assert_eq!(
            classify_final(&RawOutcome::Indeterminate),
            LinkCategory::Indeterminate
        );
    }

    #[test]
    fn test_final_category() {
        assert_eq!(classify_final(&RawOutcome::Status(503)), LinkCategory::ServerError);
        assert_eq!(
            classify_final(&RawOutcome::Status(429)),
            LinkCategory::Indeterminate
        );
        assert_eq!(classify_final(&RawOutcome::Status(200)), LinkCategory::Success);
    }
}
