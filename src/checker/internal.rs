//! Internal link verifier
//!
//! Same-site links are checked one at a time with a fixed delay. Pages the
//! crawler already fetched are not requested again; their crawl status is
//! reused. Each distinct URL is requested once, but a result is recorded for
//! every occurrence so a broken URL shows up under each page linking to it.

use crate::checker::{
    check_with_retry, LinkCheckResult, LinkProbe, LinkScope, LinkTarget, RawOutcome, RetryPolicy,
};
use crate::config::InternalLinksConfig;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Everything one internal verification produced
#[derive(Debug, Clone, Default)]
pub struct InternalVerification {
    /// One result per occurrence of a checked URL
    pub results: Vec<LinkCheckResult>,
    /// Distinct URLs with an outcome
    pub checked: usize,
    /// Distinct URLs dropped by the cap
    pub truncated: usize,
    /// The site answered 429; the stage must be rescheduled
    pub rate_limited: bool,
}

/// Sequential checker for same-site links
pub struct InternalLinkVerifier {
    probe: Arc<dyn LinkProbe>,
    config: InternalLinksConfig,
    retry: RetryPolicy,
}

impl InternalLinkVerifier {
    pub fn new(probe: Arc<dyn LinkProbe>, config: InternalLinksConfig, retry: RetryPolicy) -> Self {
        Self {
            probe,
            config,
            retry,
        }
    }

    /// Verifies internal link occurrences
    ///
    /// # Arguments
    ///
    /// * `occurrences` - Every (link, source page) pair in discovery order
    /// * `known` - Outcomes already observed for crawled pages, keyed by URL
    ///
    /// # Returns
    ///
    /// The verification. When the site rate limits a request, checking stops
    /// immediately and `rate_limited` is set; the partial results are not
    /// meant to be committed.
    pub async fn verify(
        &self,
        occurrences: Vec<LinkTarget>,
        known: &HashMap<String, RawOutcome>,
    ) -> InternalVerification {
        let mut distinct: Vec<&str> = Vec::new();
        let mut seen = HashSet::new();
        for occurrence in &occurrences {
            if seen.insert(occurrence.url.as_str()) {
                distinct.push(occurrence.url.as_str());
            }
        }

        let truncated = distinct.len().saturating_sub(self.config.max_links);
        distinct.truncate(self.config.max_links);

        let mut outcomes: HashMap<&str, RawOutcome> = HashMap::with_capacity(distinct.len());
        let mut requested = 0usize;
        for url in distinct.iter().copied() {
            if let Some(outcome) = known.get(url) {
                outcomes.insert(url, *outcome);
                continue;
            }

            if requested > 0 {
                tokio::time::sleep(self.config.request_delay()).await;
            }
            requested += 1;

            let outcome = check_with_retry(self.probe.as_ref(), url, &self.retry).await;
            if outcome.is_rate_limited() {
                tracing::warn!(url, requested, "site rate limited internal link checks");
                return InternalVerification {
                    results: Vec::new(),
                    checked: outcomes.len(),
                    truncated,
                    rate_limited: true,
                };
            }
            outcomes.insert(url, outcome);
        }

        let results: Vec<LinkCheckResult> = occurrences
            .iter()
            .filter_map(|occurrence| {
                outcomes
                    .get(occurrence.url.as_str())
                    .map(|outcome| LinkCheckResult::new(occurrence, LinkScope::Internal, *outcome))
            })
            .collect();

        tracing::info!(
            distinct = outcomes.len(),
            requested,
            occurrences = results.len(),
            truncated,
            "internal link verification finished"
        );

        InternalVerification {
            checked: outcomes.len(),
            results,
            truncated,
            rate_limited: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::LinkCategory;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    struct PathProbe {
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl PathProbe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
        }
    }

    #[async_trait]
    impl LinkProbe for PathProbe {
        async fn probe(&self, url: &str) -> RawOutcome {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), Instant::now()));
            if url.ends_with("/gone") {
                RawOutcome::Status(410)
            } else if url.ends_with("/slow-down") {
                RawOutcome::Status(429)
            } else {
                RawOutcome::Status(200)
            }
        }
    }

    fn verifier(probe: Arc<PathProbe>) -> InternalLinkVerifier {
        InternalLinkVerifier::new(probe, InternalLinksConfig::default(), RetryPolicy::none())
    }

    #[tokio::test(start_paused = true)]
    async fn test_result_per_occurrence_single_request() {
        let probe = PathProbe::new();
        let occurrences = vec![
            LinkTarget::new("https://site.example/gone", "https://site.example/"),
            LinkTarget::new("https://site.example/about", "https://site.example/"),
            LinkTarget::new("https://site.example/gone", "https://site.example/blog"),
        ];

        let verification = verifier(probe.clone())
            .verify(occurrences, &HashMap::new())
            .await;

        assert_eq!(probe.urls().len(), 2);
        assert_eq!(verification.checked, 2);
        assert_eq!(verification.results.len(), 3);

        let broken: Vec<&str> = verification
            .results
            .iter()
            .filter(|r| r.category == LinkCategory::Broken)
            .map(|r| r.source_page.as_str())
            .collect();
        assert_eq!(broken, vec!["https://site.example/", "https://site.example/blog"]);
        assert!(verification.results.iter().all(|r| r.scope == LinkScope::Internal));
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawled_pages_are_not_requested_again() {
        let probe = PathProbe::new();
        let mut known = HashMap::new();
        known.insert("https://site.example/about".to_string(), RawOutcome::Status(200));
        known.insert("https://site.example/old".to_string(), RawOutcome::Status(404));

        let verification = verifier(probe.clone())
            .verify(
                vec![
                    LinkTarget::new("https://site.example/about", "https://site.example/"),
                    LinkTarget::new("https://site.example/old", "https://site.example/"),
                    LinkTarget::new("https://site.example/contact", "https://site.example/"),
                ],
                &known,
            )
            .await;

        assert_eq!(probe.urls(), vec!["https://site.example/contact".to_string()]);
        assert_eq!(verification.results[1].category, LinkCategory::Broken);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_spaced() {
        let probe = PathProbe::new();
        let occurrences = (0..4)
            .map(|i| LinkTarget::new(format!("https://site.example/p{}", i), "https://site.example/"))
            .collect();

        verifier(probe.clone()).verify(occurrences, &HashMap::new()).await;

        let calls = probe.calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= Duration::from_millis(250));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_stops_verification() {
        let probe = PathProbe::new();
        let occurrences = vec![
            LinkTarget::new("https://site.example/a", "https://site.example/"),
            LinkTarget::new("https://site.example/slow-down", "https://site.example/"),
            LinkTarget::new("https://site.example/b", "https://site.example/"),
        ];

        let verification = verifier(probe.clone())
            .verify(occurrences, &HashMap::new())
            .await;

        assert!(verification.rate_limited);
        assert!(verification.results.is_empty());
        assert_eq!(probe.urls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_counts_distinct_urls() {
        let probe = PathProbe::new();
        let verifier = InternalLinkVerifier::new(
            probe.clone(),
            InternalLinksConfig {
                max_links: 2,
                ..InternalLinksConfig::default()
            },
            RetryPolicy::none(),
        );
        let occurrences = vec![
            LinkTarget::new("https://site.example/a", "https://site.example/"),
            LinkTarget::new("https://site.example/a", "https://site.example/x"),
            LinkTarget::new("https://site.example/b", "https://site.example/"),
            LinkTarget::new("https://site.example/c", "https://site.example/"),
        ];

        let verification = verifier.verify(occurrences, &HashMap::new()).await;

        assert_eq!(verification.truncated, 1);
        assert_eq!(verification.checked, 2);
        assert_eq!(verification.results.len(), 3);
    }
}
