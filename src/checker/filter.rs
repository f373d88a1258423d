//! False-positive filter for external link results
//!
//! Rules are declarative predicates over a result's host, path and category.
//! A matching result keeps its category and is marked suppressed with the
//! rule's reason. Predicates only look at the classified category, which
//! suppression never changes, so the set of suppressed results does not
//! depend on rule order and re-applying the filter changes nothing.

use crate::checker::{LinkCategory, LinkCheckResult};
use crate::config::FalsePositiveRuleConfig;
use crate::url::{extract_domain, matches_wildcard};
use url::Url;

/// One suppression rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub host_pattern: String,
    pub path_prefix: Option<String>,
    pub categories: Vec<LinkCategory>,
    pub reason: String,
}

impl FilterRule {
    pub fn new(
        host_pattern: &str,
        path_prefix: Option<&str>,
        categories: &[LinkCategory],
        reason: &str,
    ) -> Self {
        Self {
            host_pattern: host_pattern.to_string(),
            path_prefix: path_prefix.map(str::to_string),
            categories: categories.to_vec(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if the rule applies to the result
    pub fn matches(&self, result: &LinkCheckResult) -> bool {
        if !self.categories.contains(&result.category) {
            return false;
        }

        let Ok(url) = Url::parse(&result.url) else {
            return false;
        };
        let Some(host) = extract_domain(&url) else {
            return false;
        };

        if !matches_wildcard(&self.host_pattern, &host) {
            return false;
        }

        match &self.path_prefix {
            Some(prefix) => path_has_prefix(url.path(), prefix),
            None => true,
        }
    }
}

/// Segment-aware prefix check: `/admin` covers `/admin` and `/admin/x`
/// but not `/administrator`
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    let path = path.to_lowercase();
    let prefix = prefix.to_lowercase();
    if prefix.ends_with('/') {
        return path.starts_with(&prefix);
    }
    path == prefix
        || path
            .strip_prefix(&prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Ordered list of suppression rules
#[derive(Debug, Clone, Default)]
pub struct FalsePositiveFilter {
    rules: Vec<FilterRule>,
}

impl FalsePositiveFilter {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self { rules }
    }

    /// Rules for authentication-gated hosts and administrative paths
    pub fn default_rules() -> Self {
        use LinkCategory::*;

        let mut rules = Vec::new();
        for host in ["login.*", "auth.*", "accounts.*", "sso.*", "signin.*"] {
            rules.push(FilterRule::new(
                host,
                None,
                &[PermissionIssue, MethodIssue, OtherClientError],
                "authentication-gated host",
            ));
        }
        for path in ["/admin", "/wp-admin", "/login", "/signin", "/account"] {
            rules.push(FilterRule::new(
                "*",
                Some(path),
                &[PermissionIssue, MethodIssue],
                "administrative path",
            ));
        }
        Self { rules }
    }

    /// Builds the filter from configured rules, falling back to the defaults
    /// when none are configured
    pub fn from_config(rules: &[FalsePositiveRuleConfig]) -> Self {
        if rules.is_empty() {
            return Self::default_rules();
        }

        Self::new(
            rules
                .iter()
                .map(|rule| FilterRule {
                    host_pattern: rule.host.to_lowercase(),
                    path_prefix: rule.path_prefix.clone(),
                    categories: rule
                        .categories
                        .iter()
                        .filter_map(|c| LinkCategory::from_db_string(c))
                        .collect(),
                    reason: rule.reason.clone(),
                })
                .collect(),
        )
    }

    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Marks matching results as suppressed
    ///
    /// # Returns
    ///
    /// The number of suppressed results after filtering
    pub fn apply(&self, results: &mut [LinkCheckResult]) -> usize {
        for result in results.iter_mut() {
            if result.suppressed.is_some() {
                continue;
            }
            if let Some(rule) = self.rules.iter().find(|rule| rule.matches(result)) {
                tracing::debug!(url = %result.url, reason = %rule.reason, "suppressing link result");
                result.suppressed = Some(rule.reason.clone());
            }
        }
        results.iter().filter(|r| r.suppressed.is_some()).count()
    }
}
