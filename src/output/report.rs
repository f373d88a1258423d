//! Audit report compilation
//!
//! The report is a pure function of the stage outputs. Counters live in
//! ordered maps and problem links are sorted, so the same inputs always
//! produce the same report regardless of the order chunks finished in.

use crate::analysis::{Finding, PageRecord};
use crate::checker::{ExternalMeta, LinkCategory, LinkCheckResult, LinkScope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Counters for one link scope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeSummary {
    /// Recorded results, suppressed ones included
    pub total: usize,
    /// Results per category, suppressed ones included
    pub categories: BTreeMap<LinkCategory, usize>,
    pub suppressed: usize,
    /// Results that belong in the problem list
    pub problems: usize,
}

impl ScopeSummary {
    fn from_results<'a>(results: impl IntoIterator<Item = &'a LinkCheckResult>) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.total += 1;
            *summary.categories.entry(result.category).or_default() += 1;
            if result.suppressed.is_some() {
                summary.suppressed += 1;
            }
            if result.is_problem() {
                summary.problems += 1;
            }
        }
        summary
    }

    /// Count for one category
    pub fn count(&self, category: LinkCategory) -> usize {
        self.categories.get(&category).copied().unwrap_or(0)
    }
}

/// Top-level counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub pages_analyzed: usize,
    pub pages_with_findings: usize,
    pub internal: ScopeSummary,
    pub external: ScopeSummary,
}

/// Internal link stage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalMeta {
    pub checked: usize,
    pub truncated: usize,
}

/// Findings of one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFindings {
    pub url: String,
    pub findings: Vec<Finding>,
}

/// Final audit report, stored as JSON on the job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub audit_id: i64,
    pub url: String,
    pub generated_at: String,
    pub summary: ReportSummary,
    pub external: ExternalMeta,
    pub internal: InternalMeta,
    /// Pages with at least one finding, sorted by URL
    pub pages: Vec<PageFindings>,
    /// Non-success, non-suppressed results sorted by scope, URL and source page
    pub problems: Vec<LinkCheckResult>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Everything the report is compiled from
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub audit_id: i64,
    pub url: &'a str,
    pub generated_at: &'a str,
    pub records: &'a [PageRecord],
    pub internal_results: &'a [LinkCheckResult],
    pub internal_meta: InternalMeta,
    pub external_results: &'a [LinkCheckResult],
    pub external_meta: &'a ExternalMeta,
    pub warnings: &'a [String],
}

/// Compiles the final report
pub fn compile_report(input: ReportInput<'_>) -> AuditReport {
    let mut pages: Vec<PageFindings> = input
        .records
        .iter()
        .filter(|record| !record.findings.is_empty())
        .map(|record| PageFindings {
            url: record.url.clone(),
            findings: record.findings.clone(),
        })
        .collect();
    pages.sort_by(|a, b| a.url.cmp(&b.url));

    let mut problems: Vec<LinkCheckResult> = input
        .internal_results
        .iter()
        .chain(input.external_results)
        .filter(|result| result.is_problem())
        .cloned()
        .collect();
    problems.sort_by(|a, b| {
        (a.scope, &a.url, &a.source_page).cmp(&(b.scope, &b.url, &b.source_page))
    });

    let summary = ReportSummary {
        pages_analyzed: input.records.len(),
        pages_with_findings: pages.len(),
        internal: ScopeSummary::from_results(
            input
                .internal_results
                .iter()
                .filter(|r| r.scope == LinkScope::Internal),
        ),
        external: ScopeSummary::from_results(
            input
                .external_results
                .iter()
                .filter(|r| r.scope == LinkScope::External),
        ),
    };

    AuditReport {
        audit_id: input.audit_id,
        url: input.url.to_string(),
        generated_at: input.generated_at.to_string(),
        summary,
        external: input.external_meta.clone(),
        internal: input.internal_meta,
        pages,
        problems,
        warnings: input.warnings.to_vec(),
    }
}
