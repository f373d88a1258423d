//! Markdown report rendering
//!
//! This module renders a compiled audit report as markdown for operators,
//! including link counters, chunk statistics and per-page findings.

use crate::checker::{LinkCategory, LinkScope};
use crate::output::{AuditReport, ScopeSummary};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Writes a markdown rendering of a report
///
/// # Arguments
///
/// * `report` - The compiled report
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote the report
/// * `Err(std::io::Error)` - Failed to write the file
pub fn write_markdown_report(report: &AuditReport, output_path: &Path) -> std::io::Result<()> {
    let markdown = format_markdown_report(report);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

fn push_scope_table(md: &mut String, title: &str, scope: &ScopeSummary) {
    md.push_str(&format!("### {}\n\n", title));
    md.push_str("| Category | Count |\n");
    md.push_str("|----------|-------|\n");
    for category in LinkCategory::ALL {
        let count = scope.count(category);
        if count > 0 {
            md.push_str(&format!("| {} | {} |\n", category, count));
        }
    }
    md.push_str(&format!("| **Total** | {} |\n", scope.total));
    if scope.suppressed > 0 {
        md.push_str(&format!("| Suppressed | {} |\n", scope.suppressed));
    }
    md.push('\n');
}

/// Formats a report as markdown
///
/// # Arguments
///
/// * `report` - The compiled report
///
/// # Returns
///
/// A formatted markdown string
pub fn format_markdown_report(report: &AuditReport) -> String {
    let mut md = String::new();

    md.push_str(&format!("# Site Audit Report: {}\n\n", report.url));

    md.push_str("## Audit Information\n\n");
    md.push_str(&format!("- **Audit ID**: {}\n", report.audit_id));
    md.push_str(&format!("- **Generated**: {}\n", report.generated_at));
    md.push_str(&format!(
        "- **Pages Analyzed**: {}\n",
        report.summary.pages_analyzed
    ));
    md.push_str(&format!(
        "- **Pages With Findings**: {}\n\n",
        report.summary.pages_with_findings
    ));

    if !report.warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for warning in &report.warnings {
            md.push_str(&format!("- {}\n", warning));
        }
        md.push('\n');
    }

    md.push_str("## Links\n\n");
    push_scope_table(&mut md, "Internal Links", &report.summary.internal);
    if report.internal.truncated > 0 {
        md.push_str(&format!(
            "{} internal URLs were not checked (limit reached).\n\n",
            report.internal.truncated
        ));
    }
    push_scope_table(&mut md, "External Links", &report.summary.external);

    let external = &report.external;
    md.push_str("### External Verification\n\n");
    md.push_str(&format!("- **Candidates**: {}\n", external.candidates));
    md.push_str(&format!("- **Checked**: {}\n", external.checked));
    md.push_str(&format!("- **Truncated**: {}\n", external.truncated));
    md.push_str(&format!(
        "- **Chunks**: {} total, {} completed, {} timed out, {} cancelled, {} failed\n",
        external.chunks_total,
        external.chunks_completed,
        external.chunks_timed_out,
        external.chunks_cancelled,
        external.chunks_failed
    ));
    md.push_str(&format!(
        "- **Rate Limited Responses**: {}\n\n",
        external.rate_limited
    ));

    if !report.problems.is_empty() {
        md.push_str("## Problem Links\n\n");
        md.push_str("| Scope | URL | Found On | Outcome | Category |\n");
        md.push_str("|-------|-----|----------|---------|----------|\n");
        for problem in &report.problems {
            let scope = match problem.scope {
                LinkScope::Internal => "internal",
                LinkScope::External => "external",
            };
            md.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                scope, problem.url, problem.source_page, problem.outcome, problem.category
            ));
        }
        md.push('\n');
    }

    if !report.pages.is_empty() {
        md.push_str("## Page Findings\n\n");
        for page in &report.pages {
            md.push_str(&format!("### {}\n\n", page.url));
            for finding in &page.findings {
                md.push_str(&format!(
                    "- **{}**: {}\n",
                    finding.check.to_db_string(),
                    finding.message
                ));
            }
            md.push('\n');
        }
    }

    md
}
