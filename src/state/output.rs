//! Stage outputs committed when a stage finishes

use crate::analysis::PageRecord;
use crate::checker::{ExternalMeta, LinkCheckResult};
use crate::crawler::PageExport;
use crate::output::{AuditReport, InternalMeta};
use crate::state::Stage;
use serde_json::json;

/// Everything a finished stage persists
#[derive(Debug, Clone)]
pub enum StageOutput {
    Crawl(Vec<PageExport>),
    Analysis(Vec<PageRecord>),
    InternalLinks {
        results: Vec<LinkCheckResult>,
        meta: InternalMeta,
    },
    ExternalLinks {
        results: Vec<LinkCheckResult>,
        meta: ExternalMeta,
        warning: Option<String>,
    },
    Report(AuditReport),
}

impl StageOutput {
    /// The stage that produced this output
    pub fn stage(&self) -> Stage {
        match self {
            Self::Crawl(_) => Stage::Crawl,
            Self::Analysis(_) => Stage::Analyze,
            Self::InternalLinks { .. } => Stage::InternalLinks,
            Self::ExternalLinks { .. } => Stage::ExternalLinks,
            Self::Report(_) => Stage::CompileReport,
        }
    }

    /// Small JSON summary stored alongside the stage completion
    pub fn summary(&self) -> serde_json::Value {
        match self {
            Self::Crawl(pages) => json!({
                "pages": pages.len(),
                "ok_pages": pages.iter().filter(|p| p.is_ok()).count(),
            }),
            Self::Analysis(records) => json!({ "pages": records.len() }),
            Self::InternalLinks { results, meta } => json!({
                "results": results.len(),
                "checked": meta.checked,
                "truncated": meta.truncated,
            }),
            Self::ExternalLinks { meta, .. } => serde_json::to_value(meta).unwrap_or_default(),
            Self::Report(report) => json!({ "problems": report.problems.len() }),
        }
    }

    /// Job-level warning raised by the stage
    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::ExternalLinks { warning, .. } => warning.as_deref(),
            _ => None,
        }
    }
}
