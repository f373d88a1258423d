/// Audit status and stage definitions
///
/// An audit moves through its statuses in a fixed order. Each working status
/// belongs to exactly one pipeline stage.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an audit job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditStatus {
    // ===== Waiting =====
    /// Created and queued, crawl not started
    Pending,

    // ===== Working States =====
    Crawling,
    Analyzing,
    CheckingInternalLinks,
    CheckingExternalLinks,
    CompilingReport,

    // ===== Terminal States =====
    Complete,
    Failed,
}

impl AuditStatus {
    /// Returns true for COMPLETE and FAILED
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Position in the stage order; both terminal statuses share the last rank
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Crawling => 1,
            Self::Analyzing => 2,
            Self::CheckingInternalLinks => 3,
            Self::CheckingExternalLinks => 4,
            Self::CompilingReport => 5,
            Self::Complete | Self::Failed => 6,
        }
    }

    /// The stage running while the job has this status
    ///
    /// PENDING maps to the crawl stage, which has not started yet.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Pending | Self::Crawling => Some(Stage::Crawl),
            Self::Analyzing => Some(Stage::Analyze),
            Self::CheckingInternalLinks => Some(Stage::InternalLinks),
            Self::CheckingExternalLinks => Some(Stage::ExternalLinks),
            Self::CompilingReport => Some(Stage::CompileReport),
            Self::Complete | Self::Failed => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Crawling => "CRAWLING",
            Self::Analyzing => "ANALYZING",
            Self::CheckingInternalLinks => "CHECKING_INTERNAL_LINKS",
            Self::CheckingExternalLinks => "CHECKING_EXTERNAL_LINKS",
            Self::CompilingReport => "COMPILING_REPORT",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::all_statuses()
            .into_iter()
            .find(|status| status.to_db_string() == s)
    }

    pub fn all_statuses() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::Crawling,
            Self::Analyzing,
            Self::CheckingInternalLinks,
            Self::CheckingExternalLinks,
            Self::CompilingReport,
            Self::Complete,
            Self::Failed,
        ]
    }
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One pipeline phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Crawl,
    Analyze,
    InternalLinks,
    ExternalLinks,
    CompileReport,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Self::Crawl,
        Self::Analyze,
        Self::InternalLinks,
        Self::ExternalLinks,
        Self::CompileReport,
    ];

    /// Status the job holds while this stage runs
    pub fn status(&self) -> AuditStatus {
        match self {
            Self::Crawl => AuditStatus::Crawling,
            Self::Analyze => AuditStatus::Analyzing,
            Self::InternalLinks => AuditStatus::CheckingInternalLinks,
            Self::ExternalLinks => AuditStatus::CheckingExternalLinks,
            Self::CompileReport => AuditStatus::CompilingReport,
        }
    }

    /// Stage dispatched after this one, `None` after the report
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Crawl => Some(Self::Analyze),
            Self::Analyze => Some(Self::InternalLinks),
            Self::InternalLinks => Some(Self::ExternalLinks),
            Self::ExternalLinks => Some(Self::CompileReport),
            Self::CompileReport => None,
        }
    }

    /// Stage whose output this one consumes
    pub fn previous(&self) -> Option<Stage> {
        Self::ALL.into_iter().find(|s| s.next() == Some(*self))
    }

    /// Status committed when this stage finishes
    pub fn completed_status(&self) -> AuditStatus {
        self.next().map_or(AuditStatus::Complete, |next| next.status())
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Crawl => "crawl",
            Self::Analyze => "analyze",
            Self::InternalLinks => "internal_links",
            Self::ExternalLinks => "external_links",
            Self::CompileReport => "compile_report",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.to_db_string() == s)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_terminal() {
        assert!(AuditStatus::Complete.is_terminal());
        assert!(AuditStatus::Failed.is_terminal());
        for status in AuditStatus::all_statuses() {
            if !matches!(status, AuditStatus::Complete | AuditStatus::Failed) {
                assert!(!status.is_terminal(), "{} should not be terminal", status);
            }
        }
    }

    #[test]
    fn test_status_roundtrip_db_string() {
        for status in AuditStatus::all_statuses() {
            assert_eq!(AuditStatus::from_db_string(status.to_db_string()), Some(status));
        }
        assert_eq!(AuditStatus::from_db_string("complete"), None);
    }

    #[test]
    fn test_stage_roundtrip_db_string() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_db_string(stage.to_db_string()), Some(stage));
        }
        assert_eq!(Stage::from_db_string("report"), None);
    }

    #[test]
    fn test_stage_order_walks_every_status_once() {
        let mut walked = vec![AuditStatus::Pending];
        let mut stage = Some(Stage::Crawl);
        while let Some(current) = stage {
            walked.push(current.status());
            stage = current.next();
        }
        walked.push(Stage::CompileReport.completed_status());

        assert_eq!(
            walked,
            vec![
                AuditStatus::Pending,
                AuditStatus::Crawling,
                AuditStatus::Analyzing,
                AuditStatus::CheckingInternalLinks,
                AuditStatus::CheckingExternalLinks,
                AuditStatus::CompilingReport,
                AuditStatus::Complete,
            ]
        );
        assert!(walked.windows(2).all(|pair| pair[0].rank() < pair[1].rank()));
    }

    #[test]
    fn test_previous_stage() {
        assert_eq!(Stage::Crawl.previous(), None);
        assert_eq!(Stage::ExternalLinks.previous(), Some(Stage::InternalLinks));
    }

    #[test]
    fn test_status_stage() {
        assert_eq!(AuditStatus::Pending.stage(), Some(Stage::Crawl));
        assert_eq!(AuditStatus::CheckingExternalLinks.stage(), Some(Stage::ExternalLinks));
        assert_eq!(AuditStatus::Failed.stage(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", AuditStatus::CheckingInternalLinks), "CHECKING_INTERNAL_LINKS");
        assert_eq!(format!("{}", Stage::CompileReport), "compile_report");
    }
}
