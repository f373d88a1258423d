//! Output module for audit reports
//!
//! This module handles:
//! - Compiling stage outputs into the final audit report
//! - Rendering reports as markdown for operators
//! - Job statistics and listings for the command line

mod markdown;
mod report;
pub mod stats;

pub use markdown::{format_markdown_report, write_markdown_report};
pub use report::{
    compile_report, AuditReport, InternalMeta, PageFindings, ReportInput, ReportSummary,
    ScopeSummary,
};
pub use stats::{load_statistics, print_job_table, print_statistics, AuditStatistics};
