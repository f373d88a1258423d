//! Audit job state
//!
//! This module owns the audit lifecycle.
//!
//! # Components
//!
//! - `AuditStatus` and `Stage`: the ordered statuses and the stages that produce them
//! - `StageOutput`: what a finished stage persists
//! - `machine`: the operations that move a persisted job through its statuses

mod audit_status;
pub mod machine;
mod output;

// Re-export main types
pub use audit_status::{AuditStatus, Stage};
pub use machine::{advance, begin, fail, is_terminal, start};
pub use output::StageOutput;
