//! Job statistics for operator tooling
//!
//! This module extracts and prints audit job listings and counters from
//! the storage layer.

use crate::state::AuditStatus;
use crate::storage::{AuditJob, Storage};
use crate::Result;
use std::collections::BTreeMap;

/// Job counters over the most recent audits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditStatistics {
    /// Number of audits inspected
    pub total_audits: usize,

    /// Count of audits by status
    pub audits_by_status: BTreeMap<AuditStatus, usize>,

    /// Stage tasks waiting to be claimed
    pub queued_tasks: usize,
}

impl AuditStatistics {
    /// Builds counters from a job listing
    pub fn from_jobs(jobs: &[AuditJob], queued_tasks: usize) -> Self {
        let mut audits_by_status = BTreeMap::new();
        for job in jobs {
            *audits_by_status.entry(job.status).or_insert(0) += 1;
        }
        Self {
            total_audits: jobs.len(),
            audits_by_status,
            queued_tasks,
        }
    }

    /// Audits that have not reached COMPLETE or FAILED
    pub fn in_progress(&self) -> usize {
        self.audits_by_status
            .iter()
            .filter(|(status, _)| !status.is_terminal())
            .map(|(_, count)| count)
            .sum()
    }
}

/// Loads statistics over the `limit` most recent audits
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `limit` - How many recent audits to inspect
///
/// # Returns
///
/// * `Ok(AuditStatistics)` - Successfully loaded statistics
/// * `Err(AuditError)` - Failed to query storage
pub fn load_statistics(storage: &dyn Storage, limit: usize) -> Result<AuditStatistics> {
    let jobs = storage.list_recent_audits(limit)?;
    let queued_tasks = storage.count_queued_tasks()?;
    Ok(AuditStatistics::from_jobs(&jobs, queued_tasks))
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &AuditStatistics) {
    println!("=== Audit Statistics ===\n");

    println!("Overview:");
    println!("  Audits inspected: {}", stats.total_audits);
    println!("  In progress: {}", stats.in_progress());
    println!("  Queued stage tasks: {}", stats.queued_tasks);
    println!();

    println!("Audits by Status:");
    for (status, count) in &stats.audits_by_status {
        let percentage = if stats.total_audits > 0 {
            (*count as f64 / stats.total_audits as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();
}

/// Prints one line per job
///
/// # Arguments
///
/// * `jobs` - The jobs to list
pub fn print_job_table(jobs: &[AuditJob]) {
    if jobs.is_empty() {
        println!("No audits.");
        return;
    }

    println!(
        "{:>6}  {:<24}  {:<28}  {}",
        "ID", "STATUS", "UPDATED", "URL"
    );
    for job in jobs {
        println!(
            "{:>6}  {:<24}  {:<28}  {}",
            job.id,
            job.status.to_db_string(),
            job.updated_at,
            job.url
        );
        if let Some(message) = &job.error_message {
            println!("{:>6}  error: {}", "", message);
        }
    }
}
