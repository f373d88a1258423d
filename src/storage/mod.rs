//! Storage module for persisting audit jobs
//!
//! This module handles all database operations for the pipeline, including:
//! - SQLite database initialization and schema management
//! - Audit job records and their conditional status updates
//! - Stage outputs (crawl exports, page records, link results)
//! - The stage queue workers claim tasks from

mod schema;
mod sqlite;
mod traits;

pub use schema::{get_schema_version, SCHEMA_VERSION};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::failure::FailureKind;
use crate::output::AuditReport;
use crate::state::{AuditStatus, Stage};
use crate::AuditError;

use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage shared between the worker, the pipeline and the recovery monitor
///
/// The lock is only ever held for synchronous database calls, never across
/// an `.await`.
pub type SharedStorage = Arc<Mutex<SqliteStorage>>;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(AuditError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> Result<SqliteStorage, AuditError> {
    let storage = SqliteStorage::new(path)?;
    tracing::debug!(path = %path.display(), "opened audit database");
    Ok(storage)
}

/// Wraps a storage backend for sharing
pub fn shared(storage: SqliteStorage) -> SharedStorage {
    Arc::new(Mutex::new(storage))
}

/// Locks shared storage, mapping a poisoned lock to a storage error
pub fn lock(storage: &SharedStorage) -> StorageResult<MutexGuard<'_, SqliteStorage>> {
    storage.lock().map_err(|_| StorageError::LockPoisoned)
}

/// Stored form of a timestamp
///
/// Fixed-width UTC with microseconds, so stored timestamps compare
/// correctly as strings.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Stored form of the current time
pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Parses a stored timestamp
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Fields of a new audit job
#[derive(Debug, Clone)]
pub struct NewAudit {
    pub url: String,
    pub max_pages: u32,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub config_hash: String,
}

/// Represents an audit job in the database
#[derive(Debug, Clone, PartialEq)]
pub struct AuditJob {
    pub id: i64,
    pub url: String,
    pub max_pages: u32,
    pub status: AuditStatus,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub user_id: Option<String>,
    pub correlation_id: Option<String>,
    pub config_hash: String,
    pub error_kind: Option<FailureKind>,
    /// Short message safe to show to end users
    pub error_message: Option<String>,
    /// Operator-only diagnostics
    pub technical_detail: Option<String>,
    pub report: Option<AuditReport>,
}

impl AuditJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Everything written when a job fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub user_message: String,
    pub technical_detail: String,
}

impl FailureRecord {
    pub fn new(kind: FailureKind, user_message: impl Into<String>, technical_detail: impl Into<String>) -> Self {
        Self {
            kind,
            user_message: user_message.into(),
            technical_detail: technical_detail.into(),
        }
    }
}

/// A unit of stage work in the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageTask {
    pub task_id: String,
    pub audit_id: i64,
    pub stage: Stage,
    /// 0 for the first run, incremented by each backoff reschedule
    pub attempt: u32,
    pub enqueued_at: String,
    pub available_at: String,
    pub claimed_at: Option<String>,
}

/// Completion record of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub stage: Stage,
    pub summary: serde_json::Value,
    pub warning: Option<String>,
    pub completed_at: String,
}
