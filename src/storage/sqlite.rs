//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.

use crate::analysis::PageRecord;
use crate::checker::{LinkCategory, LinkCheckResult, LinkScope, RawOutcome};
use crate::crawler::PageExport;
use crate::failure::FailureKind;
use crate::state::{AuditStatus, Stage, StageOutput};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageResult};
use crate::storage::{
    now_timestamp, AuditJob, FailureRecord, NewAudit, StageSummary, StageTask,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use uuid::Uuid;

const AUDIT_COLUMNS: &str = "id, url, max_pages, status, created_at, updated_at, completed_at, \
     user_id, correlation_id, config_hash, error_kind, error_message, technical_detail, report";

const TASK_COLUMNS: &str =
    "task_id, audit_id, stage, attempt, enqueued_at, available_at, claimed_at";

/// Appends `?1` to the technical detail column, one line per entry
const APPEND_DETAIL: &str = "CASE WHEN technical_detail IS NULL OR technical_detail = '' \
     THEN ?1 ELSE technical_detail || char(10) || ?1 END";

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Overwrites an audit's `updated_at` (for testing staleness)
    pub fn set_updated_at(&mut self, audit_id: i64, updated_at: &str) -> StorageResult<()> {
        self.conn.execute(
            "UPDATE audits SET updated_at = ?1 WHERE id = ?2",
            params![updated_at, audit_id],
        )?;
        Ok(())
    }
}

fn conversion_error(column: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        Type::Text,
        format!("unexpected value '{}'", value).into(),
    )
}

fn json_error(column: usize, error: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}

fn read_audit(row: &Row<'_>) -> rusqlite::Result<AuditJob> {
    let status: String = row.get(3)?;
    let error_kind: Option<String> = row.get(10)?;
    let report: Option<String> = row.get(13)?;

    Ok(AuditJob {
        id: row.get(0)?,
        url: row.get(1)?,
        max_pages: row.get(2)?,
        status: AuditStatus::from_db_string(&status).ok_or_else(|| conversion_error(3, &status))?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        completed_at: row.get(6)?,
        user_id: row.get(7)?,
        correlation_id: row.get(8)?,
        config_hash: row.get(9)?,
        error_kind: match error_kind {
            Some(kind) => {
                Some(FailureKind::from_db_string(&kind).ok_or_else(|| conversion_error(10, &kind))?)
            }
            None => None,
        },
        error_message: row.get(11)?,
        technical_detail: row.get(12)?,
        report: match report {
            Some(json) => Some(serde_json::from_str(&json).map_err(|e| json_error(13, e))?),
            None => None,
        },
    })
}

fn read_task(row: &Row<'_>) -> rusqlite::Result<StageTask> {
    let stage: String = row.get(2)?;
    Ok(StageTask {
        task_id: row.get(0)?,
        audit_id: row.get(1)?,
        stage: Stage::from_db_string(&stage).ok_or_else(|| conversion_error(2, &stage))?,
        attempt: row.get(3)?,
        enqueued_at: row.get(4)?,
        available_at: row.get(5)?,
        claimed_at: row.get(6)?,
    })
}

/// Queues a stage task, reusing an unclaimed task for the same audit and stage
fn insert_task(
    conn: &Connection,
    audit_id: i64,
    stage: Stage,
    attempt: u32,
    available_at: &str,
) -> StorageResult<StageTask> {
    let existing = conn
        .query_row(
            &format!(
                "SELECT {} FROM stage_queue
                 WHERE audit_id = ?1 AND stage = ?2 AND claimed_at IS NULL",
                TASK_COLUMNS
            ),
            params![audit_id, stage.to_db_string()],
            read_task,
        )
        .optional()?;
    if let Some(task) = existing {
        return Ok(task);
    }

    let task = StageTask {
        task_id: Uuid::new_v4().to_string(),
        audit_id,
        stage,
        attempt,
        enqueued_at: now_timestamp(),
        available_at: available_at.to_string(),
        claimed_at: None,
    };
    conn.execute(
        "INSERT INTO stage_queue (task_id, audit_id, stage, attempt, enqueued_at, available_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            task.task_id,
            task.audit_id,
            stage.to_db_string(),
            task.attempt,
            task.enqueued_at,
            task.available_at
        ],
    )?;
    Ok(task)
}

fn insert_link_results(
    conn: &Connection,
    audit_id: i64,
    scope: LinkScope,
    results: &[LinkCheckResult],
) -> StorageResult<()> {
    conn.execute(
        "DELETE FROM link_results WHERE audit_id = ?1 AND scope = ?2",
        params![audit_id, scope.to_db_string()],
    )?;
    let mut stmt = conn.prepare(
        "INSERT INTO link_results (audit_id, scope, url, source_page, outcome, category, suppressed)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for result in results {
        stmt.execute(params![
            audit_id,
            result.scope.to_db_string(),
            result.url,
            result.source_page,
            result.outcome.to_db_string(),
            result.category.to_db_string(),
            result.suppressed
        ])?;
    }
    Ok(())
}

fn write_stage_rows(conn: &Connection, audit_id: i64, output: &StageOutput) -> StorageResult<()> {
    match output {
        StageOutput::Crawl(pages) => {
            conn.execute("DELETE FROM crawl_pages WHERE audit_id = ?1", params![audit_id])?;
            let mut stmt = conn.prepare(
                "INSERT INTO crawl_pages (audit_id, url, status_code, depth, export)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for page in pages {
                stmt.execute(params![
                    audit_id,
                    page.url,
                    page.status_code,
                    page.depth,
                    serde_json::to_string(page)?
                ])?;
            }
        }
        StageOutput::Analysis(records) => {
            conn.execute("DELETE FROM page_records WHERE audit_id = ?1", params![audit_id])?;
            let mut stmt = conn.prepare(
                "INSERT INTO page_records (audit_id, url, record) VALUES (?1, ?2, ?3)",
            )?;
            for record in records {
                stmt.execute(params![audit_id, record.url, serde_json::to_string(record)?])?;
            }
        }
        StageOutput::InternalLinks { results, .. } => {
            insert_link_results(conn, audit_id, LinkScope::Internal, results)?;
        }
        StageOutput::ExternalLinks { results, .. } => {
            insert_link_results(conn, audit_id, LinkScope::External, results)?;
        }
        // The report is stored on the audit row itself
        StageOutput::Report(_) => {}
    }
    Ok(())
}

impl Storage for SqliteStorage {
    // ===== Audit Jobs =====

    fn create_audit(&mut self, audit: &NewAudit) -> StorageResult<(i64, StageTask)> {
        let now = now_timestamp();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO audits (url, max_pages, status, created_at, updated_at, user_id,
             correlation_id, config_hash)
             VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6, ?7)",
            params![
                audit.url,
                audit.max_pages,
                AuditStatus::Pending.to_db_string(),
                now,
                audit.user_id,
                audit.correlation_id,
                audit.config_hash
            ],
        )?;
        let audit_id = tx.last_insert_rowid();
        let task = insert_task(&tx, audit_id, Stage::Crawl, 0, &now)?;
        tx.commit()?;
        Ok((audit_id, task))
    }

    fn get_audit(&self, audit_id: i64) -> StorageResult<Option<AuditJob>> {
        let audit = self
            .conn
            .query_row(
                &format!("SELECT {} FROM audits WHERE id = ?1", AUDIT_COLUMNS),
                params![audit_id],
                read_audit,
            )
            .optional()?;
        Ok(audit)
    }

    fn list_recent_audits(&self, limit: usize) -> StorageResult<Vec<AuditJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM audits ORDER BY id DESC LIMIT ?1",
            AUDIT_COLUMNS
        ))?;
        let audits = stmt
            .query_map(params![limit as i64], read_audit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(audits)
    }

    fn list_stale_audits(&self, updated_before: &str) -> StorageResult<Vec<AuditJob>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM audits
             WHERE status NOT IN (?1, ?2) AND updated_at < ?3
             ORDER BY updated_at, id",
            AUDIT_COLUMNS
        ))?;
        let audits = stmt
            .query_map(
                params![
                    AuditStatus::Complete.to_db_string(),
                    AuditStatus::Failed.to_db_string(),
                    updated_before
                ],
                read_audit,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(audits)
    }

    // ===== Status Transitions =====

    fn transition(
        &mut self,
        audit_id: i64,
        from: AuditStatus,
        to: AuditStatus,
    ) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE audits SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
            params![
                to.to_db_string(),
                now_timestamp(),
                audit_id,
                from.to_db_string()
            ],
        )?;
        Ok(changed > 0)
    }

    fn commit_stage(
        &mut self,
        audit_id: i64,
        output: &StageOutput,
        finished_task: Option<&str>,
    ) -> StorageResult<bool> {
        let stage = output.stage();
        let from = stage.status();
        let to = stage.completed_status();
        let now = now_timestamp();

        let tx = self.conn.transaction()?;

        let changed = match output {
            StageOutput::Report(report) => tx.execute(
                "UPDATE audits SET status = ?1, updated_at = ?2, completed_at = ?2, report = ?3
                 WHERE id = ?4 AND status = ?5",
                params![
                    to.to_db_string(),
                    now,
                    serde_json::to_string(report)?,
                    audit_id,
                    from.to_db_string()
                ],
            )?,
            _ => tx.execute(
                "UPDATE audits SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![to.to_db_string(), now, audit_id, from.to_db_string()],
            )?,
        };
        if changed == 0 {
            // Dropping the transaction rolls it back
            return Ok(false);
        }

        write_stage_rows(&tx, audit_id, output)?;

        tx.execute(
            "INSERT OR REPLACE INTO stage_outputs (audit_id, stage, summary, warning, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                audit_id,
                stage.to_db_string(),
                output.summary().to_string(),
                output.warning(),
                now
            ],
        )?;

        if let Some(task_id) = finished_task {
            tx.execute("DELETE FROM stage_queue WHERE task_id = ?1", params![task_id])?;
        }
        if let Some(next) = stage.next() {
            insert_task(&tx, audit_id, next, 0, &now)?;
        }

        tx.commit()?;
        Ok(true)
    }

    fn fail_audit(&mut self, audit_id: i64, failure: &FailureRecord) -> StorageResult<bool> {
        let now = now_timestamp();
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            &format!(
                "UPDATE audits SET status = ?2, updated_at = ?3, completed_at = ?3,
                 error_kind = ?4, error_message = ?5, technical_detail = {}
                 WHERE id = ?6 AND status NOT IN (?7, ?2)",
                APPEND_DETAIL
            ),
            params![
                failure.technical_detail,
                AuditStatus::Failed.to_db_string(),
                now,
                failure.kind.to_db_string(),
                failure.user_message,
                audit_id,
                AuditStatus::Complete.to_db_string()
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        tx.execute("DELETE FROM stage_queue WHERE audit_id = ?1", params![audit_id])?;
        tx.commit()?;
        Ok(true)
    }

    fn append_technical_detail(&mut self, audit_id: i64, detail: &str) -> StorageResult<()> {
        self.conn.execute(
            &format!(
                "UPDATE audits SET technical_detail = {} WHERE id = ?2",
                APPEND_DETAIL
            ),
            params![detail, audit_id],
        )?;
        Ok(())
    }

    // ===== Recovery =====

    fn requeue_if_unchanged(
        &mut self,
        audit_id: i64,
        status: AuditStatus,
        updated_at: &str,
        stage: Stage,
    ) -> StorageResult<Option<StageTask>> {
        let now = now_timestamp();
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            "UPDATE audits SET updated_at = ?1 WHERE id = ?2 AND status = ?3 AND updated_at = ?4",
            params![now, audit_id, status.to_db_string(), updated_at],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        tx.execute("DELETE FROM stage_queue WHERE audit_id = ?1", params![audit_id])?;
        let task = insert_task(&tx, audit_id, stage, 0, &now)?;
        tx.commit()?;
        Ok(Some(task))
    }

    fn fail_if_unchanged(
        &mut self,
        audit_id: i64,
        status: AuditStatus,
        updated_at: &str,
        failure: &FailureRecord,
    ) -> StorageResult<bool> {
        let now = now_timestamp();
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            &format!(
                "UPDATE audits SET status = ?2, updated_at = ?3, completed_at = ?3,
                 error_kind = ?4, error_message = ?5, technical_detail = {}
                 WHERE id = ?6 AND status = ?7 AND updated_at = ?8",
                APPEND_DETAIL
            ),
            params![
                failure.technical_detail,
                AuditStatus::Failed.to_db_string(),
                now,
                failure.kind.to_db_string(),
                failure.user_message,
                audit_id,
                status.to_db_string(),
                updated_at
            ],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        tx.execute("DELETE FROM stage_queue WHERE audit_id = ?1", params![audit_id])?;
        tx.commit()?;
        Ok(true)
    }

    // ===== Stage Outputs =====

    fn load_stage_summary(
        &self,
        audit_id: i64,
        stage: Stage,
    ) -> StorageResult<Option<StageSummary>> {
        let summary = self
            .conn
            .query_row(
                "SELECT summary, warning, completed_at FROM stage_outputs
                 WHERE audit_id = ?1 AND stage = ?2",
                params![audit_id, stage.to_db_string()],
                |row| {
                    let summary: String = row.get(0)?;
                    Ok(StageSummary {
                        stage,
                        summary: serde_json::from_str(&summary).map_err(|e| json_error(0, e))?,
                        warning: row.get(1)?,
                        completed_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(summary)
    }

    fn load_crawl_pages(&self, audit_id: i64) -> StorageResult<Vec<PageExport>> {
        let mut stmt = self
            .conn
            .prepare("SELECT export FROM crawl_pages WHERE audit_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![audit_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut pages = Vec::with_capacity(rows.len());
        for json in rows {
            pages.push(serde_json::from_str(&json)?);
        }
        Ok(pages)
    }

    fn load_page_records(&self, audit_id: i64) -> StorageResult<Vec<PageRecord>> {
        let mut stmt = self
            .conn
            .prepare("SELECT record FROM page_records WHERE audit_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![audit_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut records = Vec::with_capacity(rows.len());
        for json in rows {
            records.push(serde_json::from_str(&json)?);
        }
        Ok(records)
    }

    fn load_link_results(
        &self,
        audit_id: i64,
        scope: LinkScope,
    ) -> StorageResult<Vec<LinkCheckResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT url, source_page, outcome, category, suppressed FROM link_results
             WHERE audit_id = ?1 AND scope = ?2 ORDER BY id",
        )?;
        let results = stmt
            .query_map(params![audit_id, scope.to_db_string()], |row| {
                let outcome: String = row.get(2)?;
                let category: String = row.get(3)?;
                Ok(LinkCheckResult {
                    url: row.get(0)?,
                    source_page: row.get(1)?,
                    scope,
                    outcome: RawOutcome::from_db_string(&outcome)
                        .ok_or_else(|| conversion_error(2, &outcome))?,
                    category: LinkCategory::from_db_string(&category)
                        .ok_or_else(|| conversion_error(3, &category))?,
                    suppressed: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(results)
    }

    // ===== Stage Queue =====

    fn enqueue_stage(
        &mut self,
        audit_id: i64,
        stage: Stage,
        attempt: u32,
        available_at: &str,
    ) -> StorageResult<StageTask> {
        insert_task(&self.conn, audit_id, stage, attempt, available_at)
    }

    fn claim_next_task(&mut self, now: &str) -> StorageResult<Option<StageTask>> {
        let tx = self.conn.transaction()?;
        let candidate = tx
            .query_row(
                &format!(
                    "SELECT {} FROM stage_queue q
                     WHERE q.claimed_at IS NULL AND q.available_at <= ?1
                       AND NOT EXISTS (
                           SELECT 1 FROM stage_queue c
                           WHERE c.audit_id = q.audit_id AND c.claimed_at IS NOT NULL
                       )
                     ORDER BY q.available_at, q.enqueued_at
                     LIMIT 1",
                    TASK_COLUMNS
                ),
                params![now],
                read_task,
            )
            .optional()?;

        let Some(mut task) = candidate else {
            return Ok(None);
        };
        tx.execute(
            "UPDATE stage_queue SET claimed_at = ?1 WHERE task_id = ?2",
            params![now, task.task_id],
        )?;
        tx.commit()?;

        task.claimed_at = Some(now.to_string());
        Ok(Some(task))
    }

    fn retry_task(&mut self, task: &StageTask, available_at: &str) -> StorageResult<StageTask> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM stage_queue WHERE task_id = ?1",
            params![task.task_id],
        )?;
        let next = insert_task(&tx, task.audit_id, task.stage, task.attempt + 1, available_at)?;
        tx.commit()?;
        Ok(next)
    }

    fn complete_task(&mut self, task_id: &str) -> StorageResult<()> {
        self.conn
            .execute("DELETE FROM stage_queue WHERE task_id = ?1", params![task_id])?;
        Ok(())
    }

    fn active_claim(&self, audit_id: i64) -> StorageResult<Option<StageTask>> {
        let task = self
            .conn
            .query_row(
                &format!(
                    "SELECT {} FROM stage_queue
                     WHERE audit_id = ?1 AND claimed_at IS NOT NULL
                     ORDER BY claimed_at DESC
                     LIMIT 1",
                    TASK_COLUMNS
                ),
                params![audit_id],
                read_task,
            )
            .optional()?;
        Ok(task)
    }

    fn count_queued_tasks(&self) -> StorageResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM stage_queue WHERE claimed_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::{ExternalMeta, LinkTarget};
    use crate::output::InternalMeta;
    use crate::storage::{timestamp, FailureRecord};
    use chrono::{Duration, Utc};

    fn new_audit() -> NewAudit {
        NewAudit {
            url: "https://site.example/".to_string(),
            max_pages: 20,
            user_id: Some("user-1".to_string()),
            correlation_id: Some("corr-1".to_string()),
            config_hash: "abc123".to_string(),
        }
    }

    fn later() -> String {
        timestamp(Utc::now() + Duration::seconds(5))
    }

    fn failure() -> FailureRecord {
        FailureRecord::new(
            FailureKind::Crawl,
            "We could not reach this website.",
            "Crawl failed: dns error",
        )
    }

    #[test]
    fn test_create_in_memory() {
        let storage = SqliteStorage::new_in_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_create_audit_queues_crawl() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, task) = storage.create_audit(&new_audit()).unwrap();

        let audit = storage.get_audit(audit_id).unwrap().unwrap();
        assert_eq!(audit.status, AuditStatus::Pending);
        assert_eq!(audit.correlation_id.as_deref(), Some("corr-1"));
        assert_eq!(audit.created_at, audit.updated_at);
        assert_eq!(task.stage, Stage::Crawl);
        assert_eq!(task.attempt, 0);
        assert_eq!(storage.count_queued_tasks().unwrap(), 1);
    }

    #[test]
    fn test_missing_audit() {
        let storage = SqliteStorage::new_in_memory().unwrap();
        assert!(storage.get_audit(42).unwrap().is_none());
    }

    #[test]
    fn test_transition_requires_expected_status() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();

        assert!(storage
            .transition(audit_id, AuditStatus::Pending, AuditStatus::Crawling)
            .unwrap());
        assert!(!storage
            .transition(audit_id, AuditStatus::Pending, AuditStatus::Crawling)
            .unwrap());
        assert_eq!(
            storage.get_audit(audit_id).unwrap().unwrap().status,
            AuditStatus::Crawling
        );
    }

    #[test]
    fn test_commit_stage_writes_output_and_queues_next() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();
        let task = storage.claim_next_task(&later()).unwrap().unwrap();
        storage
            .transition(audit_id, AuditStatus::Pending, AuditStatus::Crawling)
            .unwrap();

        let pages = vec![
            PageExport::error_page("https://site.example/", 200, 0),
            PageExport::error_page("https://site.example/gone", 404, 1),
        ];
        let committed = storage
            .commit_stage(audit_id, &StageOutput::Crawl(pages.clone()), Some(&task.task_id))
            .unwrap();

        assert!(committed);
        assert_eq!(
            storage.get_audit(audit_id).unwrap().unwrap().status,
            AuditStatus::Analyzing
        );
        assert_eq!(storage.load_crawl_pages(audit_id).unwrap(), pages);
        let summary = storage
            .load_stage_summary(audit_id, Stage::Crawl)
            .unwrap()
            .unwrap();
        assert_eq!(summary.summary["ok_pages"], 1);

        let next = storage.claim_next_task(&later()).unwrap().unwrap();
        assert_eq!(next.stage, Stage::Analyze);
        assert_ne!(next.task_id, task.task_id);
    }

    #[test]
    fn test_commit_stage_is_noop_for_wrong_status() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();

        // Still PENDING, so an analysis commit must not land
        let committed = storage
            .commit_stage(audit_id, &StageOutput::Analysis(Vec::new()), None)
            .unwrap();

        assert!(!committed);
        assert!(storage
            .load_stage_summary(audit_id, Stage::Analyze)
            .unwrap()
            .is_none());
        assert_eq!(
            storage.get_audit(audit_id).unwrap().unwrap().status,
            AuditStatus::Pending
        );
    }

    #[test]
    fn test_link_results_roundtrip_per_scope() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();
        storage
            .transition(audit_id, AuditStatus::Pending, AuditStatus::CheckingInternalLinks)
            .unwrap();

        let target = LinkTarget::new("https://site.example/missing", "https://site.example/");
        let internal = vec![LinkCheckResult::new(
            &target,
            LinkScope::Internal,
            RawOutcome::Status(404),
        )];
        storage
            .commit_stage(
                audit_id,
                &StageOutput::InternalLinks {
                    results: internal.clone(),
                    meta: InternalMeta { checked: 1, truncated: 0 },
                },
                None,
            )
            .unwrap();

        let external_target = LinkTarget::new("https://login.other.example/", "https://site.example/");
        let mut external = vec![LinkCheckResult::new(
            &external_target,
            LinkScope::External,
            RawOutcome::Status(403),
        )];
        external[0].suppressed = Some("authentication host".to_string());
        storage
            .commit_stage(
                audit_id,
                &StageOutput::ExternalLinks {
                    results: external.clone(),
                    meta: ExternalMeta::default(),
                    warning: Some("no chunks".to_string()),
                },
                None,
            )
            .unwrap();

        assert_eq!(
            storage.load_link_results(audit_id, LinkScope::Internal).unwrap(),
            internal
        );
        assert_eq!(
            storage.load_link_results(audit_id, LinkScope::External).unwrap(),
            external
        );
        let summary = storage
            .load_stage_summary(audit_id, Stage::ExternalLinks)
            .unwrap()
            .unwrap();
        assert_eq!(summary.warning.as_deref(), Some("no chunks"));
    }

    #[test]
    fn test_fail_audit_only_when_not_terminal() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();

        assert!(storage.fail_audit(audit_id, &failure()).unwrap());
        let failed = storage.get_audit(audit_id).unwrap().unwrap();
        assert_eq!(failed.status, AuditStatus::Failed);
        assert_eq!(failed.error_kind, Some(FailureKind::Crawl));
        assert!(failed.completed_at.is_some());
        assert_eq!(storage.count_queued_tasks().unwrap(), 0);

        let second = FailureRecord::new(FailureKind::Internal, "other", "other detail");
        assert!(!storage.fail_audit(audit_id, &second).unwrap());
        let unchanged = storage.get_audit(audit_id).unwrap().unwrap();
        assert_eq!(unchanged.error_kind, Some(FailureKind::Crawl));
    }

    #[test]
    fn test_append_technical_detail_on_terminal_audit() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();
        storage.fail_audit(audit_id, &failure()).unwrap();
        let before = storage.get_audit(audit_id).unwrap().unwrap();

        storage
            .append_technical_detail(audit_id, "late callback failure")
            .unwrap();

        let after = storage.get_audit(audit_id).unwrap().unwrap();
        assert_eq!(
            after.technical_detail.as_deref(),
            Some("Crawl failed: dns error\nlate callback failure")
        );
        assert_eq!(after.status, AuditStatus::Failed);
        assert_eq!(after.updated_at, before.updated_at);
    }

    #[test]
    fn test_requeue_if_unchanged_checks_timestamp() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();
        storage.claim_next_task(&later()).unwrap().unwrap();
        storage
            .set_updated_at(audit_id, "2026-01-01T00:00:00.000000Z")
            .unwrap();

        let stale = storage
            .requeue_if_unchanged(
                audit_id,
                AuditStatus::Pending,
                "2025-12-31T00:00:00.000000Z",
                Stage::Crawl,
            )
            .unwrap();
        assert!(stale.is_none());

        let requeued = storage
            .requeue_if_unchanged(
                audit_id,
                AuditStatus::Pending,
                "2026-01-01T00:00:00.000000Z",
                Stage::Crawl,
            )
            .unwrap()
            .unwrap();
        assert_eq!(requeued.stage, Stage::Crawl);
        assert!(requeued.claimed_at.is_none());

        // The abandoned claim was dropped, so the new task is claimable
        let claimed = storage.claim_next_task(&later()).unwrap().unwrap();
        assert_eq!(claimed.task_id, requeued.task_id);
    }

    #[test]
    fn test_fail_if_unchanged() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();
        let audit = storage.get_audit(audit_id).unwrap().unwrap();

        assert!(!storage
            .fail_if_unchanged(audit_id, AuditStatus::Crawling, &audit.updated_at, &failure())
            .unwrap());
        assert!(storage
            .fail_if_unchanged(audit_id, AuditStatus::Pending, &audit.updated_at, &failure())
            .unwrap());
        assert_eq!(
            storage.get_audit(audit_id).unwrap().unwrap().status,
            AuditStatus::Failed
        );
    }

    #[test]
    fn test_enqueue_deduplicates_unclaimed() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, first) = storage.create_audit(&new_audit()).unwrap();

        let again = storage
            .enqueue_stage(audit_id, Stage::Crawl, 0, &now_timestamp())
            .unwrap();

        assert_eq!(again.task_id, first.task_id);
        assert_eq!(storage.count_queued_tasks().unwrap(), 1);
    }

    #[test]
    fn test_claim_skips_audit_with_claimed_task() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, _) = storage.create_audit(&new_audit()).unwrap();
        storage.claim_next_task(&later()).unwrap().unwrap();
        storage
            .enqueue_stage(audit_id, Stage::Analyze, 0, &now_timestamp())
            .unwrap();

        assert!(storage.claim_next_task(&later()).unwrap().is_none());

        let (other_id, _) = storage.create_audit(&new_audit()).unwrap();
        let claimed = storage.claim_next_task(&later()).unwrap().unwrap();
        assert_eq!(claimed.audit_id, other_id);
    }

    #[test]
    fn test_active_claim_reports_claimed_task_only() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (audit_id, queued) = storage.create_audit(&new_audit()).unwrap();
        assert!(storage.active_claim(audit_id).unwrap().is_none());

        let claim_time = later();
        storage.claim_next_task(&claim_time).unwrap().unwrap();

        let claim = storage.active_claim(audit_id).unwrap().unwrap();
        assert_eq!(claim.task_id, queued.task_id);
        assert_eq!(claim.claimed_at.as_deref(), Some(claim_time.as_str()));

        storage.complete_task(&claim.task_id).unwrap();
        assert!(storage.active_claim(audit_id).unwrap().is_none());
    }

    #[test]
    fn test_retry_task_delays_next_attempt() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage.create_audit(&new_audit()).unwrap();
        let task = storage.claim_next_task(&later()).unwrap().unwrap();

        let available_at = timestamp(Utc::now() + Duration::seconds(60));
        let retry = storage.retry_task(&task, &available_at).unwrap();

        assert_eq!(retry.attempt, 1);
        assert_eq!(retry.stage, Stage::Crawl);
        assert!(storage.claim_next_task(&later()).unwrap().is_none());
        let claimed = storage
            .claim_next_task(&timestamp(Utc::now() + Duration::seconds(61)))
            .unwrap()
            .unwrap();
        assert_eq!(claimed.task_id, retry.task_id);
    }

    #[test]
    fn test_list_stale_excludes_terminal() {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        let (stuck, _) = storage.create_audit(&new_audit()).unwrap();
        let (done, _) = storage.create_audit(&new_audit()).unwrap();
        storage.fail_audit(done, &failure()).unwrap();
        storage
            .set_updated_at(stuck, "2026-01-01T00:00:00.000000Z")
            .unwrap();
        storage
            .set_updated_at(done, "2026-01-01T00:00:00.000000Z")
            .unwrap();

        let stale = storage
            .list_stale_audits("2026-01-01T00:15:00.000000Z")
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, stuck);

        let recent = storage.list_recent_audits(10).unwrap();
        assert_eq!(recent.iter().map(|a| a.id).collect::<Vec<_>>(), vec![done, stuck]);
    }
}
