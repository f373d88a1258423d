//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the audit database.

/// Current schema version, recorded in `schema_version`
pub const SCHEMA_VERSION: u32 = 1;

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Applied schema versions
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

-- Audit jobs
CREATE TABLE IF NOT EXISTS audits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    max_pages INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    completed_at TEXT,
    user_id TEXT,
    correlation_id TEXT,
    config_hash TEXT NOT NULL,
    error_kind TEXT,
    error_message TEXT,
    technical_detail TEXT,
    report TEXT
);

CREATE INDEX IF NOT EXISTS idx_audits_status_updated ON audits(status, updated_at);

-- Crawl stage output
CREATE TABLE IF NOT EXISTS crawl_pages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id INTEGER NOT NULL REFERENCES audits(id),
    url TEXT NOT NULL,
    status_code INTEGER NOT NULL,
    depth INTEGER NOT NULL,
    export TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawl_pages_audit ON crawl_pages(audit_id);

-- Page analyzer output
CREATE TABLE IF NOT EXISTS page_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id INTEGER NOT NULL REFERENCES audits(id),
    url TEXT NOT NULL,
    record TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_page_records_audit ON page_records(audit_id);

-- Internal and external link results
CREATE TABLE IF NOT EXISTS link_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id INTEGER NOT NULL REFERENCES audits(id),
    scope TEXT NOT NULL,
    url TEXT NOT NULL,
    source_page TEXT NOT NULL,
    outcome TEXT NOT NULL,
    category TEXT NOT NULL,
    suppressed TEXT
);

CREATE INDEX IF NOT EXISTS idx_link_results_audit ON link_results(audit_id, scope);

-- Per-stage completion records
CREATE TABLE IF NOT EXISTS stage_outputs (
    audit_id INTEGER NOT NULL REFERENCES audits(id),
    stage TEXT NOT NULL,
    summary TEXT NOT NULL,
    warning TEXT,
    completed_at TEXT NOT NULL,
    PRIMARY KEY (audit_id, stage)
);

-- Stage work queue
CREATE TABLE IF NOT EXISTS stage_queue (
    task_id TEXT PRIMARY KEY,
    audit_id INTEGER NOT NULL REFERENCES audits(id),
    stage TEXT NOT NULL,
    attempt INTEGER NOT NULL DEFAULT 0,
    enqueued_at TEXT NOT NULL,
    available_at TEXT NOT NULL,
    claimed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_stage_queue_available ON stage_queue(claimed_at, available_at);
CREATE INDEX IF NOT EXISTS idx_stage_queue_audit ON stage_queue(audit_id);
"#;

/// Initializes the database schema and records its version
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![SCHEMA_VERSION, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

/// Highest schema version applied to this database
pub fn get_schema_version(conn: &rusqlite::Connection) -> Result<u32, rusqlite::Error> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}
