use rusqlite::Connection;

use crate::error::StorageError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA cache_size = -32000;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS opportunities (
    opportunity_id BLOB PRIMARY KEY CHECK (length(opportunity_id) = 16),
    sfdc_id TEXT,
    deal_id TEXT,
    stage TEXT NOT NULL,
    source TEXT NOT NULL,
    specialist TEXT NOT NULL,
    updated_date INTEGER NOT NULL,
    record BLOB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_opps_sfdc ON opportunities (sfdc_id) WHERE sfdc_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_opps_deal ON opportunities (deal_id) WHERE deal_id IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_opps_stage ON opportunities (stage);
CREATE INDEX IF NOT EXISTS idx_opps_source ON opportunities (source);

CREATE TABLE IF NOT EXISTS audit_log (
    rowid INTEGER PRIMARY KEY,
    entry_id BLOB NOT NULL UNIQUE CHECK (length(entry_id) = 16),
    opportunity_id BLOB NOT NULL CHECK (length(opportunity_id) = 16),
    ts INTEGER NOT NULL,
    user TEXT NOT NULL,
    action TEXT NOT NULL,
    field TEXT,
    old_value BLOB,
    new_value BLOB,
    notes TEXT
);
CREATE INDEX IF NOT EXISTS idx_audit_opportunity ON audit_log (opportunity_id, rowid);

CREATE TABLE IF NOT EXISTS users (
    user_id BLOB PRIMARY KEY CHECK (length(user_id) = 16),
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    role TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    approved INTEGER NOT NULL DEFAULT 0,
    last_login INTEGER,
    login_count INTEGER NOT NULL DEFAULT 0
);
";
