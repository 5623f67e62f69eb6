//! SQLite-backed activity log.
//!
//! Append-only: rows are inserted and read, never updated. The only delete
//! is the operator-triggered [`LogStore::clear`].

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::entry::{LogEntry, LogFilter, NewLogEntry, Severity};
use crate::LogStoreError;

const SCHEMA_SQL: &str = include_str!("schema.sql");

const SELECT_RECENT: &str = "SELECT id, type, action, message, request, payload, response, meta, created_at
     FROM logs
     WHERE (?1 IS NULL OR type = ?1)
       AND (?2 IS NULL
            OR instr(lower(type), ?2) > 0
            OR instr(lower(action), ?2) > 0
            OR instr(lower(message), ?2) > 0
            OR instr(lower(coalesce(request, '')), ?2) > 0
            OR instr(lower(coalesce(payload, '')), ?2) > 0
            OR instr(lower(coalesce(response, '')), ?2) > 0
            OR instr(lower(coalesce(meta, '')), ?2) > 0)
     ORDER BY created_at DESC, id DESC
     LIMIT ?3";

pub struct LogStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl LogStore {
    /// Opens (or creates) the store file and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        debug!("Opened log store at {}", path.display());

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self, LogStoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Appends one entry and returns its id.
    pub fn append(&self, entry: &NewLogEntry) -> Result<i64, LogStoreError> {
        self.conn.execute(
            "INSERT INTO logs (type, action, message, request, payload, response, meta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.severity.as_str(),
                entry.action,
                entry.message,
                entry.request,
                entry.payload,
                entry.response,
                entry.meta,
                format_ts(&entry.created_at),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Newest-first listing, narrowed by `filter`.
    pub fn query_recent(&self, filter: &LogFilter) -> Result<Vec<LogEntry>, LogStoreError> {
        let severity = filter.severity.map(|s| s.as_str());
        let needle = filter.needle();
        let limit = filter
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX))
            .unwrap_or(-1);

        let mut stmt = self.conn.prepare(SELECT_RECENT)?;
        let entries = stmt
            .query_map(params![severity, needle, limit], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Deletes every entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, LogStoreError> {
        let removed = self.conn.execute("DELETE FROM logs", [])?;
        debug!("Cleared {} log entries", removed);
        Ok(removed)
    }

    pub fn count(&self) -> Result<u64, LogStoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

// Fixed-width UTC text keeps lexical order equal to time order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let raw_type: String = row.get(1)?;
    let severity = raw_type
        .parse::<Severity>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(err)))?;

    let raw_ts: String = row.get(8)?;
    let created_at = DateTime::parse_from_rfc3339(&raw_ts)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(8, Type::Text, Box::new(err)))?;

    Ok(LogEntry {
        id: row.get(0)?,
        severity,
        action: row.get(2)?,
        message: row.get(3)?,
        request: row.get(4)?,
        payload: row.get(5)?,
        response: row.get(6)?,
        meta: row.get(7)?,
        created_at,
    })
}
