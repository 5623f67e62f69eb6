//! SYSGATE activity log
//!
//! Local, append-only record of diagnostic events (connects, parse failures,
//! operator decisions). Components write through the [`ActivityLog`] port;
//! the log viewer reads the [`LogStore`] directly.

pub mod entry;
pub mod export;
pub mod port;
pub mod store;

pub use entry::{snapshot, LogEntry, LogFilter, NewLogEntry, Severity};
pub use export::{export, export_csv, export_json, ExportFormat, EXPORT_FIELDS};
pub use port::{ActivityLog, BackgroundLogger, MemoryLog};
pub use store::LogStore;

#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}
