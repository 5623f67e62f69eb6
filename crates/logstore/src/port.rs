//! The logging port injected into gatekeeper components.
//!
//! `record` never returns an error and never waits on disk: a failed write
//! is reported through `tracing` and dropped.

use std::sync::Mutex;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::entry::{NewLogEntry, Severity};
use crate::store::LogStore;

pub trait ActivityLog: Send + Sync {
    fn record(&self, entry: NewLogEntry);
}

/// Forwards entries to a blocking writer task that owns the store.
///
/// The writer exits once every clone of the logger is dropped and hands the
/// store back through its join handle.
#[derive(Clone)]
pub struct BackgroundLogger {
    tx: mpsc::UnboundedSender<NewLogEntry>,
}

impl BackgroundLogger {
    /// Must be called from within a tokio runtime.
    pub fn spawn(store: LogStore) -> (Self, JoinHandle<LogStore>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<NewLogEntry>();
        let handle = tokio::task::spawn_blocking(move || {
            while let Some(entry) = rx.blocking_recv() {
                if let Err(err) = store.append(&entry) {
                    warn!("Failed to persist log entry '{}': {}", entry.action, err);
                }
            }
            store
        });
        (Self { tx }, handle)
    }
}

impl ActivityLog for BackgroundLogger {
    fn record(&self, entry: NewLogEntry) {
        if let Err(err) = self.tx.send(entry) {
            warn!("Log writer stopped, dropping entry '{}'", err.0.action);
        }
    }
}

/// In-memory port for tests and runs without a store.
#[derive(Default)]
pub struct MemoryLog {
    entries: Mutex<Vec<NewLogEntry>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<NewLogEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries()
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }
}

impl ActivityLog for MemoryLog {
    fn record(&self, entry: NewLogEntry) {
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogFilter;

    #[tokio::test(flavor = "multi_thread")]
    async fn background_logger_persists_after_drop() -> anyhow::Result<()> {
        let store = LogStore::open_in_memory()?;
        let (logger, writer) = BackgroundLogger::spawn(store);

        logger.record(NewLogEntry::info("ws.connect", "connected"));
        logger.record(NewLogEntry::error("ws.parse", "bad frame").with_payload("{not json"));
        drop(logger);

        let store = writer.await?;
        let entries = store.query_recent(&LogFilter::default())?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.iter().filter(|e| e.severity == Severity::Error).count(), 1);
        Ok(())
    }

    #[test]
    fn memory_log_counts_by_severity() {
        let log = MemoryLog::new();
        log.record(NewLogEntry::warn("a", "x"));
        log.record(NewLogEntry::warn("b", "y"));
        log.record(NewLogEntry::debug("c", "z"));

        assert_eq!(log.count(Severity::Warn), 2);
        assert_eq!(log.count(Severity::Error), 0);
        assert_eq!(log.entries().len(), 3);
    }
}
