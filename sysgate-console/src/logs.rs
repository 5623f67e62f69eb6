use anyhow::{Context, Result};
use chrono::SecondsFormat;
use clap::Subcommand;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::info;

use sysgate_common::SysgateConfig;
use sysgate_logstore::{export, ExportFormat, LogEntry, LogFilter, LogStore, Severity};

#[derive(Subcommand, Debug)]
pub enum LogsCommand {
    /// Newest entries first
    List {
        /// INFO, WARN, ERROR or DEBUG
        #[arg(long)]
        severity: Option<Severity>,

        /// Case-insensitive text to look for in any field
        #[arg(long)]
        search: Option<String>,

        #[arg(long)]
        limit: Option<usize>,

        /// Print entries as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Delete every entry
    Clear,
    /// Write every entry as CSV or JSON
    Export {
        #[arg(long)]
        format: ExportFormat,

        /// Destination file (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

pub fn run(cfg: &SysgateConfig, command: LogsCommand) -> Result<()> {
    let store = LogStore::open(&cfg.logs.path)
        .with_context(|| format!("open log store {}", cfg.logs.path.display()))?;

    match command {
        LogsCommand::List {
            severity,
            search,
            limit,
            json,
        } => {
            let filter = LogFilter {
                severity,
                search,
                limit,
            };
            let entries = store.query_recent(&filter).context("query log store")?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            if json {
                serde_json::to_writer_pretty(&mut out, &entries)?;
                writeln!(out)?;
            } else {
                for entry in &entries {
                    writeln!(out, "{}", format_line(entry))?;
                }
            }
            info!("{} log entries", entries.len());
        }
        LogsCommand::Clear => {
            let removed = store.clear().context("clear log store")?;
            println!("Removed {removed} log entries");
        }
        LogsCommand::Export { format, output } => {
            let entries = store
                .query_recent(&LogFilter::default())
                .context("query log store")?;
            match output {
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("create {}", path.display()))?;
                    export(format, &entries, BufWriter::new(file))?;
                    info!("Exported {} entries to {}", entries.len(), path.display());
                }
                None => export(format, &entries, io::stdout().lock())?,
            }
        }
    }
    Ok(())
}

fn format_line(entry: &LogEntry) -> String {
    format!(
        "{}  {:<5}  {:<26}  {}",
        entry.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        entry.severity.as_str(),
        entry.action,
        entry.message
    )
}
