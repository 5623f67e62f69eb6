//! Log viewer download formats.

use std::io::Write;

use crate::entry::LogEntry;
use crate::LogStoreError;

/// Column order shared by both formats.
pub const EXPORT_FIELDS: [&str; 9] = [
    "id",
    "type",
    "action",
    "message",
    "request",
    "payload",
    "response",
    "meta",
    "created_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(format!("unsupported export format '{other}' (csv or json)")),
        }
    }
}

pub fn export<W: Write>(
    format: ExportFormat,
    entries: &[LogEntry],
    writer: W,
) -> Result<(), LogStoreError> {
    match format {
        ExportFormat::Csv => export_csv(entries, writer),
        ExportFormat::Json => export_json(entries, writer),
    }
}

pub fn export_json<W: Write>(entries: &[LogEntry], mut writer: W) -> Result<(), LogStoreError> {
    serde_json::to_writer_pretty(&mut writer, entries)?;
    writer.write_all(b"\n")?;
    Ok(())
}

pub fn export_csv<W: Write>(entries: &[LogEntry], writer: W) -> Result<(), LogStoreError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    if entries.is_empty() {
        csv_writer.write_record(EXPORT_FIELDS)?;
    }
    for entry in entries {
        csv_writer.serialize(entry)?;
    }
    csv_writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{LogFilter, NewLogEntry};
    use crate::store::LogStore;

    fn sample_entries() -> anyhow::Result<Vec<LogEntry>> {
        let store = LogStore::open_in_memory()?;
        store.append(
            &NewLogEntry::info("ws.decision", "approved, sent")
                .with_payload(&serde_json::json!({ "member_number": "M1" }))
                .with_meta(&serde_json::json!({ "gate": "GATE-1" })),
        )?;
        store.append(&NewLogEntry::error("ws.parse", "malformed"))?;
        Ok(store.query_recent(&LogFilter::default())?)
    }

    #[test]
    fn csv_has_all_columns() -> anyhow::Result<()> {
        let entries = sample_entries()?;
        let mut out = Vec::new();
        export_csv(&entries, &mut out)?;

        let mut reader = csv::Reader::from_reader(out.as_slice());
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        assert_eq!(headers, EXPORT_FIELDS);

        let rows: Vec<csv::StringRecord> = reader.records().collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        // newest first: the ERROR entry was appended last
        assert_eq!(&rows[0][1], "ERROR");
        assert_eq!(&rows[1][3], "approved, sent");
        assert_eq!(&rows[1][5], r#"{"member_number":"M1"}"#);
        Ok(())
    }

    #[test]
    fn empty_csv_still_has_header() -> anyhow::Result<()> {
        let mut out = Vec::new();
        export_csv(&[], &mut out)?;
        let text = String::from_utf8(out)?;
        assert_eq!(text.trim(), EXPORT_FIELDS.join(","));
        Ok(())
    }

    #[test]
    fn json_round_trips() -> anyhow::Result<()> {
        let entries = sample_entries()?;
        let mut out = Vec::new();
        export(ExportFormat::Json, &entries, &mut out)?;

        let value: serde_json::Value = serde_json::from_slice(&out)?;
        let first = &value[0];
        for field in EXPORT_FIELDS {
            assert!(first.get(field).is_some(), "missing {field}");
        }

        let parsed: Vec<LogEntry> = serde_json::from_slice(&out)?;
        assert_eq!(parsed, entries);
        Ok(())
    }
}
