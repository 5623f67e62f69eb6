use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Debug,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown severity '{0}' (expected INFO, WARN, ERROR or DEBUG)")]
pub struct ParseSeverityError(String);

impl FromStr for Severity {
    type Err = ParseSeverityError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "WARN" | "WARNING" => Ok(Severity::Warn),
            "ERROR" => Ok(Severity::Error),
            "DEBUG" => Ok(Severity::Debug),
            _ => Err(ParseSeverityError(raw.to_string())),
        }
    }
}

/// Freezes a value as JSON text. Falls back to the `Debug` rendering when
/// the value cannot be serialized, so recording never fails.
pub fn snapshot<T>(value: &T) -> String
where
    T: Serialize + fmt::Debug + ?Sized,
{
    serde_json::to_string(value).unwrap_or_else(|_| format!("{:?}", value))
}

/// An entry waiting to be appended. Nested context is already serialized.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLogEntry {
    pub severity: Severity,
    pub action: String,
    pub message: String,
    pub request: Option<String>,
    pub payload: Option<String>,
    pub response: Option<String>,
    pub meta: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewLogEntry {
    pub fn new(severity: Severity, action: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            action: action.into(),
            message: message.into(),
            request: None,
            payload: None,
            response: None,
            meta: None,
            created_at: Utc::now(),
        }
    }

    pub fn info(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, action, message)
    }

    pub fn warn(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warn, action, message)
    }

    pub fn error(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, action, message)
    }

    pub fn debug(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Debug, action, message)
    }

    pub fn with_request<T: Serialize + fmt::Debug + ?Sized>(mut self, value: &T) -> Self {
        self.request = Some(snapshot(value));
        self
    }

    pub fn with_payload<T: Serialize + fmt::Debug + ?Sized>(mut self, value: &T) -> Self {
        self.payload = Some(snapshot(value));
        self
    }

    pub fn with_response<T: Serialize + fmt::Debug + ?Sized>(mut self, value: &T) -> Self {
        self.response = Some(snapshot(value));
        self
    }

    pub fn with_meta<T: Serialize + fmt::Debug + ?Sized>(mut self, value: &T) -> Self {
        self.meta = Some(snapshot(value));
        self
    }
}

/// A persisted entry. Field order is the export column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub severity: Severity,
    pub action: String,
    pub message: String,
    pub request: Option<String>,
    pub payload: Option<String>,
    pub response: Option<String>,
    pub meta: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Log viewer query. An empty filter returns everything, newest first.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub severity: Option<Severity>,
    /// Substring over type, action, message and the serialized
    /// request/payload/response/meta blobs. Matching ignores ASCII case
    /// only, the same folding SQLite's `lower()` applies.
    pub search: Option<String>,
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn needle(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn severity_parses_loosely() {
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!(" error ".parse::<Severity>().unwrap(), Severity::Error);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn snapshot_falls_back_to_debug() {
        let mut unkeyable: HashMap<(u8, u8), u8> = HashMap::new();
        unkeyable.insert((1, 2), 3);

        let text = snapshot(&unkeyable);
        assert!(serde_json::from_str::<serde_json::Value>(&text).is_err());
        assert!(text.contains("(1, 2)"));
    }

    #[test]
    fn builder_freezes_nested_values() {
        let mut payload = serde_json::json!({ "gate": "GATE-1" });
        let entry = NewLogEntry::info("ws.message", "received").with_payload(&payload);
        payload["gate"] = serde_json::json!("GATE-2");

        assert_eq!(entry.payload.as_deref(), Some(r#"{"gate":"GATE-1"}"#));
        assert!(entry.request.is_none());
    }

    #[test]
    fn blank_search_is_ignored() {
        assert!(LogFilter::default().with_search("   ").needle().is_none());
        assert_eq!(
            LogFilter::default().with_search("Gate").needle().as_deref(),
            Some("gate")
        );
    }
}
