//! Append-only audit log for analysis runs
//!
//! The audit log belongs to whoever runs the analysis; the coordinator only
//! appends to it. Every entry is mirrored to `tracing` at the matching level.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        })
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub details: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            details: Map::new(),
            timestamp: Utc::now(),
        }
    }

    /// Attach a detail value.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Sink for audit entries.
pub trait AuditLog {
    fn append(&mut self, entry: LogEntry);

    fn info(&mut self, message: &str) {
        self.record(LogEntry::new(LogLevel::Info, message));
    }

    fn warning(&mut self, message: &str) {
        self.record(LogEntry::new(LogLevel::Warning, message));
    }

    fn error(&mut self, message: &str) {
        self.record(LogEntry::new(LogLevel::Error, message));
    }

    /// Mirror `entry` to tracing, then append it.
    fn record(&mut self, entry: LogEntry) {
        let details = Value::Object(entry.details.clone());
        match entry.level {
            LogLevel::Info => tracing::info!(%details, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(%details, "{}", entry.message),
            LogLevel::Error | LogLevel::Critical => tracing::error!(%details, "{}", entry.message),
        }
        self.append(entry);
    }
}

/// Audit log kept in memory, in append order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryAuditLog {
    entries: Vec<LogEntry>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries at `level`.
    pub fn at_level(&self, level: LogLevel) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.level == level)
    }

    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}

impl AuditLog for MemoryAuditLog {
    fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }
}

/// Discards entries after mirroring them to tracing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditLog;

impl AuditLog for TracingAuditLog {
    fn append(&mut self, _entry: LogEntry) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_keeps_order() {
        let mut log = MemoryAuditLog::new();
        log.info("Analysis started");
        log.warning("Unknown analysis type: foo");
        log.record(LogEntry::new(LogLevel::Error, "failed").with("tile", 3));

        assert_eq!(log.len(), 3);
        let messages: Vec<_> = log.entries().iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["Analysis started", "Unknown analysis type: foo", "failed"]);
        assert_eq!(log.entries()[2].details["tile"], 3);
        assert_eq!(log.at_level(LogLevel::Warning).count(), 1);
        assert!(log.entries()[0].timestamp <= log.entries()[2].timestamp);
    }

    #[test]
    fn test_entry_json() {
        let entry = LogEntry::new(LogLevel::Warning, "x").with("detector", "fire");
        let v = serde_json::to_value(&entry).unwrap();
        assert_eq!(v["level"], "warning");
        assert_eq!(v["details"]["detector"], "fire");
    }
}
