//! Pipeline log events and the observers that receive them.
//!
//! The interpreter never prints. It hands [`LogEntry`] values to whatever
//! [`Observer`] it was built with: [`TracingObserver`] forwards them to
//! `tracing`, [`MemoryObserver`] keeps them for later inspection.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// Log level of a pipeline event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A single log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Log message
    pub message: String,
    /// Nesting depth (jobs at 0, operators at 1)
    #[serde(default)]
    pub indent: u8,
}

impl LogEntry {
    pub fn info(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Info, message: message.into(), indent: 0 }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Success, message: message.into(), indent: 0 }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Warning, message: message.into(), indent: 0 }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { level: LogLevel::Error, message: message.into(), indent: 0 }
    }

    pub fn with_indent(mut self, indent: u8) -> Self {
        self.indent = indent;
        self
    }
}

/// Receives the events of a pipeline run.
pub trait Observer: Send + Sync {
    /// Handle one entry
    fn log(&self, entry: LogEntry);

    fn info(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.log(LogEntry::info(message));
    }

    fn success(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.log(LogEntry::success(message));
    }

    fn warning(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.log(LogEntry::warning(message));
    }

    fn error(&self, message: impl Into<String>)
    where
        Self: Sized,
    {
        self.log(LogEntry::error(message));
    }
}

/// Forwards entries to the `tracing` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn log(&self, entry: LogEntry) {
        let indent = "  ".repeat(entry.indent as usize);
        match entry.level {
            LogLevel::Info => tracing::info!("{}{}", indent, entry.message),
            LogLevel::Success => tracing::info!("{}✓ {}", indent, entry.message),
            LogLevel::Warning => tracing::warn!("{}{}", indent, entry.message),
            LogLevel::Error => tracing::error!("{}{}", indent, entry.message),
        }
    }
}

/// Keeps every entry in memory.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the entries logged so far
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries at the given level
    pub fn at_level(&self, level: LogLevel) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.level == level)
            .collect()
    }
}

impl Observer for MemoryObserver {
    fn log(&self, entry: LogEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_observer_collects() {
        let observer = MemoryObserver::new();
        observer.info("loading");
        observer.warning("unknown key");
        observer.log(LogEntry::success("done").with_indent(1));

        let entries = observer.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].indent, 1);
        assert_eq!(observer.at_level(LogLevel::Warning).len(), 1);
    }

    #[test]
    fn test_entry_serializes_lowercase_level() {
        let json = serde_json::to_value(LogEntry::warning("x")).unwrap();
        assert_eq!(json["level"], "warning");
        assert_eq!(json["indent"], 0);
    }
}
