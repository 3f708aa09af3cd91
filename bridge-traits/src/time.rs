//! Time and Logging Abstractions
//!
//! An injectable wall-clock source for message timestamps, and the sink
//! through which the core mirrors its logs into the host.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;

/// Wall-clock time source.
///
/// Used for message timestamps only. Elapsed-time measurement and timers go
/// through `tokio::time` so tests can drive them with a paused clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// ```
/// use bridge_traits::time::{Clock, ManualClock};
/// use chrono::{Duration, TimeZone, Utc};
///
/// let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
/// clock.advance(Duration::seconds(30));
/// assert_eq!(clock.now().to_rfc3339(), "2024-05-01T12:00:30+00:00");
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lowercase name, as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// One log event as delivered to a [`LoggerSink`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Emitting module, e.g. `core_protocol::client`
    pub target: String,
    pub message: String,
    pub fields: HashMap<String, String>,
    /// Name of the innermost open span, e.g. `send` or `play`
    pub span: Option<String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
            span: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

/// Forwards core logs to the host: the desktop shell's log file, a
/// diagnostics panel, or a test collector.
///
/// Field values arrive already redacted when the logging layer is configured
/// to redact.
#[async_trait::async_trait]
pub trait LoggerSink: Send + Sync {
    async fn log(&self, entry: LogEntry) -> Result<()>;

    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Minimum level this sink wants to receive.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Sink that keeps entries in memory, for diagnostics views and tests.
#[derive(Debug)]
pub struct MemoryLogger {
    min_level: LogLevel,
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryLogger {
    pub fn new(min_level: LogLevel) -> Self {
        Self {
            min_level,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Entries emitted by `target` or one of its submodules.
    pub fn entries_for(&self, target: &str) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|entry| {
                entry.target == target
                    || entry
                        .target
                        .strip_prefix(target)
                        .is_some_and(|rest| rest.starts_with("::"))
            })
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl Default for MemoryLogger {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

#[async_trait::async_trait]
impl LoggerSink for MemoryLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            self.entries.lock().push(entry);
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::milliseconds(1500));
        assert_eq!(clock.unix_timestamp_millis(), start.timestamp_millis() + 1500);

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_log_entry_fields() {
        let entry = LogEntry::new(LogLevel::Warn, "core_playback", "Chunk wait slow")
            .with_field("chunk_index", "4");

        assert_eq!(entry.field("chunk_index"), Some("4"));
        assert_eq!(entry.field("epoch"), None);
        assert_eq!(entry.span, None);
    }

    #[test]
    fn test_log_level_names_and_order() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Trace < LogLevel::Debug);
        assert_eq!(LogLevel::Warn.as_str(), "warn");
        assert_eq!(serde_json::to_string(&LogLevel::Info).unwrap(), "\"info\"");
    }

    #[tokio::test]
    async fn test_memory_logger_filters_by_level() {
        let logger = MemoryLogger::new(LogLevel::Info);
        logger
            .log(LogEntry::new(LogLevel::Debug, "core_protocol", "Ping sent"))
            .await
            .unwrap();
        logger
            .log(LogEntry::new(LogLevel::Warn, "core_protocol::client", "No pong"))
            .await
            .unwrap();
        logger
            .log(LogEntry::new(LogLevel::Info, "core_protocol_ext", "Other crate"))
            .await
            .unwrap();

        assert_eq!(logger.entries().len(), 2);
        let protocol = logger.entries_for("core_protocol");
        assert_eq!(protocol.len(), 1);
        assert_eq!(protocol[0].message, "No pong");

        logger.clear();
        assert!(logger.entries().is_empty());
    }
}
