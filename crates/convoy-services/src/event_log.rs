//! Persistent event log — append-only timestamped log sink.
//!
//! Separate from the tracing diagnostics: this is the server's durable
//! audit record, one line per event:
//!
//!   [2026-08-23 14:03:11] [Dispatcher] [INFO] client 3 logged in
//!
//! Logging is fire-and-forget. A failed write is reported through tracing
//! and never surfaces to the routing path.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

/// Severity of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

#[derive(Clone)]
pub struct EventLog {
    file: Arc<Mutex<File>>,
}

impl EventLog {
    /// Open (or create) the log file in append mode. Failure here is fatal
    /// to the caller — a server that cannot record events must not start
    /// silently without them.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open event log {}", path.display()))?;
        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    /// Append one event line. Never blocks routing on failure.
    pub fn log_event(&self, component: &str, level: LogLevel, message: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{timestamp}] [{component}] [{}] {message}\n", level.as_str());

        let mut file = match self.file.lock() {
            Ok(f) => f,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = file.write_all(line.as_bytes()) {
            tracing::warn!(error = %e, component, "event log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_carry_timestamp_component_and_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.log");
        let log = EventLog::open(&path).unwrap();

        log.log_event("Dispatcher", LogLevel::Info, "client 3 logged in");
        log.log_event("Transport", LogLevel::Warning, "send to unknown client 9");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        assert!(lines[0].contains("[Dispatcher] [INFO] client 3 logged in"));
        assert!(lines[1].contains("[Transport] [WARNING] send to unknown client 9"));
        // Timestamp prefix: "[YYYY-MM-DD HH:MM:SS] "
        assert!(lines[0].starts_with('['));
        assert_eq!(lines[0].as_bytes()[11], b' ');
        assert_eq!(&lines[0][20..22], "] ");
    }

    #[test]
    fn appends_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("system.log");

        EventLog::open(&path)
            .unwrap()
            .log_event("A", LogLevel::Info, "first");
        EventLog::open(&path)
            .unwrap()
            .log_event("B", LogLevel::Error, "second");

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("[A] [INFO] first"));
        assert!(text.contains("[B] [ERROR] second"));
    }

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("logs").join("system.log");
        let log = EventLog::open(&path).unwrap();
        log.log_event("Init", LogLevel::Info, "started");
        assert!(path.exists());
    }
}
