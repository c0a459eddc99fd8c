//! Framework logger.
//!
//! Application faults and explicit `ctx.log(..)` calls go through a [`Logger`]
//! backend. [`FileLogger`] writes dated, level-partitioned files and rotates them by
//! size; [`TracingLogger`] forwards records to `tracing`. Failures to write are
//! reported through `tracing` and otherwise swallowed, so logging can never take a
//! request down.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::warn;

use crate::config::{LogHandler, LogSettings};

/// Severity, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Fault,
    Alert,
    Error,
    Warn,
    Notice,
    Info,
    Debug,
}

impl Level {
    pub const ALL: [Level; 7] = [
        Level::Fault,
        Level::Alert,
        Level::Error,
        Level::Warn,
        Level::Notice,
        Level::Info,
        Level::Debug,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Fault => "fault",
            Level::Alert => "alert",
            Level::Error => "error",
            Level::Warn => "warn",
            Level::Notice => "notice",
            Level::Info => "info",
            Level::Debug => "debug",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log backend.
pub trait Logger: Send + Sync {
    /// Write one record. `destination` names a log file instead of the default one.
    ///
    /// # Errors
    ///
    /// I/O failures of the backend.
    fn write(&self, message: &str, level: Level, destination: Option<&str>) -> io::Result<()>;
}

/// Writes `<log_path>/<yy_mm_dd>/<level>/<destination or common>.log`.
///
/// Once a file reaches `max_size` bytes it is renamed to `<unix time>-<file name>`
/// and a fresh file is started.
#[derive(Debug, Clone)]
pub struct FileLogger {
    log_path: PathBuf,
    max_size: u64,
}

impl FileLogger {
    #[must_use]
    pub fn new(log_path: impl Into<PathBuf>, max_size: u64) -> Self {
        Self {
            log_path: log_path.into(),
            max_size,
        }
    }

    /// Target file for a record written now.
    #[must_use]
    pub fn file_for(&self, level: Level, destination: Option<&str>) -> PathBuf {
        let day = chrono::Local::now().format("%y_%m_%d").to_string();
        let file = destination
            .map(sanitize_destination)
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| "common".to_string());
        self.log_path
            .join(day)
            .join(level.as_str())
            .join(format!("{file}.log"))
    }

    fn rotate_if_needed(&self, path: &Path) -> io::Result<()> {
        let Ok(meta) = fs::metadata(path) else {
            return Ok(());
        };
        if meta.len() < self.max_size {
            return Ok(());
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let rotated = path.with_file_name(format!("{}-{name}", chrono::Utc::now().timestamp()));
        fs::rename(path, rotated)
    }
}

fn sanitize_destination(destination: &str) -> String {
    destination
        .trim_end_matches(".log")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

impl Logger for FileLogger {
    fn write(&self, message: &str, level: Level, destination: Option<&str>) -> io::Result<()> {
        let path = self.file_for(level, destination);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        self.rotate_if_needed(&path)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(message.as_bytes())?;
        file.write_all(b"\r\n")
    }
}

/// Forwards records to `tracing`, mapping levels onto tracing's five.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn write(&self, message: &str, level: Level, destination: Option<&str>) -> io::Result<()> {
        let destination = destination.unwrap_or("common");
        match level {
            Level::Fault | Level::Alert | Level::Error => {
                tracing::error!(level = %level, destination, "{message}");
            }
            Level::Warn => tracing::warn!(destination, "{message}"),
            Level::Notice | Level::Info => tracing::info!(level = %level, destination, "{message}"),
            Level::Debug => tracing::debug!(destination, "{message}"),
        }
        Ok(())
    }
}

/// Front end used by the application: per-level helpers, buffered records, and
/// swallowed failures.
pub struct Log {
    backend: Arc<dyn Logger>,
    buffer: Mutex<Vec<(Level, String)>>,
}

impl fmt::Debug for Log {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Log").finish_non_exhaustive()
    }
}

impl Log {
    #[must_use]
    pub fn new(backend: Arc<dyn Logger>) -> Self {
        Self {
            backend,
            buffer: Mutex::new(Vec::new()),
        }
    }

    /// Backend chosen by `log.handler`.
    #[must_use]
    pub fn from_settings(settings: &LogSettings) -> Self {
        let backend: Arc<dyn Logger> = match settings.handler {
            LogHandler::File => Arc::new(FileLogger::new(
                settings.log_path.clone(),
                settings.log_file_size,
            )),
            LogHandler::Tracing => Arc::new(TracingLogger),
        };
        Self::new(backend)
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Logger> {
        &self.backend
    }

    /// Write now; failures are reported through `tracing` and dropped.
    pub fn write(&self, message: &str, level: Level, destination: Option<&str>) {
        if let Err(err) = self.backend.write(message, level, destination) {
            warn!(error = %err, level = %level, "Failed to write log record");
        }
    }

    pub fn fault(&self, message: &str, destination: Option<&str>) {
        self.write(message, Level::Fault, destination);
    }

    pub fn alert(&self, message: &str, destination: Option<&str>) {
        self.write(message, Level::Alert, destination);
    }

    pub fn error(&self, message: &str, destination: Option<&str>) {
        self.write(message, Level::Error, destination);
    }

    pub fn warn(&self, message: &str, destination: Option<&str>) {
        self.write(message, Level::Warn, destination);
    }

    pub fn notice(&self, message: &str, destination: Option<&str>) {
        self.write(message, Level::Notice, destination);
    }

    pub fn info(&self, message: &str, destination: Option<&str>) {
        self.write(message, Level::Info, destination);
    }

    pub fn debug(&self, message: &str, destination: Option<&str>) {
        self.write(message, Level::Debug, destination);
    }

    /// Buffer a record until [`save`](Self::save).
    pub fn record(&self, message: &str, level: Level) {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }

    /// Flush buffered records, one backend write per level.
    pub fn save(&self, destination: Option<&str>) {
        let records = std::mem::take(
            &mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for level in Level::ALL {
            let lines: Vec<&str> = records
                .iter()
                .filter(|(l, _)| *l == level)
                .map(|(_, m)| m.as_str())
                .collect();
            if !lines.is_empty() {
                self.write(&lines.join("\r\n"), level, destination);
            }
        }
    }

    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Capture(Mutex<Vec<(Level, String)>>);

    impl Logger for Capture {
        fn write(&self, message: &str, level: Level, _d: Option<&str>) -> io::Result<()> {
            self.0.lock().unwrap().push((level, message.to_string()));
            Ok(())
        }
    }

    struct Broken;

    impl Logger for Broken {
        fn write(&self, _m: &str, _l: Level, _d: Option<&str>) -> io::Result<()> {
            Err(io::Error::other("disk full"))
        }
    }

    #[test]
    fn test_levels_order_and_names() {
        assert!(Level::Fault < Level::Debug);
        assert_eq!(Level::Notice.to_string(), "notice");
    }

    #[test]
    fn test_record_then_save_groups_by_level() {
        let capture = Arc::new(Capture::default());
        let backend: Arc<dyn Logger> = capture.clone();
        let log = Log::new(backend);
        log.record("a", Level::Info);
        log.record("b", Level::Error);
        log.record("c", Level::Info);
        assert_eq!(log.buffered(), 3);
        log.save(None);
        let written = capture.0.lock().unwrap().clone();
        assert_eq!(
            written,
            vec![
                (Level::Error, "b".to_string()),
                (Level::Info, "a\r\nc".to_string())
            ]
        );
        assert_eq!(log.buffered(), 0);
    }

    #[test]
    fn test_write_failures_are_swallowed() {
        let log = Log::new(Arc::new(Broken));
        log.error("ignored", None);
    }

    #[test]
    fn test_destination_is_sanitized() {
        let logger = FileLogger::new("/var/log/app", 1024);
        let path = logger.file_for(Level::Warn, Some("../../etc/passwd"));
        assert!(path.starts_with("/var/log/app"));
        assert!(path.ends_with("warn/______etc_passwd.log"));
    }
}
