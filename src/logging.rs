//! Session-scoped file logging.
//!
//! Modules log through a [`LogSink`] handed out by the session: a file sink
//! when `log_enabled` is set, a no-op sink otherwise. The sink is the only
//! shared resource between invocations in one process — writes are
//! serialized and each line is atomic. Credentials never reach a sink at any
//! level; callers log redacted renderings only.
//!
//! When `log_append` is false the file is overwritten on the first open per
//! process and appended by later opens, so one run starts a fresh file
//! without each module invocation wiping the last one's lines.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Default log file name, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "controller.log";

/// Severity levels, mirroring the controller option surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// All recognized spellings, for schema choices.
    pub const CHOICES: [&'static str; 5] = ["CRITICAL", "ERROR", "WARNING", "INFO", "DEBUG"];

    fn label(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARNING" => Ok(LogLevel::Warning),
            "ERROR" => Ok(LogLevel::Error),
            "CRITICAL" => Ok(LogLevel::Critical),
            other => Err(Error::Choice {
                breadcrumb: "log_level".to_string(),
                message: format!(
                    "got '{}', must be one of: {}",
                    other,
                    LogLevel::CHOICES.join(", ")
                ),
            }),
        }
    }
}

/// Destination for session log lines.
pub trait LogSink: Send + Sync {
    /// Whether a line at this level would be written.
    fn enabled(&self, level: LogLevel) -> bool;

    /// Write one line. Implementations must keep each line atomic.
    fn write(&self, level: LogLevel, message: &str);

    /// Log at DEBUG.
    fn debug(&self, message: &str) {
        if self.enabled(LogLevel::Debug) {
            self.write(LogLevel::Debug, message);
        }
    }

    /// Log at INFO.
    fn info(&self, message: &str) {
        if self.enabled(LogLevel::Info) {
            self.write(LogLevel::Info, message);
        }
    }

    /// Log at WARNING.
    fn warning(&self, message: &str) {
        if self.enabled(LogLevel::Warning) {
            self.write(LogLevel::Warning, message);
        }
    }

    /// Log at ERROR.
    fn error(&self, message: &str) {
        if self.enabled(LogLevel::Error) {
            self.write(LogLevel::Error, message);
        }
    }
}

/// Sink used when file logging is disabled.
#[derive(Debug, Default)]
pub struct NoopSink;

impl LogSink for NoopSink {
    fn enabled(&self, _level: LogLevel) -> bool {
        false
    }

    fn write(&self, _level: LogLevel, _message: &str) {}
}

// Paths already truncated by this process; later opens append.
static TRUNCATED: Lazy<Mutex<HashSet<PathBuf>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// File-backed sink.
pub struct FileLogSink {
    level: LogLevel,
    file: Mutex<File>,
}

impl FileLogSink {
    /// Open (or create) the log file.
    ///
    /// With `append` false, the first open of a given path in this process
    /// truncates; subsequent opens append.
    pub fn open(path: &Path, level: LogLevel, append: bool) -> Result<Self> {
        let truncate = if append {
            false
        } else {
            TRUNCATED.lock().insert(path.to_path_buf())
        };
        let file = OpenOptions::new()
            .create(true)
            .append(!truncate)
            .write(true)
            .truncate(truncate)
            .open(path)
            .map_err(|e| Error::Type {
                breadcrumb: "log_path".to_string(),
                message: format!("cannot open '{}': {}", path.display(), e),
            })?;
        Ok(Self {
            level,
            file: Mutex::new(file),
        })
    }
}

impl LogSink for FileLogSink {
    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    fn write(&self, level: LogLevel, message: &str) {
        let line = format!(
            "{} {} {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            level.label(),
            message
        );
        let mut file = self.file.lock();
        // A failed log write must not fail the module invocation.
        let _ = file.write_all(line.as_bytes());
        let _ = file.flush();
    }
}
