//! Centralized logging for proxytray.
//!
//! Thread-safe, process-wide logger with levels and categories. Entries are
//! kept in a bounded ring buffer and can additionally be echoed to stderr and
//! appended to a daily, size-rotated log file in the config directory.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::constants;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Verbose debugging information
    Debug = 0,
    /// Informational messages about normal operation
    Info = 1,
    /// Warning messages about potential issues
    Warning = 2,
    /// Error messages about failures
    Error = 3,
}

impl LogLevel {
    /// Get the prefix string for this log level
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO ",
            Self::Warning => "WARN ",
            Self::Error => "ERROR",
        }
    }
}

/// A single log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: SystemTime,
    pub level: LogLevel,
    pub category: String,
    pub message: String,
}

impl LogEntry {
    /// Format the log entry as a structured line:
    /// `[HH:MM:SS] [LEVEL] CATEGORY: message`
    pub fn format(&self) -> String {
        let time_str = crate::utils::format_system_time_local(self.timestamp);
        format!(
            "[{}] [{}] {}: {}",
            time_str,
            self.level.prefix(),
            self.category,
            self.message
        )
    }
}

/// Daily log file sink with size rotation.
#[derive(Debug, Clone)]
struct FileSink {
    dir: PathBuf,
    rotation_size: u64,
    retention: Duration,
}

impl FileSink {
    fn append(&self, entry: &LogEntry) {
        if std::fs::create_dir_all(&self.dir).is_err() {
            return;
        }

        let today = crate::utils::format_system_date_local(entry.timestamp);
        let log_file = self
            .dir
            .join(format!("{}-{today}.log", constants::APP_NAME));

        if let Ok(metadata) = std::fs::metadata(&log_file) {
            if metadata.len() > self.rotation_size {
                let rotated = self
                    .dir
                    .join(format!("{}-{today}.1.log", constants::APP_NAME));
                let _ = std::fs::rename(&log_file, rotated);
            }
        }

        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            let _ = writeln!(file, "{}", entry.format());
        }
    }

    /// Remove log files older than the retention window.
    fn prune(&self) {
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                let expired = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .is_ok_and(|modified| modified < cutoff);
                if expired {
                    let _ = std::fs::remove_file(entry.path());
                }
            }
        }
    }
}

/// Global logger instance
pub struct Logger {
    entries: VecDeque<LogEntry>,
    max_entries: usize,
    min_level: LogLevel,
    echo_stderr: bool,
    file: Option<FileSink>,
}

impl Logger {
    fn new() -> Self {
        let max = constants::DEFAULT_MAX_LOG_ENTRIES;
        Self {
            entries: VecDeque::with_capacity(max),
            max_entries: max,
            min_level: LogLevel::Info,
            echo_stderr: false,
            file: None,
        }
    }

    fn log(&mut self, level: LogLevel, category: &str, message: String) {
        if level < self.min_level {
            return;
        }

        let entry = LogEntry {
            timestamp: SystemTime::now(),
            level,
            category: category.to_string(),
            message,
        };

        if self.echo_stderr {
            eprintln!("{}", entry.format());
        }
        if let Some(sink) = &self.file {
            sink.append(&entry);
        }

        self.entries.push_back(entry);
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    fn get_entries(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    fn set_max_entries(&mut self, max: usize) {
        self.max_entries = max;
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    #[cfg(test)]
    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Global logger instance (thread-safe)
static LOGGER: std::sync::OnceLock<Arc<Mutex<Logger>>> = std::sync::OnceLock::new();

fn get_logger() -> &'static Arc<Mutex<Logger>> {
    LOGGER.get_or_init(|| Arc::new(Mutex::new(Logger::new())))
}

/// Log a message with the specified level and category
pub fn log(level: LogLevel, category: &str, message: impl Into<String>) {
    if let Ok(mut logger) = get_logger().lock() {
        logger.log(level, category, message.into());
    }
}

/// Get all buffered log entries
pub fn get_logs() -> Vec<LogEntry> {
    get_logger()
        .lock()
        .map(|logger| logger.get_entries())
        .unwrap_or_default()
}

/// Logger settings derived from `AppConfig` and CLI flags.
#[derive(Debug, Clone)]
pub struct LoggerOptions<'a> {
    pub log_level: &'a str,
    pub max_entries: usize,
    pub echo_stderr: bool,
    /// Directory for the daily log files; `None` keeps logging in memory only.
    pub log_dir: Option<&'a Path>,
    pub rotation_size: u64,
    pub retention_days: u64,
}

/// Configure the logger from user settings.
///
/// Call once at startup after loading `AppConfig`.
pub fn configure(options: &LoggerOptions<'_>) {
    if let Ok(mut logger) = get_logger().lock() {
        logger.set_min_level(parse_log_level(options.log_level));
        logger.set_max_entries(options.max_entries);
        logger.echo_stderr = options.echo_stderr;
        logger.file = options.log_dir.map(|dir| FileSink {
            dir: dir.to_path_buf(),
            rotation_size: options.rotation_size,
            retention: Duration::from_secs(options.retention_days * 24 * 60 * 60),
        });
        if let Some(sink) = &logger.file {
            sink.prune();
        }
    }
}

/// Set the minimum log level.
#[cfg(test)]
pub fn set_min_level(level: LogLevel) {
    if let Ok(mut logger) = get_logger().lock() {
        logger.set_min_level(level);
    }
}

/// Parse a log level string (case-insensitive) into a `LogLevel`.
///
/// Falls back to `LogLevel::Info` for unrecognised values.
#[must_use]
pub fn parse_log_level(s: &str) -> LogLevel {
    match s.trim().to_ascii_lowercase().as_str() {
        "debug" => LogLevel::Debug,
        "warning" | "warn" => LogLevel::Warning,
        "error" | "err" => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

/// Clear all logs
#[cfg(test)]
pub fn clear_logs() {
    if let Ok(mut logger) = get_logger().lock() {
        logger.clear();
    }
}

#[macro_export]
macro_rules! log_debug {
    ($category:expr, $($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Debug, $category, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($category:expr, $($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Info, $category, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($category:expr, $($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Warning, $category, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($category:expr, $($arg:tt)*) => {
        $crate::logger::log($crate::logger::LogLevel::Error, $category, format!($($arg)*))
    };
}
