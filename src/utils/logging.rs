//! Logging setup for the library.
//!
//! The crate logs through the `log` facade. [`HwiLogger`] is an optional
//! stderr backend with text or JSON lines; stdout is left alone because
//! command results are written there.

use crate::{HwiError, Result};
use log::{Level, LevelFilter, Record};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::Error,
            LogLevel::Warn => Level::Warn,
            LogLevel::Info => Level::Info,
            LogLevel::Debug => Level::Debug,
            LogLevel::Trace => Level::Trace,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Trace => write!(f, "TRACE"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = HwiError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(HwiError::invalid_input(format!("Unknown log level: {}", other))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// One JSON object per line instead of bracketed text
    pub json_format: bool,
    pub include_timestamp: bool,
    pub include_module_path: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json_format: false,
            include_timestamp: true,
            include_module_path: true,
        }
    }
}

impl LoggingConfig {
    /// Debug-level text logging, matching the `--debug` command flag.
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
            ..Default::default()
        }
    }
}

/// stderr logger
pub struct HwiLogger {
    config: LoggingConfig,
}

impl HwiLogger {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Installs the logger as the global `log` backend.
    pub fn init(config: LoggingConfig) -> Result<()> {
        let level = config.level;
        log::set_boxed_logger(Box::new(Self::new(config)))
            .map_err(|e| HwiError::invalid_input(format!("Failed to set logger: {}", e)))?;
        log::set_max_level(level.into());

        log::info!("hwi logger initialized with level: {}", level);
        Ok(())
    }

    fn format_record(&self, record: &Record) -> String {
        if self.config.json_format {
            self.format_json_record(record)
        } else {
            self.format_text_record(record)
        }
    }

    fn format_json_record(&self, record: &Record) -> String {
        let mut json_record = serde_json::Map::new();

        json_record.insert("level".to_string(), serde_json::Value::String(record.level().to_string()));
        json_record.insert("message".to_string(), serde_json::Value::String(record.args().to_string()));

        if self.config.include_timestamp {
            json_record.insert("timestamp".to_string(), serde_json::Value::Number(unix_time().into()));
        }

        if self.config.include_module_path {
            if let Some(module_path) = record.module_path() {
                json_record.insert("module".to_string(), serde_json::Value::String(module_path.to_string()));
            }
        }

        serde_json::Value::Object(json_record).to_string()
    }

    fn format_text_record(&self, record: &Record) -> String {
        let mut formatted = String::new();

        if self.config.include_timestamp {
            formatted.push_str(&format!("[{}] ", unix_time()));
        }

        formatted.push_str(&format!("[{}] ", record.level()));

        if self.config.include_module_path {
            if let Some(module_path) = record.module_path() {
                formatted.push_str(&format!("[{}] ", module_path));
            }
        }

        formatted.push_str(&record.args().to_string());
        formatted
    }
}

fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl log::Log for HwiLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= Level::from(self.config.level)
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{}", self.format_record(record));
        }
    }

    fn flush(&self) {}
}

/// Measures a single operation and logs its duration at debug level.
pub struct PerformanceTimer {
    start_time: Instant,
    operation_name: String,
}

impl PerformanceTimer {
    pub fn start(operation_name: &str) -> Self {
        Self {
            start_time: Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn stop(self) -> Duration {
        let duration = self.elapsed();
        log::debug!("Operation '{}' completed in {:?}", self.operation_name, duration);
        duration
    }
}
