//! src/logging.rs
//! ============================================================================
//! # Structured JSON-lines logging
//!
//! Every `tracing` event becomes one [`LogEntry`] written through a
//! non-blocking rolling file appender. Call sites tag events with a
//! `marker = "..."` field (`SCAN_COMPLETED`, `PASTE_BLOCKED`, ...) and an
//! optional `operation_type`; the remaining fields are kept as strings.

use std::{
    collections::HashMap,
    fmt,
    io::Write,
    path::PathBuf,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::MakeWriter,
    layer::{Context as TracingContext, SubscriberExt},
    registry::LookupSpan,
    util::SubscriberInitExt,
};

const FIELD_MESSAGE: &str = "message";
const FIELD_MARKER: &str = "marker";
const FIELD_OPERATION_TYPE: &str = "operation_type";
const FIELD_DURATION: &str = "duration_us";
const DEFAULT_MARKER: &str = "EVENT";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogRotation {
    Never,
    Hourly,
    Daily,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub log_file_prefix: CompactString,
    pub log_level: CompactString,
    pub max_log_files: usize,
    pub max_field_size: usize,
    pub rotation: LogRotation,
    /// Mirror events to stderr in compact text form
    pub console: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("./logs"),
            log_file_prefix: CompactString::const_new("fm"),
            log_level: CompactString::const_new("info"),
            max_log_files: 10,
            max_field_size: 2048,
            rotation: LogRotation::Daily,
            console: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub level: CompactString,
    pub target: CompactString,
    pub marker: CompactString,
    pub operation_type: CompactString,
    pub source_location: CompactString,
    pub message: String,
    pub duration_us: Option<u64>,
    pub fields: HashMap<CompactString, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Logger already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directory: {0}")]
    InvalidLogDirectory(String),

    #[error("Failed to create log directory: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);
static LOG_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[inline]
const fn level_str(level: Level) -> &'static str {
    match level {
        Level::INFO => "INFO",
        Level::DEBUG => "DEBUG",
        Level::WARN => "WARN",
        Level::ERROR => "ERROR",
        Level::TRACE => "TRACE",
    }
}

struct FieldVisitor {
    max_field_size: usize,
    fields: HashMap<CompactString, String>,
}

impl FieldVisitor {
    fn new(max_field_size: usize) -> Self {
        Self {
            max_field_size,
            fields: HashMap::new(),
        }
    }

    fn insert(&mut self, name: &str, mut value: String) {
        if name != FIELD_MESSAGE && name != FIELD_MARKER && value.len() > self.max_field_size {
            let mut cut = self.max_field_size;
            while !value.is_char_boundary(cut) {
                cut -= 1;
            }
            value.truncate(cut);
        }
        self.fields.insert(CompactString::new(name), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field.name(), value.to_owned());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field.name(), value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field.name(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field.name(), format!("{value:?}"));
    }
}

/// Layer turning events into JSON lines.
pub struct JsonLayer {
    writer: NonBlocking,
    max_field_size: usize,
}

impl JsonLayer {
    #[must_use]
    pub const fn new(writer: NonBlocking, max_field_size: usize) -> Self {
        Self {
            writer,
            max_field_size,
        }
    }
}

impl<S> Layer<S> for JsonLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_event(&self, event: &Event<'_>, ctx: TracingContext<'_, S>) {
        let meta = event.metadata();
        let mut visitor = FieldVisitor::new(self.max_field_size);
        event.record(&mut visitor);
        let mut fields = visitor.fields;

        let operation_type = fields
            .remove(FIELD_OPERATION_TYPE)
            .map(CompactString::from)
            .or_else(|| ctx.lookup_current().map(|span| CompactString::new(span.name())))
            .unwrap_or_else(|| CompactString::const_new("unknown"));

        let entry = LogEntry {
            sequence: LOG_SEQUENCE.fetch_add(1, Ordering::AcqRel),
            timestamp: Utc::now(),
            level: CompactString::const_new(level_str(*meta.level())),
            target: CompactString::new(meta.target()),
            marker: fields
                .remove(FIELD_MARKER)
                .map_or(CompactString::const_new(DEFAULT_MARKER), CompactString::from),
            operation_type,
            source_location: CompactString::new(format!(
                "{}:{}",
                meta.file().unwrap_or("unknown"),
                meta.line().unwrap_or(0)
            )),
            message: fields.remove(FIELD_MESSAGE).unwrap_or_default(),
            duration_us: fields.remove(FIELD_DURATION).and_then(|v| v.parse().ok()),
            fields,
        };

        if let Ok(mut line) = serde_json::to_vec(&entry) {
            line.push(b'\n');
            let _ = self.writer.make_writer().write_all(&line);
        }
    }
}

pub struct Logger;

impl Logger {
    /// Installs the global subscriber. Keep the returned guard alive for the
    /// lifetime of the process; dropping it flushes pending lines.
    pub async fn init(config: &LoggerConfig) -> Result<WorkerGuard, LoggingError> {
        if config.log_dir.as_os_str().is_empty() {
            return Err(LoggingError::InvalidLogDirectory(
                "log directory is empty".to_string(),
            ));
        }

        if INITIALIZED.swap(true, Ordering::AcqRel) {
            return Err(LoggingError::AlreadyInitialized);
        }

        tokio::fs::create_dir_all(&config.log_dir).await?;

        let rotation = match config.rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        };

        let appender = RollingFileAppender::builder()
            .rotation(rotation)
            .filename_prefix(config.log_file_prefix.as_str())
            .filename_suffix("jsonl")
            .max_log_files(config.max_log_files)
            .build(&config.log_dir)
            .map_err(|e| LoggingError::ConfigError(e.to_string()))?;

        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(config.log_level.as_str()))
            .map_err(|e| LoggingError::ConfigError(e.to_string()))?;

        let console = config.console.then(|| {
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(JsonLayer::new(non_blocking, config.max_field_size))
            .with(console)
            .try_init()
            .map_err(|e| LoggingError::ConfigError(e.to_string()))?;

        tracing::info!(
            marker = "LOGGER_READY",
            log_dir = %config.log_dir.display(),
            level = %config.log_level,
            "Logging initialized"
        );

        Ok(guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_events_become_json_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fm.jsonl");
        let file = std::fs::File::create(&path).unwrap();
        let (writer, guard) = tracing_appender::non_blocking(file);

        let subscriber = tracing_subscriber::registry().with(JsonLayer::new(writer, 8));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(
                marker = "SCAN_COMPLETED",
                url = "filesystem:downloads/very/long/path",
                "scan finished"
            );
        });
        drop(guard);

        let text = std::fs::read_to_string(&path).unwrap();
        let entry: LogEntry = serde_json::from_str(text.lines().next().unwrap()).unwrap();

        assert_eq!(entry.marker, "SCAN_COMPLETED");
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.message, "scan finished");
        assert_eq!(entry.fields.get("url").map(String::as_str), Some("filesyst"));
    }
}
