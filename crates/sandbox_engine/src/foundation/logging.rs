//! Logging pipeline: filters, one formatter, handlers
//!
//! The engine logs through the `log` facade (`log::warn!` and friends). A
//! [`Logger`] built here becomes the facade's backend via [`Logger::install`],
//! so every record runs through the configured pipeline:
//!
//! ```text
//! record -> filter* (any false drops it) -> formatter -> handler*
//! ```
//!
//! The pipeline is fixed once built. `Logger::log` holds an internal mutex
//! for the whole pass, so handlers must not log themselves.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
pub use log::Level;

use crate::core::config::LoggingConfig;

/// Default target used when logging directly through a [`Logger`]
pub const DEFAULT_TARGET: &str = "sandbox_engine";

/// One log event as seen by filters, formatter and handlers
#[derive(Debug, Clone)]
pub struct LogRecord {
    /// Severity
    pub level: Level,
    /// Module path or custom target
    pub target: String,
    /// Rendered message
    pub message: String,
    /// Local time the record was created
    pub timestamp: DateTime<Local>,
}

impl LogRecord {
    /// Create a record stamped with the current local time
    pub fn new(level: Level, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            target: target.into(),
            message: message.into(),
            timestamp: Local::now(),
        }
    }
}

/// Decides whether a record continues through the pipeline
pub trait LogFilter: Send {
    /// `false` suppresses the record entirely
    fn accepts(&self, record: &LogRecord) -> bool;
}

impl<F> LogFilter for F
where
    F: Fn(&LogRecord) -> bool + Send,
{
    fn accepts(&self, record: &LogRecord) -> bool {
        self(record)
    }
}

/// Turns a record into its display string
pub trait LogFormatter: Send {
    /// Produce the line handed to every handler
    fn format(&self, record: &LogRecord) -> String;
}

impl<F> LogFormatter for F
where
    F: Fn(&LogRecord) -> String + Send,
{
    fn format(&self, record: &LogRecord) -> String {
        self(record)
    }
}

/// Receives accepted records (console, file, capture, ...)
pub trait LogHandler: Send {
    /// Emit `formatted`; `record` carries the raw fields
    fn handle(&mut self, record: &LogRecord, formatted: &str);
}

impl<F> LogHandler for F
where
    F: FnMut(&LogRecord, &str) + Send,
{
    fn handle(&mut self, record: &LogRecord, formatted: &str) {
        self(record, formatted);
    }
}

/// Drops records less severe than a threshold
#[derive(Debug, Clone, Copy)]
pub struct MinLevel(pub Level);

impl LogFilter for MinLevel {
    fn accepts(&self, record: &LogRecord) -> bool {
        record.level <= self.0
    }
}

/// Filter driven by env_logger directives such as `info,sandbox_engine=debug`
pub struct EnvFilter {
    filter: env_logger::filter::Filter,
}

impl EnvFilter {
    /// Parse a directive string
    pub fn parse(directives: &str) -> Self {
        let filter = env_logger::filter::Builder::new().parse(directives).build();
        Self { filter }
    }

    /// Read directives from an environment variable, if set
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var).ok().map(|directives| Self::parse(&directives))
    }
}

impl LogFilter for EnvFilter {
    fn accepts(&self, record: &LogRecord) -> bool {
        self.filter.matches(
            &log::Record::builder()
                .level(record.level)
                .target(&record.target)
                .args(format_args!("{}", record.message))
                .build(),
        )
    }
}

/// `2024-05-01 12:00:00.123 [WARN] message`
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampFormatter;

impl LogFormatter for TimestampFormatter {
    fn format(&self, record: &LogRecord) -> String {
        format!(
            "{} [{}] {}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level,
            record.message
        )
    }
}

/// Writes lines to stdout, coloured per level
#[derive(Debug, Clone, Copy)]
pub struct ConsoleHandler {
    colored: bool,
}

impl ConsoleHandler {
    /// Console handler; `colored` enables ANSI escapes
    pub fn new(colored: bool) -> Self {
        Self { colored }
    }

    fn color(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1b[1;31m",
            Level::Warn => "\x1b[1;33m",
            Level::Info => "\x1b[1;32m",
            Level::Debug => "\x1b[36m",
            Level::Trace => "\x1b[90m",
        }
    }
}

impl Default for ConsoleHandler {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LogHandler for ConsoleHandler {
    fn handle(&mut self, record: &LogRecord, formatted: &str) {
        let mut out = io::stdout().lock();
        // Nowhere to report a broken stdout from inside the logger
        let _ = if self.colored {
            writeln!(out, "{}{}\x1b[0m", Self::color(record.level), formatted)
        } else {
            writeln!(out, "{formatted}")
        };
    }
}

/// Appends lines to a file
pub struct FileHandler {
    writer: BufWriter<File>,
}

impl FileHandler {
    /// Open (or create) `path` for appending
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl LogHandler for FileHandler {
    fn handle(&mut self, _record: &LogRecord, formatted: &str) {
        let _ = writeln!(self.writer, "{formatted}").and_then(|()| self.writer.flush());
    }
}

struct Pipeline {
    filters: Vec<Box<dyn LogFilter>>,
    formatter: Box<dyn LogFormatter>,
    handlers: Vec<Box<dyn LogHandler>>,
}

impl Pipeline {
    fn process(&mut self, record: &LogRecord) {
        if !self.filters.iter().all(|filter| filter.accepts(record)) {
            return;
        }
        let formatted = self.formatter.format(record);
        for handler in &mut self.handlers {
            handler.handle(record, &formatted);
        }
    }
}

/// Collects pipeline stages; consumed by [`build`](Self::build)
#[derive(Default)]
pub struct LoggerBuilder {
    filters: Vec<Box<dyn LogFilter>>,
    formatter: Option<Box<dyn LogFormatter>>,
    handlers: Vec<Box<dyn LogHandler>>,
}

impl LoggerBuilder {
    /// Add a filter; filters run in insertion order
    #[must_use]
    pub fn append_filter(mut self, filter: impl LogFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    /// Set the formatter, replacing any earlier one
    #[must_use]
    pub fn formatter(mut self, formatter: impl LogFormatter + 'static) -> Self {
        self.formatter = Some(Box::new(formatter));
        self
    }

    /// Add a handler; handlers run in insertion order
    #[must_use]
    pub fn append_handler(mut self, handler: impl LogHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Freeze the pipeline; [`TimestampFormatter`] is used if none was set
    pub fn build(self) -> Logger {
        Logger {
            pipeline: Mutex::new(Pipeline {
                filters: self.filters,
                formatter: self
                    .formatter
                    .unwrap_or_else(|| Box::new(TimestampFormatter)),
                handlers: self.handlers,
            }),
        }
    }
}

/// Thread-safe logging pipeline
pub struct Logger {
    pipeline: Mutex<Pipeline>,
}

impl Logger {
    /// Start configuring a logger
    pub fn builder() -> LoggerBuilder {
        LoggerBuilder::default()
    }

    /// Log `message` at `level` under [`DEFAULT_TARGET`]
    pub fn log(&self, level: Level, message: impl Into<String>) {
        self.log_record(&LogRecord::new(level, DEFAULT_TARGET, message));
    }

    /// Run a prepared record through the pipeline
    pub fn log_record(&self, record: &LogRecord) {
        self.pipeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .process(record);
    }

    /// Shorthand for `log(Level::Debug, ..)`
    pub fn debug(&self, message: impl Into<String>) {
        self.log(Level::Debug, message);
    }

    /// Shorthand for `log(Level::Info, ..)`
    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    /// Shorthand for `log(Level::Warn, ..)`
    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message);
    }

    /// Shorthand for `log(Level::Error, ..)`
    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }

    /// Make this logger the backend of the `log` facade
    ///
    /// Level filtering is left to the pipeline, so the facade is opened up to
    /// `Trace`. Fails if another logger was installed first.
    pub fn install(self) -> Result<(), log::SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(log::LevelFilter::Trace);
        Ok(())
    }
}

impl log::Log for Logger {
    fn enabled(&self, _metadata: &log::Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &log::Record<'_>) {
        self.log_record(&LogRecord::new(
            record.level(),
            record.target(),
            record.args().to_string(),
        ));
    }

    fn flush(&self) {}
}

/// Errors raised while setting up logging
#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    /// Unknown level name in configuration
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// Log file could not be opened
    #[error("Failed to open log file: {0}")]
    File(#[from] io::Error),

    /// A logger was already installed
    #[error("Logger already installed: {0}")]
    AlreadyInstalled(#[from] log::SetLoggerError),
}

impl super::fatal::Reported for LoggingError {}

/// Build the default pipeline described by `config`
///
/// `RUST_LOG`, when set, replaces the configured level/directives.
pub fn build_from_config(config: &LoggingConfig) -> Result<Logger, LoggingError> {
    let mut builder = Logger::builder();

    if let Some(filter) = EnvFilter::from_env("RUST_LOG") {
        builder = builder.append_filter(filter);
    } else if let Some(directives) = &config.filter {
        builder = builder.append_filter(EnvFilter::parse(directives));
    } else {
        let level: Level = config
            .level
            .parse()
            .map_err(|_| LoggingError::InvalidLevel(config.level.clone()))?;
        builder = builder.append_filter(MinLevel(level));
    }

    builder = builder.formatter(TimestampFormatter);

    if config.console {
        builder = builder.append_handler(ConsoleHandler::new(config.colored));
    }
    if let Some(path) = &config.file {
        builder = builder.append_handler(FileHandler::open(path)?);
    }

    Ok(builder.build())
}

/// Build the pipeline from `config` and install it as the `log` backend
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    build_from_config(config)?.install()?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Sink = Arc<Mutex<Vec<(Level, String)>>>;

    fn sink_handler(sink: &Sink) -> impl LogHandler + 'static {
        let sink = Arc::clone(sink);
        move |record: &LogRecord, formatted: &str| {
            sink.lock().unwrap().push((record.level, formatted.to_string()));
        }
    }

    #[test]
    fn test_filter_suppresses_handlers() {
        let sink = Sink::default();
        let logger = Logger::builder()
            .append_filter(MinLevel(Level::Warn))
            .formatter(|record: &LogRecord| record.message.clone())
            .append_handler(sink_handler(&sink))
            .build();

        logger.info("hidden");
        logger.debug("hidden too");
        logger.warn("shown");
        logger.error("also shown");

        let seen = sink.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (Level::Warn, "shown".to_string()),
                (Level::Error, "also shown".to_string())
            ]
        );
    }

    #[test]
    fn test_loggers_with_different_thresholds_are_independent() {
        let strict_sink = Sink::default();
        let verbose_sink = Sink::default();
        let strict = Logger::builder()
            .append_filter(MinLevel(Level::Error))
            .append_handler(sink_handler(&strict_sink))
            .build();
        let verbose = Logger::builder()
            .append_filter(MinLevel(Level::Debug))
            .append_handler(sink_handler(&verbose_sink))
            .build();

        for logger in [&strict, &verbose] {
            logger.debug("d");
            logger.warn("w");
            logger.error("e");
        }

        assert_eq!(strict_sink.lock().unwrap().len(), 1);
        assert_eq!(verbose_sink.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_any_rejecting_filter_drops_record() {
        let sink = Sink::default();
        let logger = Logger::builder()
            .append_filter(|_: &LogRecord| true)
            .append_filter(|record: &LogRecord| !record.message.contains("secret"))
            .append_handler(sink_handler(&sink))
            .build();

        logger.info("public");
        logger.info("secret token");
        assert_eq!(sink.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_handlers_run_in_append_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&order);
        let second = Arc::clone(&order);
        let logger = Logger::builder()
            .append_handler(move |_: &LogRecord, _: &str| first.lock().unwrap().push("console"))
            .append_handler(move |_: &LogRecord, _: &str| second.lock().unwrap().push("file"))
            .build();

        logger.info("x");
        assert_eq!(*order.lock().unwrap(), vec!["console", "file"]);
    }

    #[test]
    fn test_default_formatter_includes_level_and_message() {
        let record = LogRecord::new(Level::Warn, DEFAULT_TARGET, "careful");
        let line = TimestampFormatter.format(&record);
        assert!(line.ends_with("[WARN] careful"), "{line}");
    }

    #[test]
    fn test_env_filter_directives() {
        let filter = EnvFilter::parse("warn,sandbox_engine::render=debug");
        let render = LogRecord::new(Level::Debug, "sandbox_engine::render", "m");
        let other = LogRecord::new(Level::Debug, "sandbox_engine::assets", "m");
        let other_warn = LogRecord::new(Level::Warn, "sandbox_engine::assets", "m");
        assert!(filter.accepts(&render));
        assert!(!filter.accepts(&other));
        assert!(filter.accepts(&other_warn));
    }

    #[test]
    fn test_file_handler_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.log");
        let logger = Logger::builder()
            .formatter(|record: &LogRecord| record.message.clone())
            .append_handler(FileHandler::open(&path).unwrap())
            .build();

        logger.info("first");
        logger.error("second");

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_invalid_config_level_rejected() {
        let config = LoggingConfig {
            level: "loud".to_string(),
            ..LoggingConfig::default()
        };
        // RUST_LOG would bypass the level parse
        if std::env::var("RUST_LOG").is_err() {
            assert!(matches!(
                build_from_config(&config),
                Err(LoggingError::InvalidLevel(_))
            ));
        }
    }

    #[test]
    fn test_facade_records_reach_pipeline() {
        capture::start();
        log::warn!("through the facade");
        let records = capture::take();
        assert_eq!(capture::count_at_least(&records, Level::Warn, "through the facade"), 1);
    }
}
