use serde::{Deserialize, Serialize};
use std::fs::create_dir_all;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::fmt;

#[derive(clap::ValueEnum, Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingOptions {
    pub console_level: LogLevel,
    pub file_level: LogLevel,
    pub log_to_file: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            console_level: LogLevel::Warn,
            file_level: LogLevel::Info,
            log_to_file: true,
        }
    }
}

/// Console output goes to stderr. The returned guard flushes the log file
/// when dropped, so keep it alive until exit.
pub fn setup_logging(options: &LoggingOptions, log_dir: &Path) -> Option<WorkerGuard> {
    let console_level: Level = options.console_level.into();
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(LevelFilter::from_level(console_level));

    let (file, guard) = if options.log_to_file && create_dir_all(log_dir).is_ok() {
        let appender = tracing_appender::rolling::daily(log_dir, "destination-search.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_level: Level = options.file_level.into();
        let layer = fmt::layer()
            .with_ansi(false)
            .with_writer(writer)
            .with_filter(LevelFilter::from_level(file_level));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    if let Err(err) = tracing_subscriber::registry()
        .with(console)
        .with(file)
        .try_init()
    {
        eprintln!("Failed to set up logging: {err}");
    }
    guard
}
