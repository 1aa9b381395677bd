use std::path::Path;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::time::ChronoLocal, EnvFilter};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DEFAULT_LOG_FILE: &str = "default.log";
const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("invalid log file path `{0}`")]
    InvalidPath(String),

    #[error("logger already initialised: {0}")]
    AlreadyInitialised(String),
}

/// Keeps the background log writer alive. Buffered lines are flushed when it is dropped.
pub struct Logger {
    _guard: WorkerGuard,
}

impl Logger {
    /// Installs the process-wide subscriber.
    ///
    /// # Parameters
    /// - `log_to_file`: Write to a file (`true`) or to the console (`false`).
    /// - `log_file`: Path of the log file, appended to. Defaults to `default.log`.
    ///
    /// The level comes from `RUST_LOG`, `info` when unset. Fails if a
    /// subscriber was already installed.
    pub fn init(log_to_file: bool, log_file: Option<&str>) -> Result<Self, LoggerError> {
        let (writer, guard) = if log_to_file {
            let path = Path::new(log_file.unwrap_or(DEFAULT_LOG_FILE));
            let file_name = path
                .file_name()
                .ok_or_else(|| LoggerError::InvalidPath(path.display().to_string()))?;
            let directory = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file_name))
        } else {
            tracing_appender::non_blocking(std::io::stdout())
        };

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
            .with_ansi(!log_to_file)
            .with_writer(writer)
            .try_init()
            .map_err(|e| LoggerError::AlreadyInitialised(e.to_string()))?;

        Ok(Logger { _guard: guard })
    }
}
