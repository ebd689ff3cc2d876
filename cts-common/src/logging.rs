//! Logging setup for the `cts` binary.
//!
//! Configuration comes from [`LogConfig`], usually built with
//! [`LogConfig::from_env`]:
//!
//! - `CTS_LOG_LEVEL`: filter directive (default given by the caller)
//! - `CTS_LOG_FORMAT`: `pretty`, `compact` or `json`
//! - `CTS_LOG_FILE`: also write JSON lines to this file

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::errors::{CtsError, CtsResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = CtsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(CtsError::Config(format!(
                "unknown log format '{other}' (expected pretty, compact or json)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub file: Option<PathBuf>,
    pub stderr: bool,
}

impl LogConfig {
    pub fn new(level: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            format: LogFormat::default(),
            file: None,
            stderr: false,
        }
    }

    /// Defaults overridden by `CTS_LOG_*`; an unparsable format falls back to
    /// the default.
    pub fn from_env(default_level: &str) -> Self {
        let mut config = Self::new(
            std::env::var("CTS_LOG_LEVEL").unwrap_or_else(|_| default_level.to_string()),
        );
        if let Ok(format) = std::env::var("CTS_LOG_FORMAT") {
            config.format = format.parse().unwrap_or_default();
        }
        if let Ok(file) = std::env::var("CTS_LOG_FILE") {
            if !file.trim().is_empty() {
                config.file = Some(PathBuf::from(file));
            }
        }
        config
    }

    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Write human-readable output to stderr.
    #[must_use]
    pub fn with_stderr(mut self) -> Self {
        self.stderr = true;
        self
    }

    fn filter(&self) -> CtsResult<EnvFilter> {
        EnvFilter::try_new(&self.level)
            .map_err(|err| CtsError::Config(format!("invalid log level '{}': {err}", self.level)))
    }
}

/// Keeps background log writers alive; drop it only at exit.
#[derive(Debug, Default)]
pub struct LoggingGuards {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber described by `config`.
pub fn init_logging(config: &LogConfig) -> CtsResult<LoggingGuards> {
    let filter = config.filter()?;
    let mut guards = LoggingGuards::default();

    let file_layer = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            guards._file = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_current_span(true)
                    .with_thread_ids(true),
            )
        }
        None => None,
    };

    let stderr_layer = config.stderr.then(|| match config.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .pretty()
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .boxed(),
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|err| CtsError::Config(format!("logging already initialized: {err}")))?;
    Ok(guards)
}

pub(crate) fn open_log_file(path: &Path) -> CtsResult<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_builders() {
        let config = LogConfig::new("info")
            .with_level("debug")
            .with_format(LogFormat::Json)
            .with_file("/tmp/cts.log")
            .with_stderr();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/cts.log")));
        assert!(config.stderr);
    }

    #[test]
    fn test_invalid_level_is_config_error() {
        let config = LogConfig::new("cts=verbose");
        assert!(matches!(config.filter(), Err(CtsError::Config(_))));
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cts.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
