//! File logging for extkeeper.
//!
//! Logs are written to timestamped files in ~/.extkeeper/logs/. Files older
//! than the retention window are removed when logging starts.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Default log retention in hours.
pub const DEFAULT_LOG_RETENTION_HOURS: u32 = 24;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding the configured filter.
pub const LOG_ENV_VAR: &str = "EXTKEEPER_LOG";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log retention period in hours.
    pub retention_hours: u32,
    /// Log level (trace, debug, info, warn, error, off).
    pub level: String,
    /// Whether file logging is enabled.
    pub enabled: bool,
    /// Mirror log lines to stderr.
    pub verbose: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            retention_hours: DEFAULT_LOG_RETENTION_HOURS,
            level: DEFAULT_LOG_LEVEL.to_string(),
            enabled: true,
            verbose: false,
        }
    }
}

impl LogConfig {
    /// Normalizes a log level name; unknown names fall back to the default.
    #[must_use]
    pub fn parse_level(value: &str) -> String {
        let level = match value.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" | "warning" => "warn",
            "error" => "error",
            "off" | "none" | "disabled" => "off",
            _ => DEFAULT_LOG_LEVEL,
        };
        level.to_string()
    }

    /// Parses retention hours, falling back to the default.
    #[must_use]
    pub fn parse_retention(value: &str) -> u32 {
        value.parse().unwrap_or(DEFAULT_LOG_RETENTION_HOURS)
    }

    fn is_off(&self) -> bool {
        self.level == "off"
    }
}

/// Returns the log directory path (~/.extkeeper/logs/).
#[must_use]
pub fn log_directory() -> PathBuf {
    crate::config::data_dir().join("logs")
}

/// Returns a fresh timestamped log file path inside `dir`.
#[must_use]
pub fn log_file_path(dir: &Path) -> PathBuf {
    let now = chrono::Local::now();
    dir.join(format!("extkeeper_{}.log", now.format("%Y-%m-%d_%H-%M-%S")))
}

/// Removes `.log` files in `dir` last modified before the retention window.
/// Returns the number of files removed.
pub fn cleanup_old_logs(dir: &Path, retention_hours: u32) -> io::Result<u32> {
    if !dir.exists() {
        return Ok(0);
    }

    let retention = Duration::from_secs(u64::from(retention_hours) * 3600);
    let now = SystemTime::now();
    let mut deleted = 0;

    for entry in fs::read_dir(dir)?.filter_map(Result::ok) {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("log") {
            continue;
        }

        let expired = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);

        if expired && fs::remove_file(&path).is_ok() {
            deleted += 1;
        }
    }

    Ok(deleted)
}

/// Initializes the global subscriber.
///
/// File output goes to a new file in the default log directory; with
/// `verbose` set, lines are mirrored to stderr. `EXTKEEPER_LOG` overrides
/// the configured level.
pub fn init(config: &LogConfig) -> io::Result<()> {
    init_in(config, &log_directory())
}

/// Same as [`init`] with an explicit log directory.
pub fn init_in(config: &LogConfig, dir: &Path) -> io::Result<()> {
    if config.is_off() || (!config.enabled && !config.verbose) {
        return Ok(());
    }

    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let mut deleted = 0;
    let mut log_path = None;
    let file_layer = if config.enabled {
        fs::create_dir_all(dir)?;
        deleted = cleanup_old_logs(dir, config.retention_hours)?;
        let path = log_file_path(dir);
        let file = File::create(&path)?;
        log_path = Some(path);
        Some(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    let stderr_layer = config.verbose.then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .without_time()
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    tracing::info!("extkeeper logging initialized (level {})", config.level);
    if let Some(path) = log_path {
        tracing::info!("Log file: {}", path.display());
    }
    if deleted > 0 {
        tracing::info!("Cleaned up {} old log file(s)", deleted);
    }

    Ok(())
}
