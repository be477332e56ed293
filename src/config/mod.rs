//! Configuration module for extkeeper.
//!
//! Handles loading and parsing the .extkeeperrc configuration file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogConfig;

/// Default .extkeeperrc file content with all settings documented.
const DEFAULT_RC: &str = r#"# extkeeper Configuration File
# ============================
# Lines starting with '#' are comments.
#
# Locations
# ---------
# Directory holding installed extension bundles
# extensions_dir = ~/.extkeeper/extensions
# Scratch directory for downloads and extraction (wiped per repository)
# scratch_dir = /tmp/extkeeper
# Persistent key-value store (update cache, ignore list)
# storage_path = ~/.extkeeper/storage.json

# Packages
# --------
# Folder suffix identifying an installable package inside an archive
# package_suffix = .roboFontExt
# Branch used when a repository has no tags or declares a subpath
# default_branch = master

# Remote hosts
# ------------
# api_base = https://api.github.com
# archive_base = https://github.com
# raw_base = https://raw.githubusercontent.com
# registry_url = http://www.robofontmechanic.com/api/v1/registry.json

# Update checks
# -------------
# Seconds between full re-fetches of remote versions
# cache_window_secs = 3600
# Per-request network timeout in seconds
# request_timeout_secs = 30

# Logging
# -------
# log_level = info
# log_retention_hours = 24
"#;

/// Default cache window (one hour).
pub const DEFAULT_CACHE_WINDOW_SECS: u64 = 60 * 60;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Upper bound on lines read from the rc file.
const MAX_CONFIG_LINES: usize = 1000;

/// Default package folder suffix.
pub const DEFAULT_PACKAGE_SUFFIX: &str = ".roboFontExt";

/// Default registry endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "http://www.robofontmechanic.com/api/v1/registry.json";

/// Returns the path to the extkeeper data directory (~/.extkeeper).
#[must_use]
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".extkeeper")
}

/// Runtime settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Path of the rc file these settings were read from.
    pub config_path: PathBuf,
    /// Directory holding installed bundles.
    pub extensions_dir: PathBuf,
    /// Root of per-repository scratch directories.
    pub scratch_dir: PathBuf,
    /// Location of the persistent store.
    pub storage_path: PathBuf,
    /// Package folder suffix convention.
    pub package_suffix: String,
    /// Branch used for descriptor and fallback archive lookups.
    pub default_branch: String,
    /// Tag listing API base.
    pub api_base: String,
    /// Archive download base.
    pub archive_base: String,
    /// Raw content base.
    pub raw_base: String,
    /// Registry endpoint.
    pub registry_url: String,
    /// Time window between live fetches.
    pub cache_window: Duration,
    /// Per-request network timeout.
    pub request_timeout: Duration,
    /// Logging configuration.
    pub log_config: LogConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let data = data_dir();
        Self {
            config_path: Self::default_config_path(),
            extensions_dir: data.join("extensions"),
            scratch_dir: std::env::temp_dir().join("extkeeper"),
            storage_path: data.join("storage.json"),
            package_suffix: DEFAULT_PACKAGE_SUFFIX.to_string(),
            default_branch: "master".to_string(),
            api_base: "https://api.github.com".to_string(),
            archive_base: "https://github.com".to_string(),
            raw_base: "https://raw.githubusercontent.com".to_string(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            cache_window: Duration::from_secs(DEFAULT_CACHE_WINDOW_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            log_config: LogConfig::default(),
        }
    }
}

impl Settings {
    /// Returns the default config file path (~/.extkeeperrc).
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".extkeeperrc")
    }

    /// Loads settings from the default path, creating it if it doesn't exist.
    pub fn load() -> io::Result<Self> {
        Self::load_from(&Self::default_config_path())
    }

    /// Loads settings from a specific path, creating a documented default
    /// file first if none exists.
    pub fn load_from(path: &Path) -> io::Result<Self> {
        if !path.exists() {
            Self::write_default(path)?;
        }

        let content = fs::read_to_string(path)?;
        let mut settings = Self {
            config_path: path.to_path_buf(),
            ..Self::default()
        };
        settings.parse(&content);
        Ok(settings)
    }

    /// Writes the documented default rc file.
    pub fn write_default(path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_RC.as_bytes())?;
        Ok(())
    }

    /// Parses rc file content on top of the current values.
    pub fn parse(&mut self, content: &str) {
        for line in content.lines().take(MAX_CONFIG_LINES) {
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = strip_inline_comment(value).trim();

                if !value.is_empty() {
                    self.apply_setting(key, value);
                }
            }
        }
    }

    /// Applies a single setting. Invalid values keep the previous value.
    fn apply_setting(&mut self, key: &str, value: &str) {
        match key {
            "extensions_dir" => self.extensions_dir = expand_home(value),
            "scratch_dir" => self.scratch_dir = expand_home(value),
            "storage_path" => self.storage_path = expand_home(value),
            "package_suffix" => {
                self.package_suffix = if value.starts_with('.') {
                    value.to_string()
                } else {
                    format!(".{}", value)
                };
            }
            "default_branch" => self.default_branch = value.to_string(),
            "api_base" => self.api_base = value.trim_end_matches('/').to_string(),
            "archive_base" => self.archive_base = value.trim_end_matches('/').to_string(),
            "raw_base" => self.raw_base = value.trim_end_matches('/').to_string(),
            "registry_url" => self.registry_url = value.to_string(),
            "cache_window_secs" => {
                if let Ok(secs) = value.parse() {
                    self.cache_window = Duration::from_secs(secs);
                }
            }
            "request_timeout_secs" => {
                if let Ok(secs) = value.parse::<u64>() {
                    if secs > 0 {
                        self.request_timeout = Duration::from_secs(secs);
                    }
                }
            }
            "log_level" => self.log_config.level = LogConfig::parse_level(value),
            "log_retention" | "log_retention_hours" => {
                self.log_config.retention_hours = LogConfig::parse_retention(value);
            }
            "log_enabled" | "logging" => {
                self.log_config.enabled =
                    matches!(value.to_lowercase().as_str(), "true" | "yes" | "1" | "on");
            }
            _ => {
                tracing::debug!("[CONFIG] Ignoring unknown setting '{}'", key);
            }
        }
    }
}

/// Expands a leading `~/` to the home directory.
fn expand_home(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

/// Cuts a trailing `# comment`. A `#` counts only after whitespace, so
/// values such as URL fragments survive.
fn strip_inline_comment(value: &str) -> &str {
    value
        .char_indices()
        .find(|&(i, c)| c == '#' && value[..i].ends_with(char::is_whitespace))
        .map_or(value, |(i, _)| &value[..i])
}
