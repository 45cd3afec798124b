//! Configuration management for mongo-backup
//!
//! This module handles loading, parsing, and managing configuration from:
//! - Configuration files (TOML format)
//! - Command-line arguments (applied by the `cli` module)
//!
//! Configuration precedence (highest to lowest):
//! 1. Command-line arguments
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Defaults for backup runs
    #[serde(default)]
    pub backup: BackupDefaults,
}

/// Connection-related configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Default MongoDB connection URI
    #[serde(default = "default_uri")]
    pub uri: String,

    /// Connect and server selection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Path to a per-run log file (None for the console subscriber)
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Defaults applied to every backup run unless overridden on the command line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupDefaults {
    /// Document encoding (`json` or `bson`)
    #[serde(default = "default_parser")]
    pub parser: String,

    /// Write index definitions to `.metadata`
    #[serde(default)]
    pub metadata: bool,

    /// Cursors per collection; 0 disables multi-cursor scans
    #[serde(default)]
    pub parallel_cursors: u32,

    /// Documents encoded and stored concurrently per stream
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

// Default value functions
fn default_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

fn default_parser() -> String {
    "bson".to_string()
}

fn default_concurrency() -> usize {
    64
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            timeout: default_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_path: None,
            timestamps: default_log_timestamps(),
        }
    }
}

impl Default for BackupDefaults {
    fn default() -> Self {
        Self {
            parser: default_parser(),
            metadata: false,
            parallel_cursors: 0,
            concurrency: default_concurrency(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Result<Config>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigError::FileNotFound(path.display().to_string()),
            _ => ConfigError::InvalidFormat(format!("{}: {e}", path.display())),
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFormat(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    /// Load configuration from an explicit path or the default location
    ///
    /// An explicitly given file must exist. A missing default file falls
    /// back to built-in defaults.
    pub fn load_from_file(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = Self::default_path();
                if default.exists() {
                    Self::from_file(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".mongo-backup")
            .join("config.toml")
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.connection.timeout == 0 {
            return Err(ConfigError::InvalidValue {
                field: "connection.timeout".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if !matches!(self.backup.parser.as_str(), "json" | "bson") {
            return Err(ConfigError::InvalidValue {
                field: "backup.parser".to_string(),
                value: self.backup.parser.clone(),
            }
            .into());
        }
        if self.backup.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "backup.concurrency".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Get connection timeout as Duration
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection.timeout)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidFormat(e.to_string()).into())
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.connection.uri, "mongodb://localhost:27017");
        assert_eq!(config.backup.parser, "bson");
        assert!(!config.backup.metadata);
        assert_eq!(config.logging.level, LogLevel::Warn);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_connection_timeout() {
        let config = Config::default();
        assert_eq!(config.connection_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[backup]\nparser = \"json\"\nmetadata = true").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.backup.parser, "json");
        assert!(config.backup.metadata);
        assert_eq!(config.backup.concurrency, 64);
        assert_eq!(config.connection.timeout, 30);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = Config::load_from_file(Some(Path::new("/nonexistent/backup.toml")));
        assert!(matches!(
            result,
            Err(crate::error::BackupError::Config(ConfigError::FileNotFound(_)))
        ));
    }

    #[test]
    fn test_toml_output_parses_back() {
        let mut config = Config::default();
        config.backup.parallel_cursors = 4;

        let text = config.to_toml().unwrap();
        assert!(text.contains("[backup]"));
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.backup.parallel_cursors, 4);
        assert_eq!(parsed.connection.uri, config.connection.uri);
    }

    #[test]
    fn test_validate_rejects_unknown_parser() {
        let mut config = Config::default();
        config.backup.parser = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
