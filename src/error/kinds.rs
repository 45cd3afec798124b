use std::path::PathBuf;
use std::{fmt, io};

use crate::error::mongo::format_mongodb_error;

/// Crate-wide `Result` type using [`BackupError`] as the error.
///
/// This alias is re-exported by the parent `error` module and is intended
/// to be used throughout the crate for fallible operations.
pub type Result<T> = std::result::Result<T, BackupError>;

/// Top-level error type for backup runs.
#[derive(Debug)]
pub enum BackupError {
    /// Invalid or incomplete run configuration. Raised before any I/O.
    Config(ConfigError),

    /// A collection named in the include list does not exist in the source.
    CollectionNotFound(String),

    /// Listing, streaming or scanning the source failed.
    Source(String),

    /// Writing to the sink failed (directory creation, file write, archive entry).
    Sink { path: PathBuf, source: io::Error },

    /// Fetching or writing index metadata failed. Logged only, never fails a task.
    Metadata(String),

    /// A document could not be encoded.
    Encode(String),

    /// I/O errors outside the sink (config files, log files).
    Io(io::Error),

    /// MongoDB driver errors.
    MongoDb(mongodb::error::Error),

    /// Generic error with a free-form message.
    Generic(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },

    /// Two options that cannot be combined were both set.
    Conflict { first: String, second: String },
}

/// Coarse category of a [`BackupError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    CollectionNotFound,
    SourceIo,
    SinkIo,
    Metadata,
    Other,
}

impl BackupError {
    /// Wrap an I/O error raised while writing to `path`.
    pub fn sink(path: impl Into<PathBuf>, source: io::Error) -> Self {
        BackupError::Sink {
            path: path.into(),
            source,
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Config(_) => ErrorKind::Configuration,
            BackupError::CollectionNotFound(_) => ErrorKind::CollectionNotFound,
            BackupError::Source(_) | BackupError::MongoDb(_) => ErrorKind::SourceIo,
            BackupError::Sink { .. } => ErrorKind::SinkIo,
            BackupError::Metadata(_) => ErrorKind::Metadata,
            BackupError::Encode(_) | BackupError::Io(_) | BackupError::Generic(_) => {
                ErrorKind::Other
            }
        }
    }
}

/* ========================= Display & Error impls ========================= */

impl fmt::Display for BackupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupError::Config(e) => write!(f, "Configuration error: {e}"),
            BackupError::CollectionNotFound(name) => {
                write!(f, "Collection {name} does not exist")
            }
            BackupError::Source(msg) => write!(f, "Source error: {msg}"),
            BackupError::Sink { path, source } => {
                write!(f, "Write error at {}: {source}", path.display())
            }
            BackupError::Metadata(msg) => write!(f, "Metadata error: {msg}"),
            BackupError::Encode(msg) => write!(f, "Encode error: {msg}"),
            BackupError::Io(e) => write!(f, "I/O error: {e}"),
            BackupError::MongoDb(e) => format_mongodb_error(f, e),
            BackupError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "missing {field} option"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
            ConfigError::Conflict { first, second } => {
                write!(f, "Options '{first}' and '{second}' cannot be used together")
            }
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Config(e) => Some(e),
            BackupError::Sink { source, .. } => Some(source),
            BackupError::Io(e) => Some(e),
            BackupError::MongoDb(e) => Some(e),
            _ => None,
        }
    }
}

impl std::error::Error for ConfigError {}

/* ========================= Conversions to BackupError ========================= */

impl From<io::Error> for BackupError {
    fn from(err: io::Error) -> Self {
        BackupError::Io(err)
    }
}

impl From<mongodb::error::Error> for BackupError {
    fn from(err: mongodb::error::Error) -> Self {
        BackupError::MongoDb(err)
    }
}

impl From<ConfigError> for BackupError {
    fn from(err: ConfigError) -> Self {
        BackupError::Config(err)
    }
}

impl From<bson::ser::Error> for BackupError {
    fn from(err: bson::ser::Error) -> Self {
        BackupError::Encode(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::Encode(err.to_string())
    }
}
