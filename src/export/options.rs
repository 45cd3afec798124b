//! Run configuration
//!
//! [`BackupOptions`] is the caller-facing builder. [`BackupOptions::into_run`]
//! validates it once, before any I/O, and splits it into the immutable
//! [`RunConfig`] and the terminal callback.

use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use mongodb::bson::Document;

use crate::error::{BackupError, ConfigError, Result};

use super::encoder::Parser;
use super::selector::{ExportStrategy, ReadStrategy, Selection};

/// Terminal callback, invoked once with the run's first error (or `None`)
pub type Callback = Box<dyn FnOnce(Option<&BackupError>) + Send>;

/// Output stream receiving a tar archive
pub type OutputStream = Box<dyn Write + Send>;

/// Where exported documents go
pub enum Destination {
    /// One file per document under `root/<database>/<collection>/`
    Directory { root: PathBuf },
    /// A tar archive written to `root/<name>`
    TarFile { root: PathBuf, name: String },
    /// A tar archive written to a caller-provided stream
    Stream(OutputStream),
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Directory { root } => f.debug_struct("Directory").field("root", root).finish(),
            Destination::TarFile { root, name } => f
                .debug_struct("TarFile")
                .field("root", root)
                .field("name", name)
                .finish(),
            Destination::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Options for one backup run
///
/// # Example
///
/// ```no_run
/// use mongo_backup::{BackupOptions, Parser};
///
/// # async fn example() -> mongo_backup::Result<()> {
/// let options = BackupOptions::new("mongodb://localhost:27017/shop")
///     .root("/var/backups")
///     .parser(Parser::Json)
///     .collections(["logins", "auths"])
///     .metadata(true);
/// mongo_backup::run(options).await?;
/// # Ok(())
/// # }
/// ```
pub struct BackupOptions {
    uri: Option<String>,
    database: Option<String>,
    root: Option<PathBuf>,
    stream: Option<OutputStream>,
    tar: Option<String>,
    parser: Parser,
    collections: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
    query: Option<Document>,
    parallel_cursors: Option<u32>,
    metadata: bool,
    logger: Option<PathBuf>,
    concurrency: usize,
    timeout: Duration,
    progress: bool,
    callback: Option<Callback>,
}

/// Validated, immutable configuration of one run
#[derive(Debug)]
pub struct RunConfig {
    pub uri: String,
    /// Explicit database; falls back to the URI's default database
    pub database: Option<String>,
    pub destination: Destination,
    pub parser: Parser,
    pub strategy: ExportStrategy,
    pub metadata: bool,
    pub logger: Option<PathBuf>,
    pub concurrency: usize,
    pub timeout: Duration,
    pub progress: bool,
}

impl BackupOptions {
    /// Start building options for the given connection string
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Database to export, overriding the one named in the URI
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    /// Destination root directory
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Write a tar archive to `stream` instead of a directory tree
    pub fn stream(mut self, stream: impl Write + Send + 'static) -> Self {
        self.stream = Some(Box::new(stream));
        self
    }

    /// Package the export as `root/<name>`
    pub fn tar(mut self, name: impl Into<String>) -> Self {
        self.tar = Some(name.into());
        self
    }

    pub fn parser(mut self, parser: Parser) -> Self {
        self.parser = parser;
        self
    }

    /// Export only these collections
    pub fn collections<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Export every collection except these
    pub fn exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Only export documents matching `query`
    pub fn query(mut self, query: Document) -> Self {
        self.query = Some(query);
        self
    }

    /// Read each collection through `cursors` parallel cursors
    pub fn parallel_cursors(mut self, cursors: u32) -> Self {
        self.parallel_cursors = Some(cursors);
        self
    }

    /// Write index definitions to `.metadata`
    pub fn metadata(mut self, enabled: bool) -> Self {
        self.metadata = enabled;
        self
    }

    /// Write this run's log lines to `path`
    pub fn logger(mut self, path: impl Into<PathBuf>) -> Self {
        self.logger = Some(path.into());
        self
    }

    /// Documents encoded and stored concurrently per stream
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// Connect and server selection timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Show a progress spinner on stderr
    pub fn progress(mut self, enabled: bool) -> Self {
        self.progress = enabled;
        self
    }

    /// Invoked once when the run completes
    pub fn callback(mut self, callback: impl FnOnce(Option<&BackupError>) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Validate the options and split off the callback
    pub fn into_run(self) -> Result<(RunConfig, Option<Callback>)> {
        let uri = match self.uri {
            Some(uri) if !uri.trim().is_empty() => uri,
            _ => return Err(ConfigError::MissingField("uri".to_string()).into()),
        };

        let destination = match (self.stream, self.root, self.tar) {
            (Some(stream), _, _) => Destination::Stream(stream),
            (None, None, _) => return Err(ConfigError::MissingField("root".to_string()).into()),
            (None, Some(_), Some(name)) if name.trim().is_empty() => {
                return Err(ConfigError::InvalidValue {
                    field: "tar".to_string(),
                    value: name,
                }
                .into());
            }
            (None, Some(root), Some(name)) => Destination::TarFile { root, name },
            (None, Some(root), None) => Destination::Directory { root },
        };

        let selection = match (self.collections, self.exclude) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Conflict {
                    first: "collections".to_string(),
                    second: "exclude".to_string(),
                }
                .into());
            }
            (Some(names), None) => Selection::Include(names),
            (None, Some(names)) => Selection::Exclude(names),
            (None, None) => Selection::All,
        };

        let read = match (self.query, self.parallel_cursors.filter(|n| *n > 0)) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Conflict {
                    first: "query".to_string(),
                    second: "parallel_cursors".to_string(),
                }
                .into());
            }
            (None, Some(cursors)) => ReadStrategy::Scan(cursors),
            (query, None) => ReadStrategy::Stream(query.unwrap_or_default()),
        };

        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "concurrency".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        let config = RunConfig {
            uri,
            database: self.database,
            destination,
            parser: self.parser,
            strategy: ExportStrategy::new(selection, read),
            metadata: self.metadata,
            logger: self.logger,
            concurrency: self.concurrency,
            timeout: self.timeout,
            progress: self.progress,
        };
        Ok((config, self.callback))
    }
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            uri: None,
            database: None,
            root: None,
            stream: None,
            tar: None,
            parser: Parser::Bson,
            collections: None,
            exclude: None,
            query: None,
            parallel_cursors: None,
            metadata: false,
            logger: None,
            concurrency: 64,
            timeout: Duration::from_secs(30),
            progress: false,
            callback: None,
        }
    }
}
