//! Command-line interface for mongo-backup
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and validation
//! - Merging arguments over configuration into [`BackupOptions`]

use clap::{Parser, Subcommand};
use mongodb::bson::{Bson, Document};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, LogLevel};
use crate::error::{ConfigError, Result};
use crate::export::{BackupOptions, Parser as DocumentParser};

/// Export MongoDB collections to files or a tar archive
#[derive(Parser, Debug)]
#[command(
    name = "mongo-backup",
    version,
    about = "Export MongoDB collections to files or a tar archive",
    long_about = "Exports every document of the selected collections of a MongoDB database
as one file per document, into a directory tree or a tar archive."
)]
pub struct CliArgs {
    /// MongoDB connection URI
    ///
    /// Format: mongodb://[username:password@]host[:port][/database][?options]
    #[arg(value_name = "URI")]
    pub uri: Option<String>,

    /// Destination root directory
    #[arg(short = 'r', long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Database to export (defaults to the database of the URI)
    #[arg(long, value_name = "NAME")]
    pub database: Option<String>,

    /// Document encoding (json, bson)
    #[arg(long, value_name = "FORMAT")]
    pub parser: Option<String>,

    /// Only export these collections (comma separated)
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub collections: Option<Vec<String>>,

    /// Export every collection except these (comma separated)
    #[arg(long, value_name = "NAMES", value_delimiter = ',')]
    pub exclude: Option<Vec<String>>,

    /// Only export documents matching this JSON filter
    #[arg(long, value_name = "JSON")]
    pub query: Option<String>,

    /// Read each collection through N parallel cursors
    #[arg(long = "parallel", value_name = "N")]
    pub parallel_cursors: Option<u32>,

    /// Write a tar archive with this name under the root directory
    #[arg(long, value_name = "NAME")]
    pub tar: Option<String>,

    /// Write a tar archive to standard output
    #[arg(long)]
    pub stdout: bool,

    /// Write index definitions to .metadata
    #[arg(long)]
    pub metadata: bool,

    /// Write the run's log lines to this file
    #[arg(long = "log", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Show a progress spinner
    #[arg(long)]
    pub progress: bool,

    /// Documents encoded and stored concurrently per stream
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Very verbose mode (debug logging)
    #[arg(long = "vv")]
    pub very_verbose: bool,

    /// Connection timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands for mongo-backup
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Validate configuration file
        #[arg(long)]
        validate: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface
    pub fn new() -> Result<Self> {
        let args = CliArgs::parse();
        let config = Self::load_config(&args)?;

        Ok(Self { args, config })
    }

    /// Load configuration from file and merge with arguments
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from_file(args.config_file.as_deref())?;

        if let Err(e) = config.validate() {
            eprintln!("Warning: Configuration validation failed: {}", e);
            eprintln!("Using default configuration instead.");
            config = Config::default();
        }

        Self::apply_args_to_config(&mut config, args);

        Ok(config)
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the CLI arguments
    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Get the MongoDB connection URI
    ///
    /// The explicit argument wins over the configured default.
    pub fn get_connection_uri(&self) -> String {
        self.args
            .uri
            .clone()
            .unwrap_or_else(|| self.config.connection.uri.clone())
    }

    /// Build the options of a backup run
    ///
    /// Arguments override the `[backup]` defaults of the configuration.
    pub fn to_options(&self) -> Result<BackupOptions> {
        let args = &self.args;
        let defaults = &self.config.backup;

        let parser: DocumentParser = args
            .parser
            .as_deref()
            .unwrap_or(defaults.parser.as_str())
            .parse()?;

        let mut options = BackupOptions::new(self.get_connection_uri())
            .parser(parser)
            .metadata(args.metadata || defaults.metadata)
            .concurrency(args.concurrency.unwrap_or(defaults.concurrency))
            .timeout(self.config.connection_timeout())
            .progress(args.progress);

        if let Some(database) = &args.database {
            options = options.database(database.clone());
        }
        if let Some(root) = &args.root {
            options = options.root(root.clone());
        }
        if args.stdout {
            options = options.stream(std::io::stdout());
        }
        if let Some(tar) = &args.tar {
            options = options.tar(tar.clone());
        }
        if let Some(names) = &args.collections {
            options = options.collections(names.iter().cloned());
        }
        if let Some(names) = &args.exclude {
            options = options.exclude(names.iter().cloned());
        }
        if let Some(log_file) = args.log_file.as_ref().or(self.config.logging.file_path.as_ref()) {
            options = options.logger(log_file.clone());
        }

        match (&args.query, args.parallel_cursors) {
            (Some(query), cursors) => {
                options = options.query(parse_query(query)?);
                // A configured scan never overrides an explicit query
                if let Some(cursors) = cursors {
                    options = options.parallel_cursors(cursors);
                }
            }
            (None, cursors) => {
                let cursors = cursors.unwrap_or(defaults.parallel_cursors);
                if cursors > 0 {
                    options = options.parallel_cursors(cursors);
                }
            }
        }

        Ok(options)
    }

    /// Apply CLI arguments to configuration
    fn apply_args_to_config(config: &mut Config, args: &CliArgs) {
        Self::apply_logging_args(config, args);
        Self::apply_connection_args(config, args);
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    /// Apply connection-related CLI arguments to configuration
    fn apply_connection_args(config: &mut Config, args: &CliArgs) {
        if let Some(timeout) = args.timeout {
            config.connection.timeout = timeout;
        }
    }

    /// Handle subcommands
    ///
    /// # Returns
    /// * `Result<bool>` - True if subcommand was handled, false to continue
    pub fn handle_subcommand(&self) -> Result<bool> {
        match &self.args.command {
            Some(Commands::Config { show, validate }) => {
                self.handle_config_command(*show, *validate)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Handle config subcommand
    fn handle_config_command(&self, show: bool, validate: bool) -> Result<()> {
        if validate {
            self.validate_config_file();
        }

        if show {
            self.show_config()?;
        }

        Ok(())
    }

    /// Validate configuration file
    fn validate_config_file(&self) {
        let path = self.get_config_path();
        println!("Validating configuration file: {}", path.display());

        if !path.exists() {
            println!("Configuration file does not exist");
            return;
        }

        match Config::from_file(&path) {
            Ok(config) => match config.validate() {
                Ok(_) => println!("Configuration is valid"),
                Err(e) => println!("Configuration validation failed: {}", e),
            },
            Err(e) => println!("Failed to load configuration: {}", e),
        }
    }

    /// Show effective configuration
    fn show_config(&self) -> Result<()> {
        println!("# Configuration file: {}", self.get_config_path().display());
        println!();
        println!("{}", self.config.to_toml()?);
        Ok(())
    }

    /// Get configuration file path (from args or default)
    fn get_config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }
}

/// Parse a JSON filter, extended JSON included
fn parse_query(text: &str) -> Result<Document> {
    let invalid = || ConfigError::InvalidValue {
        field: "query".to_string(),
        value: text.to_string(),
    };

    let json: serde_json::Value = serde_json::from_str(text).map_err(|_| invalid())?;
    match Bson::try_from(json).map_err(|_| invalid())? {
        Bson::Document(doc) => Ok(doc),
        _ => Err(invalid().into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackupError;

    fn cli(argv: &[&str]) -> CliInterface {
        let args = CliArgs::try_parse_from(argv).unwrap();
        let mut config = Config::default();
        CliInterface::apply_args_to_config(&mut config, &args);
        CliInterface { args, config }
    }

    #[test]
    fn test_cli_args_parsing() {
        let args = CliArgs::try_parse_from(["mongo-backup"]).unwrap();
        assert!(args.uri.is_none());
        assert!(args.collections.is_none());
        assert!(!args.stdout);
    }

    #[test]
    fn test_collection_lists_are_comma_separated() {
        let args = CliArgs::try_parse_from(["mongo-backup", "--collections", "logins,auths"]).unwrap();
        assert_eq!(
            args.collections,
            Some(vec!["logins".to_string(), "auths".to_string()])
        );
    }

    #[test]
    fn test_get_connection_uri_prefers_explicit_uri() {
        let explicit = cli(&["mongo-backup", "mongodb://db.local/shop"]);
        assert_eq!(explicit.get_connection_uri(), "mongodb://db.local/shop");

        let configured = cli(&["mongo-backup"]);
        assert_eq!(configured.get_connection_uri(), "mongodb://localhost:27017");
    }

    #[test]
    fn test_verbosity_overrides_config() {
        assert_eq!(cli(&["mongo-backup", "-v"]).config().logging.level, LogLevel::Debug);
        assert_eq!(cli(&["mongo-backup", "--vv"]).config().logging.level, LogLevel::Trace);
        assert_eq!(cli(&["mongo-backup", "-q"]).config().logging.level, LogLevel::Error);
    }

    #[test]
    fn test_timeout_override() {
        let cli = cli(&["mongo-backup", "--timeout", "5"]);
        assert_eq!(cli.config().connection_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_options_from_arguments() {
        let cli = cli(&[
            "mongo-backup",
            "mongodb://localhost/shop",
            "--root",
            "dump",
            "--parser",
            "json",
            "--exclude",
            "sessions",
            "--parallel",
            "4",
        ]);
        let (config, _) = cli.to_options().unwrap().into_run().unwrap();

        assert_eq!(config.uri, "mongodb://localhost/shop");
        assert!(matches!(config.parser, DocumentParser::Json));
        assert_eq!(
            config.strategy.selection,
            crate::export::Selection::Exclude(vec!["sessions".to_string()])
        );
        assert_eq!(config.strategy.read, crate::export::ReadStrategy::Scan(4));
    }

    #[test]
    fn test_query_and_parallel_conflict_is_reported() {
        let cli = cli(&[
            "mongo-backup",
            "--root",
            "dump",
            "--query",
            r#"{"active": true}"#,
            "--parallel",
            "2",
        ]);
        let err = cli.to_options().unwrap().into_run().err().unwrap();
        assert!(matches!(err, BackupError::Config(ConfigError::Conflict { .. })));
    }

    #[test]
    fn test_configured_scan_yields_to_query() {
        let args = CliArgs::try_parse_from([
            "mongo-backup",
            "--root",
            "dump",
            "--query",
            r#"{"status": "open"}"#,
        ])
        .unwrap();
        let mut config = Config::default();
        config.backup.parallel_cursors = 8;
        let cli = CliInterface { args, config };

        let (run, _) = cli.to_options().unwrap().into_run().unwrap();
        assert!(matches!(run.strategy.read, crate::export::ReadStrategy::Stream(ref q) if q.contains_key("status")));
    }

    #[test]
    fn test_parse_query() {
        let doc = parse_query(r#"{"age": {"$gt": 21}}"#).unwrap();
        assert!(doc.get_document("age").unwrap().contains_key("$gt"));

        assert!(parse_query("[1, 2]").is_err());
        assert!(parse_query("{not json").is_err());
    }

    #[test]
    fn test_unknown_parser_is_rejected() {
        let cli = cli(&["mongo-backup", "--root", "dump", "--parser", "xml"]);
        assert!(cli.to_options().is_err());
    }
}
