//! MongoDB Backup Library
//!
//! Exports the collections of a MongoDB database to a directory tree or a
//! tar archive, one file per document, optionally with the index
//! definitions of every collection.
//!
//! # Modules
//!
//! - `cli`: Command-line interface and argument parsing
//! - `config`: Configuration management
//! - `connection`: MongoDB connection management
//! - `error`: Error types and handling
//! - `export`: Backup pipeline (selection, encoding, stores, aggregation)
//! - `logging`: Console and per-run log subscribers
//! - `source`: Document sources (MongoDB, in-memory)
//!
//! # Example
//!
//! ```no_run
//! use mongo_backup::{BackupOptions, Parser};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = BackupOptions::new("mongodb://localhost:27017/shop")
//!         .root("/var/backups")
//!         .parser(Parser::Json)
//!         .callback(|err| match err {
//!             Some(e) => eprintln!("backup failed: {e}"),
//!             None => println!("backup done"),
//!         });
//!
//!     let summary = mongo_backup::run(options).await?;
//!     println!("{} documents", summary.documents);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod connection;
pub mod error;
pub mod export;
pub mod logging;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use connection::ConnectionManager;
pub use error::{BackupError, ConfigError, ErrorKind, Result};
pub use export::{
    BackupOptions, BackupSummary, CustomEncoder, Parser, run, run_with_source,
};
pub use source::{DocumentSource, MemorySource, MongoSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
pub fn version() -> &'static str {
    VERSION
}
