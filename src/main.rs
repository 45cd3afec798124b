//! mongo-backup
//!
//! Exports the collections of a MongoDB database to a directory tree or a
//! tar archive, one file per document.
//!
//! # Usage
//!
//! ```bash
//! # One JSON file per document under ./dump/shop/<collection>/
//! mongo-backup mongodb://localhost:27017/shop --root dump --parser json
//!
//! # Tar archive of two collections on standard output
//! mongo-backup mongodb://localhost:27017/shop --collections logins,auths --stdout > shop.tar
//! ```

use mongo_backup::cli::CliInterface;
use mongo_backup::{Result, logging};

/// Application entry point
#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Main application logic
///
/// 1. Parse command-line arguments and load configuration
/// 2. Initialize logging
/// 3. Handle subcommands or run the backup
async fn run() -> Result<()> {
    let cli = CliInterface::new()?;

    let logging_config = &cli.config().logging;
    logging::init_console(
        logging_config.level.to_tracing_level(),
        logging_config.timestamps,
    );

    if cli.handle_subcommand()? {
        return Ok(());
    }

    let summary = mongo_backup::run(cli.to_options()?).await?;

    // Standard output may carry the archive
    if !cli.args().quiet {
        eprintln!(
            "Exported {} documents from {} collections of '{}' in {}ms",
            summary.documents, summary.collections, summary.database, summary.elapsed_ms
        );
    }
    Ok(())
}
