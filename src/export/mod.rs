//! Backup export pipeline
//!
//! A run goes through these stages:
//! 1. Validate [`BackupOptions`] into a [`RunConfig`] (no I/O yet)
//! 2. Open the source database and the destination store
//! 3. Select collections into tasks
//! 4. Export every task concurrently: metadata, cursors, encode, store
//! 5. Close source and store, fold every outcome, fire the callback once
//!
//! Collection failures never abort sibling collections. The run reports
//! the first error observed; later ones are logged.

pub mod aggregator;
pub mod coordinator;
pub mod encoder;
pub mod metadata;
pub mod options;
pub mod progress;
pub mod selector;
pub mod sink;

pub use aggregator::{OnceCallback, RunTally};
pub use coordinator::ExportCoordinator;
pub use encoder::{BsonEncoder, CustomEncoder, DocumentEncoder, Encoding, JsonEncoder, Parser};
pub use metadata::{METADATA_DIR, MetadataWriter};
pub use options::{BackupOptions, Callback, Destination, OutputStream, RunConfig};
pub use progress::ProgressTracker;
pub use selector::{CollectionTask, ExportStrategy, ReadStrategy, Selection};
pub use sink::{ArchiveSink, DirectorySink, DocumentStore};

use std::io::BufWriter;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::instrument::WithSubscriber;
use tracing::{Level, debug, error, info, warn};

use crate::connection::ConnectionManager;
use crate::error::{BackupError, ConfigError, Result};
use crate::logging;
use crate::source::{DocumentSource, MongoSource};

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct BackupSummary {
    /// Exported database
    pub database: String,
    /// Collections selected for export
    pub collections: usize,
    /// Collections that failed
    pub failed: usize,
    /// Documents stored
    pub documents: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Export a MongoDB database
///
/// Configuration errors are returned before any I/O and do not invoke the
/// callback. Any later failure invokes the callback with the first error
/// observed and is returned as well.
pub async fn run(options: BackupOptions) -> Result<BackupSummary> {
    drive(options, None).await
}

/// Export from an already opened source
///
/// The URI and database of `options` are validated but not used; the
/// source decides which database is exported.
pub async fn run_with_source(
    options: BackupOptions,
    source: Arc<dyn DocumentSource>,
) -> Result<BackupSummary> {
    drive(options, Some(source)).await
}

async fn drive(
    options: BackupOptions,
    source: Option<Arc<dyn DocumentSource>>,
) -> Result<BackupSummary> {
    let (config, callback) = options.into_run()?;
    let mut callback = OnceCallback::new(callback);

    let subscriber = match config
        .logger
        .as_deref()
        .map(|path| logging::file_subscriber(path, Level::INFO))
        .transpose()
    {
        Ok(subscriber) => subscriber,
        Err(e) => {
            callback.fire(Some(&e));
            return Err(e);
        }
    };

    let job = execute(config, source, callback);
    match subscriber {
        Some(subscriber) => job.with_subscriber(subscriber).await,
        None => job.await,
    }
}

async fn execute(
    config: RunConfig,
    source: Option<Arc<dyn DocumentSource>>,
    mut callback: OnceCallback,
) -> Result<BackupSummary> {
    info!("backup start");

    let outcome = match source {
        Some(source) => export(config, source).await,
        None => match connect(&config).await {
            Ok(source) => export(config, source).await,
            Err(e) => Err(e),
        },
    };

    info!("callback run");
    callback.fire(outcome.as_ref().err());

    match &outcome {
        Ok(summary) => info!(
            "backup stop, {} documents from {} collections in {}ms",
            summary.documents, summary.collections, summary.elapsed_ms
        ),
        Err(e) => error!("backup stop: {}", e),
    }
    outcome
}

/// Open the database named by the options or by the connection string
async fn connect(config: &RunConfig) -> Result<Arc<dyn DocumentSource>> {
    let mut manager = ConnectionManager::new(config.uri.clone(), config.timeout);
    manager.connect().await?;

    let database = config
        .database
        .clone()
        .or_else(|| manager.default_database().map(str::to_string))
        .ok_or_else(|| ConfigError::MissingField("database".to_string()))?;

    let client = manager.get_client()?.clone();
    Ok(Arc::new(MongoSource::new(client, &database)))
}

/// Open the store for a destination
async fn open_sink(destination: Destination) -> Result<Arc<dyn DocumentStore>> {
    match destination {
        Destination::Directory { root } => Ok(Arc::new(DirectorySink::new(root))),
        Destination::TarFile { root, name } => {
            sink::make_dir(&root).await?;
            let path = root.join(&name);
            info!("make tar file at {}", path.display());
            let file = tokio::fs::File::create(&path)
                .await
                .map_err(|e| BackupError::sink(&path, e))?;
            // Written from the archive's blocking thread
            let file = file.into_std().await;
            Ok(Arc::new(ArchiveSink::new(BufWriter::new(file))))
        }
        Destination::Stream(stream) => {
            info!("make tar stream");
            Ok(Arc::new(ArchiveSink::new(stream)))
        }
    }
}

async fn export(config: RunConfig, source: Arc<dyn DocumentSource>) -> Result<BackupSummary> {
    let started_at = Utc::now();
    let database = source.database_name().to_string();

    let RunConfig {
        destination,
        parser,
        strategy,
        metadata,
        concurrency,
        progress,
        ..
    } = config;

    let sink = match open_sink(destination).await {
        Ok(sink) => sink,
        Err(e) => {
            source.close().await;
            return Err(e);
        }
    };

    let tracker = Arc::new(ProgressTracker::new(progress));
    let coordinator = ExportCoordinator::new(
        Arc::clone(&source),
        Arc::clone(&sink),
        Encoding::from(&parser),
        strategy.read.clone(),
        Arc::clone(&tracker),
    )
    .with_metadata(MetadataWriter::new(metadata))
    .with_concurrency(concurrency);

    let outcome = async {
        sink.add_database(&database).await?;
        if let Err(e) = coordinator.metadata().prepare(sink.as_ref()).await {
            warn!("{}", e);
        }
        let tasks = strategy.select(source.as_ref()).await?;
        Ok::<_, BackupError>(export_tasks(&coordinator, tasks).await)
    }
    .await;

    source.close().await;

    let mut tally = match outcome {
        Ok(tally) => tally,
        Err(e) => {
            let mut tally = RunTally::new(0);
            tally.record_run_error(e);
            tally
        }
    };
    if let Err(e) = sink.close().await {
        error!("unable to close destination: {}", e);
        tally.record_run_error(e);
    }
    tracker.finish();

    let summary = BackupSummary {
        database,
        collections: tally.expected(),
        failed: tally.failed(),
        documents: tracker.documents(),
        started_at,
        elapsed_ms: tracker.elapsed_ms(),
    };
    match tally.into_error() {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}

/// Run every task concurrently and fold the outcomes as they arrive
async fn export_tasks(coordinator: &ExportCoordinator, tasks: Vec<CollectionTask>) -> RunTally {
    let mut tally = RunTally::new(tasks.len());
    if tally.is_finished() {
        info!("no collections selected");
        return tally;
    }

    let mut pending: FuturesUnordered<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(id, task)| async move {
            let name = task.name.clone();
            (id, name, coordinator.export_collection(task).await)
        })
        .collect();

    while let Some((id, name, outcome)) = pending.next().await {
        if let Err(e) = &outcome {
            error!("collection {} failed: {}", name, e);
        }
        if tally.complete(id, outcome.map(|_| ())) {
            debug!("All {} collections reported", tally.expected());
        }
    }
    tally
}
