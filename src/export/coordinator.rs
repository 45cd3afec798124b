//! Export coordinator for orchestrating per-collection exports
//!
//! For every collection task the coordinator materializes the destination,
//! writes the index metadata alongside the document export, opens the
//! cursor(s) chosen by the read strategy and pipes every document through
//! the encoder into the sink.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::try_join_all;
use futures::TryStreamExt;
use mongodb::bson::Document;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::source::{DocumentSource, DocumentStream};

use super::encoder::{Encoding, file_name};
use super::metadata::MetadataWriter;
use super::progress::ProgressTracker;
use super::selector::{CollectionTask, ReadStrategy};
use super::sink::DocumentStore;

/// Per-run context shared by every collection task
pub struct ExportCoordinator {
    /// Source being exported
    source: Arc<dyn DocumentSource>,
    /// Destination of encoded documents
    sink: Arc<dyn DocumentStore>,
    /// Document encoding
    encoding: Encoding,
    /// Index metadata side channel
    metadata: MetadataWriter,
    /// Filtered stream or multi-cursor scan
    read: ReadStrategy,
    /// Documents in flight per stream
    concurrency: usize,
    /// Progress tracker for user feedback
    tracker: Arc<ProgressTracker>,
}

impl ExportCoordinator {
    /// Create a new export coordinator
    pub fn new(
        source: Arc<dyn DocumentSource>,
        sink: Arc<dyn DocumentStore>,
        encoding: Encoding,
        read: ReadStrategy,
        tracker: Arc<ProgressTracker>,
    ) -> Self {
        Self {
            source,
            sink,
            encoding,
            metadata: MetadataWriter::Disabled,
            read,
            concurrency: 64,
            tracker,
        }
    }

    /// Write index metadata for every collection
    pub fn with_metadata(mut self, metadata: MetadataWriter) -> Self {
        self.metadata = metadata;
        self
    }

    /// Limit the documents encoded and stored concurrently per stream
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    pub fn metadata(&self) -> MetadataWriter {
        self.metadata
    }

    /// Export one collection
    ///
    /// # Returns
    /// * `Result<u64>` - Documents stored, or the error that ended the task
    pub async fn export_collection(&self, task: CollectionTask) -> Result<u64> {
        task.resolution?;
        let name = task.name.as_str();

        let destination = self.sink.add_collection(name).await?;

        let metadata = async {
            if let Err(e) = self
                .metadata
                .write(self.source.as_ref(), self.sink.as_ref(), name)
                .await
            {
                warn!("{}", e);
            }
        };
        let documents = self.export_documents(name, &destination);
        let ((), exported) = futures::join!(metadata, documents);
        let exported = exported?;

        self.tracker.collection_finished();
        info!("collection {} done, {} documents", name, exported);
        Ok(exported)
    }

    /// Open the cursors of a collection and drain all of them
    ///
    /// The first failing cursor ends the task; its siblings are dropped.
    async fn export_documents(&self, name: &str, destination: &Path) -> Result<u64> {
        let streams = match &self.read {
            ReadStrategy::Stream(filter) => {
                vec![self.source.stream_documents(name, filter.clone()).await?]
            }
            ReadStrategy::Scan(cursors) => self.source.parallel_scan(name, *cursors).await?,
        };
        debug!("Reading '{}' through {} cursor(s)", name, streams.len());

        let counts = try_join_all(
            streams
                .into_iter()
                .map(|stream| self.drain(stream, name, destination)),
        )
        .await?;
        Ok(counts.into_iter().sum())
    }

    /// Encode and store every document of one stream
    async fn drain(&self, stream: DocumentStream, name: &str, destination: &Path) -> Result<u64> {
        let stored = &AtomicU64::new(0);

        stream
            .try_for_each_concurrent(self.concurrency, move |doc| async move {
                if self.export_document(doc, name, destination).await? {
                    stored.fetch_add(1, Ordering::Relaxed);
                    self.tracker.document_stored();
                }
                Ok(())
            })
            .await?;

        Ok(stored.load(Ordering::Relaxed))
    }

    /// Returns `false` when the document was skipped
    async fn export_document(&self, doc: Document, name: &str, destination: &Path) -> Result<bool> {
        match &self.encoding {
            Encoding::Builtin(encoder) => {
                let Some(file_name) = file_name(&doc, encoder.extension()) else {
                    debug!("Skipping document without _id in '{}'", name);
                    return Ok(false);
                };
                let bytes = encoder.encode(&doc)?;
                self.sink.store(name, &file_name, bytes).await?;
            }
            Encoding::Custom(custom) => custom.export(doc, destination).await?,
        }
        Ok(true)
    }
}
