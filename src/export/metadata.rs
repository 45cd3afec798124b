//! Index metadata side channel
//!
//! When enabled, each exported collection gets one file under
//! `<database>/.metadata/<collection>` holding a JSON array of its index
//! definitions. Metadata is best-effort: failures are reported to the
//! caller, which only logs them.

use mongodb::bson::Document;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::{BackupError, Result};
use crate::source::DocumentSource;

use super::encoder::document_to_json;
use super::sink::DocumentStore;

/// Reserved directory holding one metadata file per collection
pub const METADATA_DIR: &str = ".metadata";

/// Writes index definitions next to the exported documents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataWriter {
    /// Pass-through, no I/O
    Disabled,
    Enabled,
}

impl MetadataWriter {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            MetadataWriter::Enabled
        } else {
            MetadataWriter::Disabled
        }
    }

    /// Create the `.metadata` area. Called once per run, after `add_database`.
    pub async fn prepare(&self, sink: &dyn DocumentStore) -> Result<()> {
        match self {
            MetadataWriter::Disabled => Ok(()),
            MetadataWriter::Enabled => sink.add_collection(METADATA_DIR).await.map(|_| ()),
        }
    }

    /// Fetch the indexes of `collection` and store them as one record
    pub async fn write(
        &self,
        source: &dyn DocumentSource,
        sink: &dyn DocumentStore,
        collection: &str,
    ) -> Result<()> {
        if *self == MetadataWriter::Disabled {
            return Ok(());
        }

        let indexes = source
            .indexes_of(collection)
            .await
            .map_err(|e| BackupError::Metadata(format!("indexes of '{collection}': {e}")))?;
        let bytes = serialize_indexes(&indexes)
            .map_err(|e| BackupError::Metadata(format!("indexes of '{collection}': {e}")))?;

        debug!("Writing {} index definitions for '{}'", indexes.len(), collection);
        sink.store(METADATA_DIR, collection, bytes)
            .await
            .map_err(|e| BackupError::Metadata(format!("metadata of '{collection}': {e}")))
    }
}

fn serialize_indexes(indexes: &[Document]) -> Result<Vec<u8>> {
    let array: Vec<JsonValue> = indexes.iter().map(document_to_json).collect();
    Ok(serde_json::to_vec(&array)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::sink::DirectorySink;
    use crate::source::MemorySource;
    use mongodb::bson::doc;

    #[tokio::test]
    async fn test_writes_one_record_per_collection() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path());
        let source = MemorySource::new("shop").with_indexes(
            "orders",
            vec![
                doc! { "key": { "_id": 1 }, "name": "_id_" },
                doc! { "key": { "status": 1 }, "name": "status_1" },
            ],
        );

        sink.add_database("shop").await.unwrap();
        let writer = MetadataWriter::new(true);
        writer.prepare(&sink).await.unwrap();
        writer.write(&source, &sink, "orders").await.unwrap();

        let bytes = std::fs::read(tmp.path().join("shop/.metadata/orders")).unwrap();
        let value: JsonValue = serde_json::from_slice(&bytes).unwrap();
        let indexes = value.as_array().unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[1]["name"], "status_1");
    }

    #[tokio::test]
    async fn test_disabled_writer_does_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path());
        let source = MemorySource::new("shop");

        sink.add_database("shop").await.unwrap();
        let writer = MetadataWriter::new(false);
        writer.prepare(&sink).await.unwrap();
        // Unknown collection, but nothing is looked up
        writer.write(&source, &sink, "missing").await.unwrap();

        assert!(!tmp.path().join("shop/.metadata").exists());
    }

    #[tokio::test]
    async fn test_index_failure_is_metadata_error() {
        let tmp = tempfile::tempdir().unwrap();
        let sink = DirectorySink::new(tmp.path());
        let source = MemorySource::new("shop")
            .with_collection("orders", vec![])
            .with_index_failure("orders");

        sink.add_database("shop").await.unwrap();
        let writer = MetadataWriter::new(true);
        writer.prepare(&sink).await.unwrap();

        let err = writer.write(&source, &sink, "orders").await.unwrap_err();
        assert!(matches!(err, BackupError::Metadata(_)));
    }
}
