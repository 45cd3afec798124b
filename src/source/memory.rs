//! In-memory document source
//!
//! Holds a fixed catalog of collections, documents and index definitions.
//! Failures can be injected per collection to exercise error paths of the
//! export pipeline without a server.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use mongodb::bson::Document;

use crate::error::{BackupError, Result};

use super::{DocumentSource, DocumentStream};

#[derive(Debug, Clone, Default)]
struct MemoryCollection {
    documents: Vec<Document>,
    indexes: Vec<Document>,
    /// Stream fails after yielding this many documents
    fail_after: Option<usize>,
    /// `indexes_of` fails
    fail_indexes: bool,
}

/// Source backed by in-process documents
#[derive(Debug, Clone)]
pub struct MemorySource {
    database: String,
    collections: BTreeMap<String, MemoryCollection>,
    fail_listing: bool,
}

impl MemorySource {
    /// Create an empty source for `database`
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collections: BTreeMap::new(),
            fail_listing: false,
        }
    }

    /// Add a collection holding `documents`
    pub fn with_collection(mut self, name: impl Into<String>, documents: Vec<Document>) -> Self {
        self.collections.entry(name.into()).or_default().documents = documents;
        self
    }

    /// Set the index definitions of a collection
    pub fn with_indexes(mut self, name: impl Into<String>, indexes: Vec<Document>) -> Self {
        self.collections.entry(name.into()).or_default().indexes = indexes;
        self
    }

    /// Make every stream over `name` fail after `after` documents
    pub fn with_stream_failure(mut self, name: impl Into<String>, after: usize) -> Self {
        self.collections.entry(name.into()).or_default().fail_after = Some(after);
        self
    }

    /// Make index lookups on `name` fail
    pub fn with_index_failure(mut self, name: impl Into<String>) -> Self {
        self.collections.entry(name.into()).or_default().fail_indexes = true;
        self
    }

    /// Make collection listing fail
    pub fn with_listing_failure(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    fn get(&self, name: &str) -> Result<&MemoryCollection> {
        self.collections
            .get(name)
            .ok_or_else(|| BackupError::CollectionNotFound(name.to_string()))
    }
}

/// Top-level equality match, the subset of query semantics this source supports
fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(key, value)| doc.get(key) == Some(value))
}

fn into_stream(name: &str, documents: Vec<Document>, fail_after: Option<usize>) -> DocumentStream {
    let items: Vec<Result<Document>> = match fail_after {
        Some(after) => documents
            .into_iter()
            .take(after)
            .map(Ok)
            .chain(std::iter::once(Err(BackupError::Source(format!(
                "cursor on '{name}' was killed"
            )))))
            .collect(),
        None => documents.into_iter().map(Ok).collect(),
    };
    stream::iter(items).boxed()
}

#[async_trait]
impl DocumentSource for MemorySource {
    fn database_name(&self) -> &str {
        &self.database
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        if self.fail_listing {
            return Err(BackupError::Source("listCollections failed".to_string()));
        }
        Ok(self.collections.keys().cloned().collect())
    }

    async fn lookup_collection(&self, name: &str) -> Result<String> {
        self.get(name).map(|_| name.to_string())
    }

    async fn indexes_of(&self, collection: &str) -> Result<Vec<Document>> {
        let coll = self.get(collection)?;
        if coll.fail_indexes {
            return Err(BackupError::Source(format!(
                "listIndexes failed on '{collection}'"
            )));
        }
        Ok(coll.indexes.clone())
    }

    async fn stream_documents(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<DocumentStream> {
        let coll = self.get(collection)?;
        let documents = coll
            .documents
            .iter()
            .filter(|doc| matches_filter(doc, &filter))
            .cloned()
            .collect();
        Ok(into_stream(collection, documents, coll.fail_after))
    }

    async fn parallel_scan(&self, collection: &str, cursors: u32) -> Result<Vec<DocumentStream>> {
        let coll = self.get(collection)?;
        let cursors = cursors.max(1) as usize;

        let mut partitions = vec![Vec::new(); cursors];
        for (i, doc) in coll.documents.iter().enumerate() {
            partitions[i % cursors].push(doc.clone());
        }
        Ok(partitions
            .into_iter()
            .map(|docs| into_stream(collection, docs, coll.fail_after))
            .collect())
    }
}
