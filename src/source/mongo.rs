//! MongoDB-backed document source

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{self, Document, doc};
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use crate::error::{BackupError, Result};

use super::{DocumentSource, DocumentStream};

/// Source reading from a live MongoDB database
pub struct MongoSource {
    client: Client,
    database: Database,
}

impl MongoSource {
    /// Create a source for `database` on an already connected client
    pub fn new(client: Client, database: &str) -> Self {
        let database = client.database(database);
        Self { client, database }
    }

    fn collection(&self, name: &str) -> Collection<Document> {
        self.database.collection(name)
    }
}

/// Split `total` documents into `cursors` contiguous ranges of `(skip, limit)`.
///
/// The last range has no limit so documents inserted after counting are
/// still read. Returns a single unbounded range when there is nothing to split.
pub(crate) fn scan_ranges(total: u64, cursors: u32) -> Vec<(u64, Option<i64>)> {
    let cursors = u64::from(cursors.max(1));
    let chunk = total.div_ceil(cursors);
    if chunk == 0 || cursors == 1 {
        return vec![(0, None)];
    }

    let mut ranges = Vec::new();
    let mut skip = 0;
    while skip < total {
        let is_last = skip + chunk >= total;
        let limit = if is_last { None } else { Some(chunk as i64) };
        ranges.push((skip, limit));
        skip += chunk;
    }
    ranges
}

#[async_trait]
impl DocumentSource for MongoSource {
    fn database_name(&self) -> &str {
        self.database.name()
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let names = self.database.list_collection_names().await?;
        debug!("Found {} collections in '{}'", names.len(), self.database.name());
        Ok(names)
    }

    async fn lookup_collection(&self, name: &str) -> Result<String> {
        let found = self
            .database
            .list_collection_names()
            .filter(doc! { "name": name })
            .await?;

        if found.iter().any(|n| n == name) {
            Ok(name.to_string())
        } else {
            Err(BackupError::CollectionNotFound(name.to_string()))
        }
    }

    async fn indexes_of(&self, collection: &str) -> Result<Vec<Document>> {
        let mut cursor = self.collection(collection).list_indexes().await?;

        let mut indexes = Vec::new();
        while let Some(index) = cursor.try_next().await? {
            indexes.push(bson::to_document(&index)?);
        }
        Ok(indexes)
    }

    async fn stream_documents(
        &self,
        collection: &str,
        filter: Document,
    ) -> Result<DocumentStream> {
        let cursor = self.collection(collection).find(filter).await?;
        Ok(cursor.map_err(BackupError::from).boxed())
    }

    async fn parallel_scan(&self, collection: &str, cursors: u32) -> Result<Vec<DocumentStream>> {
        let coll = self.collection(collection);
        let total = coll.estimated_document_count().await?;
        let ranges = scan_ranges(total, cursors);
        debug!(
            "Scanning '{}' (~{} documents) with {} cursors",
            collection,
            total,
            ranges.len()
        );

        let mut streams = Vec::with_capacity(ranges.len());
        for (skip, limit) in ranges {
            let find = coll.find(doc! {}).sort(doc! { "_id": 1 }).skip(skip);
            let cursor = match limit {
                Some(limit) => find.limit(limit).await?,
                None => find.await?,
            };
            streams.push(cursor.map_err(BackupError::from).boxed());
        }
        Ok(streams)
    }

    async fn close(&self) {
        info!("db close");
        self.client.clone().shutdown().await;
    }
}
