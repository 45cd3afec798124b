//! Document sources
//!
//! A source exposes the catalog (collection names, index definitions) and
//! the read side (filtered document streams, multi-cursor scans) of one
//! database. The export pipeline only talks to this trait.
//!
//! - [`MongoSource`]: a live database through the MongoDB driver
//! - [`MemorySource`]: an in-process catalog, used for tests and dry runs

use async_trait::async_trait;
use futures::stream::BoxStream;
use mongodb::bson::Document;

use crate::error::Result;

pub mod memory;
pub mod mongo;

pub use memory::MemorySource;
pub use mongo::MongoSource;

/// Stream of documents from one server-side cursor.
///
/// The stream ends after the last document; an `Err` item is terminal.
pub type DocumentStream = BoxStream<'static, Result<Document>>;

/// Prefix reserved for server-managed collections, never exported.
pub const SYSTEM_PREFIX: &str = "system.";

/// Catalog and read access to a single database
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Name of the database being exported
    fn database_name(&self) -> &str;

    /// List every collection in the database
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Resolve a collection by name
    ///
    /// # Returns
    /// * `Result<String>` - The resolved name, or `BackupError::CollectionNotFound`
    async fn lookup_collection(&self, name: &str) -> Result<String>;

    /// Index definitions of a collection, one document per index
    async fn indexes_of(&self, collection: &str) -> Result<Vec<Document>>;

    /// Open a single cursor over the documents matching `filter`
    async fn stream_documents(&self, collection: &str, filter: Document)
    -> Result<DocumentStream>;

    /// Open `cursors` independent, unordered cursors that together cover
    /// the whole collection
    async fn parallel_scan(&self, collection: &str, cursors: u32) -> Result<Vec<DocumentStream>>;

    /// Release the connection. Called once, after every collection finished.
    async fn close(&self) {}
}

/// Whether `name` is a server-managed collection
pub fn is_system_collection(name: &str) -> bool {
    name.starts_with(SYSTEM_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_collections() {
        assert!(is_system_collection("system.indexes"));
        assert!(is_system_collection("system.profile"));
        assert!(!is_system_collection("logins"));
        assert!(!is_system_collection("my.system.notes"));
    }

    #[test]
    fn test_source_trait_object() {
        fn _accepts_source(_source: Box<dyn DocumentSource>) {}
    }
}
