//! Collection selection
//!
//! Decides once per run which collections are exported and how each one is
//! read. The result is an ordered list of [`CollectionTask`]s; a collection
//! requested by name but missing from the source still gets a task, already
//! failed with `CollectionNotFound`, so the rest of the run goes on.

use futures::future::join_all;
use mongodb::bson::Document;
use tracing::info;

use crate::error::Result;
use crate::source::{DocumentSource, is_system_collection};

/// Which collections to export
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// Every non-system collection
    All,
    /// Only these, in this order
    Include(Vec<String>),
    /// Every non-system collection except these
    Exclude(Vec<String>),
}

/// How each selected collection is read
#[derive(Debug, Clone, PartialEq)]
pub enum ReadStrategy {
    /// One cursor honoring the query filter
    Stream(Document),
    /// N unordered cursors over the whole collection, no filter
    Scan(u32),
}

/// One collection to export
#[derive(Debug)]
pub struct CollectionTask {
    pub name: String,
    /// `Err` when the collection could not be resolved
    pub resolution: Result<()>,
}

impl CollectionTask {
    fn ready(name: String) -> Self {
        Self {
            name,
            resolution: Ok(()),
        }
    }
}

/// Selection and read strategy, resolved once at the start of a run
#[derive(Debug, Clone, PartialEq)]
pub struct ExportStrategy {
    pub selection: Selection,
    pub read: ReadStrategy,
}

impl ExportStrategy {
    pub fn new(selection: Selection, read: ReadStrategy) -> Self {
        Self { selection, read }
    }

    /// Produce the tasks for this run
    ///
    /// Listing failures abort the selection. Lookup failures of explicitly
    /// requested collections become failed tasks.
    pub async fn select(&self, source: &dyn DocumentSource) -> Result<Vec<CollectionTask>> {
        let tasks: Vec<CollectionTask> = match &self.selection {
            Selection::All => exportable(source.list_collections().await?, &[])
                .into_iter()
                .map(CollectionTask::ready)
                .collect(),
            Selection::Exclude(excluded) => exportable(source.list_collections().await?, excluded)
                .into_iter()
                .map(CollectionTask::ready)
                .collect(),
            Selection::Include(names) => {
                let names = dedup(names);
                let lookups = join_all(names.iter().map(|n| source.lookup_collection(n))).await;
                names
                    .into_iter()
                    .zip(lookups)
                    .map(|(name, lookup)| CollectionTask {
                        name,
                        resolution: lookup.map(|_| ()),
                    })
                    .collect()
            }
        };

        for task in &tasks {
            info!("select collection {}", task.name);
        }
        Ok(tasks)
    }
}

/// Catalog minus system collections and `excluded`, in catalog order
fn exportable(catalog: Vec<String>, excluded: &[String]) -> Vec<String> {
    catalog
        .into_iter()
        .filter(|name| !is_system_collection(name))
        .filter(|name| !excluded.contains(name))
        .collect()
}

/// Drop repeated names, keeping the first occurrence
fn dedup(names: &[String]) -> Vec<String> {
    let mut seen = Vec::with_capacity(names.len());
    for name in names {
        if !seen.contains(name) {
            seen.push(name.clone());
        }
    }
    seen
}
