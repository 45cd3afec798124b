//! Document stores
//!
//! A store places encoded documents at their destination. Both variants
//! share the same lifecycle:
//!
//! `add_database` → `add_collection` (×N) → `store` (×documents) → `close`
//!
//! - [`DirectorySink`]: a real directory tree, one file per document
//! - [`ArchiveSink`]: a tar archive streamed into any `Write` from a
//!   blocking writer thread

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{BackupError, Result};

/// Destination of a backup run
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the database root. Must be called once, before anything else.
    async fn add_database(&self, name: &str) -> Result<()>;

    /// Create the location of a collection
    ///
    /// # Returns
    /// * `Result<PathBuf>` - Where the collection's documents end up
    async fn add_collection(&self, name: &str) -> Result<PathBuf>;

    /// Store one encoded document in a collection added earlier
    async fn store(&self, collection: &str, file_name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Flush and terminate the destination
    async fn close(&self) -> Result<()>;
}

/// Create `path` as a directory
///
/// A regular file in the way is removed and replaced by the directory.
pub(crate) async fn make_dir(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!("make dir at {}", path.display());
            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| BackupError::sink(path, e))
        }
        Err(e) => Err(BackupError::sink(path, e)),
        Ok(meta) if !meta.is_dir() => {
            warn!("path was a file, replacing {}", path.display());
            tokio::fs::remove_file(path)
                .await
                .map_err(|e| BackupError::sink(path, e))?;
            tokio::fs::create_dir(path)
                .await
                .map_err(|e| BackupError::sink(path, e))
        }
        Ok(_) => Ok(()),
    }
}

/// Store writing one file per document under `root/<database>/<collection>/`
pub struct DirectorySink {
    root: PathBuf,
    database: OnceLock<PathBuf>,
}

impl DirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            database: OnceLock::new(),
        }
    }

    fn database_dir(&self) -> Result<&Path> {
        self.database
            .get()
            .map(PathBuf::as_path)
            .ok_or_else(|| BackupError::Generic("database was not added to the sink".into()))
    }
}

#[async_trait]
impl DocumentStore for DirectorySink {
    async fn add_database(&self, name: &str) -> Result<()> {
        make_dir(&self.root).await?;
        let dir = self.root.join(name);
        make_dir(&dir).await?;
        // A second call keeps the first database
        let _ = self.database.set(dir);
        Ok(())
    }

    async fn add_collection(&self, name: &str) -> Result<PathBuf> {
        let dir = self.database_dir()?.join(name);
        make_dir(&dir).await?;
        Ok(dir)
    }

    async fn store(&self, collection: &str, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.database_dir()?.join(collection).join(file_name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| BackupError::sink(&path, e))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Entries queued for the archive writer
const ARCHIVE_QUEUE: usize = 64;

/// Store emitting a tar archive into a writer
///
/// Directories and documents become archive entries rooted at
/// `<database>/`. The tar builder lives on a blocking writer thread fed
/// through a bounded channel, so a slow destination applies backpressure to
/// `store` without stalling the runtime. The archive trailer is written by
/// `close`, after which the writer is flushed and dropped.
pub struct ArchiveSink {
    commands: mpsc::Sender<ArchiveCommand>,
    database: OnceLock<PathBuf>,
}

enum ArchiveCommand {
    /// `data` is `None` for directories
    Append {
        path: PathBuf,
        data: Option<Vec<u8>>,
        done: oneshot::Sender<io::Result<()>>,
    },
    Finish {
        done: oneshot::Sender<io::Result<()>>,
    },
}

impl ArchiveSink {
    /// Start the writer thread. Must be called inside a tokio runtime.
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        let (commands, queue) = mpsc::channel(ARCHIVE_QUEUE);
        tokio::task::spawn_blocking(move || write_archive(tar::Builder::new(writer), queue));
        Self {
            commands,
            database: OnceLock::new(),
        }
    }

    fn database_dir(&self) -> Result<&Path> {
        self.database
            .get()
            .map(PathBuf::as_path)
            .ok_or_else(|| BackupError::Generic("database was not added to the archive".into()))
    }

    /// Queue one entry and wait until it is written
    async fn append(&self, path: PathBuf, data: Option<Vec<u8>>) -> Result<()> {
        let (done, written) = oneshot::channel();
        let command = ArchiveCommand::Append {
            path: path.clone(),
            data,
            done,
        };
        if self.commands.send(command).await.is_err() {
            return Err(archive_closed(&path));
        }
        match written.await {
            Ok(result) => result.map_err(|e| BackupError::sink(&path, e)),
            Err(_) => Err(archive_closed(&path)),
        }
    }
}

fn archive_closed(path: &Path) -> BackupError {
    BackupError::sink(path, io::Error::other("archive is already closed"))
}

/// Writer thread: owns the builder until `Finish` or until every sender is gone
fn write_archive<W: Write>(mut builder: tar::Builder<W>, mut queue: mpsc::Receiver<ArchiveCommand>) {
    while let Some(command) = queue.blocking_recv() {
        match command {
            ArchiveCommand::Append { path, data, done } => {
                let _ = done.send(append_entry(&mut builder, &path, data.as_deref()));
            }
            ArchiveCommand::Finish { done } => {
                let finished = builder.into_inner().and_then(|mut writer| writer.flush());
                let _ = done.send(finished);
                return;
            }
        }
    }
}

fn append_entry<W: Write>(builder: &mut tar::Builder<W>, path: &Path, data: Option<&[u8]>) -> io::Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_mtime(now_secs());
    match data {
        Some(bytes) => {
            header.set_entry_type(tar::EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(bytes.len() as u64);
            builder.append_data(&mut header, path, bytes)
        }
        None => {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
            builder.append_data(&mut header, path, io::empty())
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait]
impl DocumentStore for ArchiveSink {
    async fn add_database(&self, name: &str) -> Result<()> {
        let dir = PathBuf::from(name);
        self.append(dir.clone(), None).await?;
        let _ = self.database.set(dir);
        Ok(())
    }

    async fn add_collection(&self, name: &str) -> Result<PathBuf> {
        let dir = self.database_dir()?.join(name);
        self.append(dir.clone(), None).await?;
        Ok(dir)
    }

    async fn store(&self, collection: &str, file_name: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.database_dir()?.join(collection).join(file_name);
        self.append(path, Some(bytes)).await
    }

    /// A second call finds the writer gone and does nothing
    async fn close(&self) -> Result<()> {
        let (done, finished) = oneshot::channel();
        if self.commands.send(ArchiveCommand::Finish { done }).await.is_err() {
            return Ok(());
        }
        match finished.await {
            Ok(result) => {
                result.map_err(|e| BackupError::sink("<archive>", e))?;
                debug!("Archive finalized");
                Ok(())
            }
            // Writer already finished by an earlier close
            Err(_) => Ok(()),
        }
    }
}
