//! Error handling for backup runs.
//!
//! The taxonomy follows how failures are treated by the export pipeline:
//! - configuration errors are raised before any I/O and abort the run
//! - missing collections, source failures and sink failures fail one
//!   collection task and are folded into the run's aggregated outcome
//! - metadata failures are only logged
//!
//! Driver errors are rendered through [`mongo::ErrorInfo`] so log lines
//! carry the server code and name.

pub mod kinds;
pub mod mongo;

// Re-export commonly used types
pub use kinds::{BackupError, ConfigError, ErrorKind, Result};
pub use mongo::ErrorInfo;
