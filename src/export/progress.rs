//! Progress tracking for backup runs
//!
//! Counts stored documents and finished collections across all concurrent
//! tasks, optionally rendering a spinner on stderr.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress tracker shared by every collection task of a run
pub struct ProgressTracker {
    /// Documents stored so far
    documents: AtomicU64,
    /// Collections finished so far
    collections: AtomicU64,
    start_time: Instant,
    bar: Option<ProgressBar>,
}

impl ProgressTracker {
    /// Create a new progress tracker
    ///
    /// # Arguments
    /// * `enable_bar` - Whether to display a spinner
    pub fn new(enable_bar: bool) -> Self {
        let bar = enable_bar.then(|| {
            let bar = ProgressBar::new_spinner();
            if let Ok(style) =
                ProgressStyle::default_spinner().template("{spinner:.green} {pos} documents {msg}")
            {
                bar.set_style(style);
            }
            bar
        });

        Self {
            documents: AtomicU64::new(0),
            collections: AtomicU64::new(0),
            start_time: Instant::now(),
            bar,
        }
    }

    /// Count one stored document
    pub fn document_stored(&self) {
        let count = self.documents.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(ref bar) = self.bar {
            bar.set_position(count);

            let elapsed = self.start_time.elapsed().as_secs_f64();
            if elapsed > 0.0 {
                bar.set_message(format!(
                    "({:.0} docs/sec, {} collections done)",
                    count as f64 / elapsed,
                    self.collections.load(Ordering::Relaxed)
                ));
            }
        }
    }

    /// Count one finished collection
    pub fn collection_finished(&self) {
        self.collections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn documents(&self) -> u64 {
        self.documents.load(Ordering::Relaxed)
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    /// Finish and clear the spinner
    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.finish_and_clear();
        }
    }
}
