//! Run aggregation
//!
//! Folds the outcome of every collection task into a single result. The
//! first error wins; later errors are logged and counted but not returned.
//! Completion signals are idempotent per task.

use tracing::{error, warn};

use crate::error::{BackupError, Result};

use super::options::Callback;

/// Completion counter for one run
#[derive(Debug)]
pub struct RunTally {
    expected: usize,
    completed: usize,
    done: Vec<bool>,
    first_error: Option<BackupError>,
    failed: usize,
}

impl RunTally {
    /// Tally for `expected` tasks, identified by `0..expected`
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            completed: 0,
            done: vec![false; expected],
            first_error: None,
            failed: 0,
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    /// Number of tasks that completed with an error
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Every task has reported. True immediately for an empty run.
    pub fn is_finished(&self) -> bool {
        self.completed == self.expected
    }

    /// Record the outcome of task `task`
    ///
    /// Only the first signal of a task counts. Returns `true` when this
    /// signal finished the run.
    pub fn complete(&mut self, task: usize, outcome: Result<()>) -> bool {
        let Some(done) = self.done.get_mut(task) else {
            error!("completion for unknown task #{} of {}", task, self.expected);
            return false;
        };
        if *done {
            warn!("duplicate completion for task #{}, ignored", task);
            return false;
        }
        *done = true;
        self.completed += 1;
        debug_assert!(self.completed <= self.expected);

        if let Err(e) = outcome {
            self.failed += 1;
            match self.first_error {
                None => self.first_error = Some(e),
                Some(_) => warn!("additional error: {}", e),
            }
        }
        self.is_finished()
    }

    /// Fold a failure that does not belong to any task (e.g. closing the sink)
    pub fn record_run_error(&mut self, e: BackupError) {
        match self.first_error {
            None => self.first_error = Some(e),
            Some(_) => warn!("additional error: {}", e),
        }
    }

    /// The retained first error, if any
    pub fn error(&self) -> Option<&BackupError> {
        self.first_error.as_ref()
    }

    pub fn into_error(self) -> Option<BackupError> {
        self.first_error
    }
}

/// Terminal callback that fires at most once
pub struct OnceCallback(Option<Callback>);

impl OnceCallback {
    pub fn new(callback: Option<Callback>) -> Self {
        Self(callback)
    }

    /// Invoke the callback; later calls do nothing
    pub fn fire(&mut self, error: Option<&BackupError>) {
        if let Some(callback) = self.0.take() {
            callback(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_empty_run_is_finished() {
        let tally = RunTally::new(0);
        assert!(tally.is_finished());
        assert!(tally.error().is_none());
    }

    #[test]
    fn test_out_of_order_completion() {
        let mut tally = RunTally::new(3);
        assert!(!tally.complete(2, Ok(())));
        assert!(!tally.complete(0, Ok(())));
        assert!(tally.complete(1, Ok(())));
        assert_eq!(tally.completed(), 3);
        assert!(tally.into_error().is_none());
    }

    #[test]
    fn test_duplicate_completion_is_ignored() {
        let mut tally = RunTally::new(2);
        assert!(!tally.complete(0, Ok(())));
        assert!(!tally.complete(0, Err(BackupError::Source("late".into()))));
        assert_eq!(tally.completed(), 1);
        assert_eq!(tally.failed(), 0);
        assert!(tally.complete(1, Ok(())));
        assert!(!tally.complete(7, Ok(())));
        assert_eq!(tally.completed(), 2);
    }

    #[test]
    fn test_first_error_wins() {
        let mut tally = RunTally::new(3);
        tally.complete(1, Err(BackupError::CollectionNotFound("wrong_name".into())));
        tally.complete(0, Err(BackupError::Source("cursor killed".into())));
        tally.complete(2, Ok(()));

        assert_eq!(tally.failed(), 2);
        assert!(matches!(
            tally.into_error(),
            Some(BackupError::CollectionNotFound(name)) if name == "wrong_name"
        ));
    }

    #[test]
    fn test_callback_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut callback = OnceCallback::new(Some(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        callback.fire(None);
        callback.fire(None);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
