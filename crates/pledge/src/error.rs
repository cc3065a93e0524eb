use thiserror::Error;

use crate::future::FutureId;

/// Failure reasons produced by the crate itself.
///
/// These never escape a [`crate::Future`] as a panic or a `Result`; they are carried as the
/// rejection reason of the affected future, wrapped in [`crate::Value::Error`].
#[derive(Error, Debug)]
pub enum FutureError {
    #[error("Future cannot be resolved with itself. future: {id}")]
    SelfResolution { id: FutureId },

    #[error("Callback panicked. message: {message}")]
    CallbackPanicked { message: String },
}

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Unable to spawn scheduler worker. index: {index}, reason: {reason}")]
    SpawnWorker { index: usize, reason: std::io::Error },

    #[error("Scheduler requires at least one worker thread")]
    NoWorkers,
}
