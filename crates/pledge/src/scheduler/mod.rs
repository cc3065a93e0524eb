//! The deferred execution service futures run their reactions on.
//!
//! A [`Scheduler`] accepts a unit of work and runs it later, after the submitting call has
//! returned. Futures never call reactions inline; every reaction invocation, and every catch-up
//! for a late registration, goes through the scheduler the future was created with.

mod queue;
mod thread_pool;
#[cfg(feature = "tokio")]
mod tokio_runtime;

pub use queue::QueueScheduler;
pub use thread_pool::ThreadPoolScheduler;
#[cfg(feature = "tokio")]
pub use tokio_runtime::TokioScheduler;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Runs `job` after the current call stack has unwound.
    ///
    /// Jobs submitted one after another from the same thread must start in submission order.
    fn schedule(&self, job: Job);
}
