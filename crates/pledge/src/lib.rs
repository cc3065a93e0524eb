//! Deferred values with chainable reactions.
//!
//! A [`Future`] represents a value, or a failure reason, that is not known yet. Observers attach
//! reactions with [`Future::observe`], which always returns a new future settled by the
//! reaction's result, so chains need no separate data structure.
//!
//! # Key Features
//!
//! - A future settles at most once; later settlements are ignored.
//! - Reactions run on an injectable [`Scheduler`], never inline, in registration order, and at
//!   most once each, even when the same [`Reaction`] is registered repeatedly.
//! - Values returned by reactions go through a resolution procedure: futures are adopted and
//!   foreign thenables (any [`Value`] exposing a callable `then`) are followed.
//! - Failures, including panicking reactions, become rejections; nothing escapes to the caller.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use pledge::{Future, QueueScheduler, Reaction, Settled, Value};
//!
//! let scheduler = Arc::new(QueueScheduler::new());
//! let future = Future::new(scheduler.clone());
//!
//! let increment = Reaction::new(|value: Value| match value.as_number() {
//!     Some(number) => Ok(Value::from(number + 1.0)),
//!     None => Err(Value::from("not a number")),
//! });
//! let next = future.observe(Some(&increment), None);
//!
//! future.fulfill(Value::from(42));
//!
//! // nothing runs until the scheduler does.
//! assert!(next.is_pending());
//! scheduler.run_until_idle();
//!
//! assert_eq!(next.outcome(), Some(Settled::Fulfilled(Value::from(43))));
//! ```

pub mod config;
pub mod error;
pub mod future;
pub mod reaction;
mod resolution;
pub mod scheduler;
pub mod value;

pub use config::SchedulerConfig;
pub use error::{FutureError, SchedulerError};
pub use future::{Future, FutureId, Settled, State};
pub use reaction::Reaction;
#[cfg(feature = "tokio")]
pub use scheduler::TokioScheduler;
pub use scheduler::{Job, QueueScheduler, Scheduler, ThreadPoolScheduler};
pub use value::{Function, Object, Properties, Record, THEN, Value};
