//! The deferred value and its reaction scheduling.

use std::fmt::{Debug, Display, Formatter};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::reaction::Reaction;
use crate::resolution;
use crate::scheduler::Scheduler;
use crate::value::Value;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier, used in log messages and error reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FutureId(u64);

impl Display for FutureId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Pending,
    Fulfilled,
    Rejected,
}

/// The terminal outcome of a future.
#[derive(Debug, Clone, PartialEq)]
pub enum Settled {
    Fulfilled(Value),
    Rejected(Value),
}

impl Settled {
    pub fn state(&self) -> State {
        match self {
            Settled::Fulfilled(_) => State::Fulfilled,
            Settled::Rejected(_) => State::Rejected,
        }
    }

    pub fn value(&self) -> &Value {
        match self {
            Settled::Fulfilled(value) | Settled::Rejected(value) => value,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Settled::Fulfilled(value) | Settled::Rejected(value) => value,
        }
    }
}

/// How a reaction's result settles each downstream future. Fixed once the reaction has run so
/// that late registrations can reuse it without running the reaction again.
#[derive(Debug, Clone)]
enum Continuation {
    Resolve(Value),
    Fulfill(Value),
    Reject(Value),
}

impl Continuation {
    fn from_reaction(result: Result<Value, Value>) -> Self {
        match result {
            Ok(value) => Continuation::Resolve(value),
            // a raised value is the final reason, it is never unwrapped.
            Err(reason) => Continuation::Reject(reason),
        }
    }

    /// Forwards the outcome unchanged, matching the upstream state.
    fn passthrough(settled: &Settled) -> Self {
        match settled {
            Settled::Fulfilled(value) => Continuation::Fulfill(value.clone()),
            Settled::Rejected(reason) => Continuation::Reject(reason.clone()),
        }
    }

    fn apply(&self, downstream: &Future) {
        match self {
            Continuation::Resolve(value) => downstream.resolve(value.clone()),
            Continuation::Fulfill(value) => downstream.fulfill(value.clone()),
            Continuation::Reject(reason) => downstream.reject(reason.clone()),
        }
    }
}

/// One callback and every downstream future waiting on its result.
struct ReactionRecord {
    reaction: Option<Reaction>,
    downstream: Vec<Future>,
    continuation: Option<Continuation>,
}

impl ReactionRecord {
    fn new(reaction: Option<&Reaction>, downstream: &Future) -> Self {
        Self {
            reaction: reaction.cloned(),
            downstream: vec![downstream.clone()],
            continuation: None,
        }
    }

    fn matches(&self, reaction: Option<&Reaction>) -> bool {
        match (&self.reaction, reaction) {
            (None, None) => true,
            (Some(registered), Some(reaction)) => registered.same(reaction),
            _ => false,
        }
    }
}

fn find_record(records: &[ReactionRecord], reaction: Option<&Reaction>) -> Option<usize> {
    records
        .iter()
        .position(|record| record.matches(reaction))
}

fn register_pending(records: &mut Vec<ReactionRecord>, reaction: Option<&Reaction>, downstream: &Future) {
    match find_record(records, reaction) {
        Some(index) => records[index]
            .downstream
            .push(downstream.clone()),
        None => records.push(ReactionRecord::new(reaction, downstream)),
    }
}

enum Attachment {
    /// Joined a record the drain has not passed yet.
    Queued,
    /// Added a new record at the end of the work list.
    Appended,
    /// Matched a record the drain already passed, its continuation must be applied out of band.
    Passed(Continuation),
}

/// The reactions of a settled future, drained in order from `cursor`.
struct WorkList {
    records: Vec<ReactionRecord>,
    cursor: usize,
    draining: bool,
}

impl WorkList {
    fn attach(&mut self, reaction: Option<&Reaction>, downstream: &Future) -> Attachment {
        let Some(index) = find_record(&self.records, reaction) else {
            self.records
                .push(ReactionRecord::new(reaction, downstream));
            return Attachment::Appended;
        };

        let record = &mut self.records[index];
        if index < self.cursor {
            if let Some(continuation) = &record.continuation {
                return Attachment::Passed(continuation.clone());
            }
        }

        record
            .downstream
            .push(downstream.clone());
        Attachment::Queued
    }
}

enum Inner {
    Pending {
        on_fulfilled: Vec<ReactionRecord>,
        on_rejected: Vec<ReactionRecord>,
    },
    Settled {
        settled: Settled,
        work: WorkList,
    },
}

struct Shared {
    id: FutureId,
    scheduler: Arc<dyn Scheduler>,
    inner: Mutex<Inner>,
}

/// A value, or failure reason, that is not known yet.
///
/// A future starts pending and settles at most once, either fulfilled with a value or rejected
/// with a reason. Reactions registered with [`Future::observe`] run on the future's
/// [`Scheduler`], never inline, in registration order, and each at most once. Observing always
/// returns a new future that settles with the reaction's result, which is how chains are built.
///
/// Cloning a `Future` clones the handle, not the deferred value.
#[derive(Clone)]
pub struct Future {
    shared: Arc<Shared>,
}

impl Future {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        let id = FutureId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
        trace!("Created future. id: {}", id);

        Self {
            shared: Arc::new(Shared {
                id,
                scheduler,
                inner: Mutex::new(Inner::Pending {
                    on_fulfilled: Vec::new(),
                    on_rejected: Vec::new(),
                }),
            }),
        }
    }

    pub fn id(&self) -> FutureId {
        self.shared.id
    }

    pub fn ptr_eq(&self, other: &Future) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn state(&self) -> State {
        match &*self.shared.inner.lock() {
            Inner::Pending {
                ..
            } => State::Pending,
            Inner::Settled {
                settled, ..
            } => settled.state(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state() == State::Pending
    }

    /// The settled outcome, `None` while pending.
    pub fn outcome(&self) -> Option<Settled> {
        match &*self.shared.inner.lock() {
            Inner::Pending {
                ..
            } => None,
            Inner::Settled {
                settled, ..
            } => Some(settled.clone()),
        }
    }

    /// Fulfills with `value` as is. Ignored if already settled.
    pub fn fulfill(&self, value: Value) {
        self.settle(Settled::Fulfilled(value));
    }

    /// Rejects with `reason` as is, rejection reasons are never unwrapped. Ignored if already
    /// settled.
    pub fn reject(&self, reason: Value) {
        self.settle(Settled::Rejected(reason));
    }

    /// Settles with `value` through the resolution procedure: a future is adopted, a thenable
    /// is followed, and anything else fulfills directly. Ignored if already settled.
    pub fn resolve(&self, value: Value) {
        resolution::resolve(self, value);
    }

    fn settle(&self, settled: Settled) {
        let start_drain = {
            let mut inner = self.shared.inner.lock();
            let Inner::Pending {
                on_fulfilled,
                on_rejected,
            } = &mut *inner
            else {
                trace!("Ignored settlement of settled future. id: {}", self.shared.id);
                return;
            };

            // the reactions for the other outcome will never run, drop them now.
            let records = match settled {
                Settled::Fulfilled(_) => mem::take(on_fulfilled),
                Settled::Rejected(_) => mem::take(on_rejected),
            };
            let draining = !records.is_empty();

            debug!(
                "Settled future. id: {}, state: {:?}, reactions: {}",
                self.shared.id,
                settled.state(),
                records.len()
            );

            *inner = Inner::Settled {
                settled,
                work: WorkList {
                    records,
                    cursor: 0,
                    draining,
                },
            };

            draining
        };

        if start_drain {
            self.schedule_drain();
        }
    }

    /// Registers reactions and returns the future that settles with their result.
    ///
    /// A `None` reaction passes the outcome through unchanged. Registering a reaction that is
    /// already registered on this future does not run it again; the new downstream future
    /// receives the result of the single invocation.
    pub fn observe(&self, on_fulfilled: Option<&Reaction>, on_rejected: Option<&Reaction>) -> Future {
        let downstream = Future::new(self.shared.scheduler.clone());

        let attachment = {
            let mut inner = self.shared.inner.lock();
            match &mut *inner {
                Inner::Pending {
                    on_fulfilled: fulfilled_records,
                    on_rejected: rejected_records,
                } => {
                    register_pending(fulfilled_records, on_fulfilled, &downstream);
                    register_pending(rejected_records, on_rejected, &downstream);
                    None
                }
                Inner::Settled {
                    settled,
                    work,
                } => {
                    let reaction = match settled {
                        Settled::Fulfilled(_) => on_fulfilled,
                        Settled::Rejected(_) => on_rejected,
                    };
                    match work.attach(reaction, &downstream) {
                        Attachment::Appended if !work.draining => {
                            work.draining = true;
                            Some(Attachment::Appended)
                        }
                        Attachment::Passed(continuation) => Some(Attachment::Passed(continuation)),
                        _ => None,
                    }
                }
            }
        };

        trace!("Observed future. id: {}, downstream: {}", self.shared.id, downstream.id());

        match attachment {
            Some(Attachment::Appended) => self.schedule_drain(),
            Some(Attachment::Passed(continuation)) => {
                debug!(
                    "Dispatching catch-up for drained reaction. id: {}, downstream: {}",
                    self.shared.id,
                    downstream.id()
                );
                let target = downstream.clone();
                self.shared
                    .scheduler
                    .schedule(Box::new(move || continuation.apply(&target)));
            }
            _ => {}
        }

        downstream
    }

    /// Blocks until settled, or until `timeout` elapses.
    ///
    /// Only useful with a scheduler that runs jobs on other threads; with a
    /// [`crate::QueueScheduler`] nothing runs while the caller waits.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Settled> {
        if let Some(settled) = self.outcome() {
            return Some(settled);
        }

        let (sender, receiver) = bounded(1);
        let rejected_sender = sender.clone();

        let on_fulfilled = Reaction::new(move |value| {
            let _ = sender.try_send(Settled::Fulfilled(value));
            Ok(Value::Undefined)
        });
        let on_rejected = Reaction::new(move |reason| {
            let _ = rejected_sender.try_send(Settled::Rejected(reason));
            Ok(Value::Undefined)
        });
        self.observe(Some(&on_fulfilled), Some(&on_rejected));

        receiver.recv_timeout(timeout).ok()
    }

    fn schedule_drain(&self) {
        let future = self.clone();
        self.shared
            .scheduler
            .schedule(Box::new(move || future.run_next_reaction()));
    }

    /// Runs the reaction at the cursor, settles its downstream futures and schedules the next.
    fn run_next_reaction(&self) {
        let (reaction, settled) = {
            let mut inner = self.shared.inner.lock();
            let Inner::Settled {
                settled,
                work,
            } = &mut *inner
            else {
                return;
            };

            match work.records.get(work.cursor) {
                Some(record) => (record.reaction.clone(), settled.clone()),
                None => {
                    work.draining = false;
                    return;
                }
            }
        };

        // the lock is not held while user code runs, the reaction may observe this future.
        let continuation = match &reaction {
            Some(reaction) => Continuation::from_reaction(reaction.invoke(settled.value().clone())),
            None => Continuation::passthrough(&settled),
        };

        let (downstream, more) = {
            let mut inner = self.shared.inner.lock();
            let Inner::Settled {
                work, ..
            } = &mut *inner
            else {
                return;
            };

            let cursor = work.cursor;
            let record = &mut work.records[cursor];
            record.continuation = Some(continuation.clone());
            let downstream = mem::take(&mut record.downstream);

            work.cursor += 1;
            let more = work.cursor < work.records.len();
            if !more {
                work.draining = false;
            }

            (downstream, more)
        };

        trace!(
            "Ran reaction. id: {}, downstream: {}, continuation: {:?}",
            self.shared.id,
            downstream.len(),
            continuation
        );

        for future in &downstream {
            continuation.apply(future);
        }

        if more {
            self.schedule_drain();
        }
    }
}

impl Debug for Future {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Future")
            .field(&self.shared.id)
            .finish()
    }
}
