use std::sync::Arc;

use parking_lot::Mutex;
use pledge::{Future, QueueScheduler, Reaction, Value};
use tracing_subscriber::EnvFilter;

/// Routes `tracing` output through the test harness, set `RUST_LOG` to see it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn setup() -> (Arc<QueueScheduler>, Future) {
    init_tracing();
    let scheduler = Arc::new(QueueScheduler::new());
    let future = Future::new(scheduler.clone());
    (scheduler, future)
}

pub fn identity() -> Reaction {
    Reaction::new(Ok)
}

/// Records every value the returned reaction receives.
pub fn recorder() -> (Reaction, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();
    let reaction = Reaction::new(move |value: Value| {
        log.lock().push(value.clone());
        Ok(value)
    });
    (reaction, received)
}
