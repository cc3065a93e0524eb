//! Settling a future with a value that may itself be deferred.

use std::sync::{Arc, OnceLock};

use tracing::{debug, trace};

use crate::error::FutureError;
use crate::future::Future;
use crate::reaction::{Reaction, guarded};
use crate::value::{Function, THEN, Value};

enum Resolution {
    SelfReference,
    /// A future of this crate, its outcome is adopted.
    Adopt(Future),
    /// An object or function with a callable `then`.
    Thenable { receiver: Value, then: Function },
    Plain(Value),
    /// Reading `then` raised.
    Fault(Value),
}

fn classify(target: &Future, value: Value) -> Resolution {
    match value {
        Value::Future(future) if future.ptr_eq(target) => Resolution::SelfReference,
        Value::Future(future) => Resolution::Adopt(future),
        Value::Object(_) | Value::Function(_) => match guarded(|| value.get(THEN)) {
            Err(reason) => Resolution::Fault(reason),
            Ok(Value::Function(then)) => Resolution::Thenable {
                receiver: value,
                then,
            },
            Ok(_) => Resolution::Plain(value),
        },
        value => Resolution::Plain(value),
    }
}

pub(crate) fn resolve(target: &Future, value: Value) {
    match classify(target, value) {
        Resolution::SelfReference => {
            debug!("Future resolved with itself. id: {}", target.id());
            target.reject(Value::error(FutureError::SelfResolution {
                id: target.id(),
            }));
        }
        Resolution::Adopt(source) => adopt(target, &source),
        Resolution::Thenable {
            receiver,
            then,
        } => follow_thenable(target, receiver, then),
        Resolution::Plain(value) => target.fulfill(value),
        Resolution::Fault(reason) => {
            debug!("Reading 'then' raised. id: {}, reason: {:?}", target.id(), reason);
            target.reject(reason);
        }
    }
}

fn adopt(target: &Future, source: &Future) {
    trace!("Adopting future. id: {}, source: {}", target.id(), source.id());

    let fulfill_target = target.clone();
    let reject_target = target.clone();
    let on_fulfilled = Reaction::new(move |value| {
        fulfill_target.fulfill(value);
        Ok(Value::Undefined)
    });
    let on_rejected = Reaction::new(move |reason| {
        reject_target.reject(reason);
        Ok(Value::Undefined)
    });

    source.observe(Some(&on_fulfilled), Some(&on_rejected));
}

/// Single-assignment cell shared by a thenable's pair of settlement capabilities; whichever
/// claims it first settles the target.
#[derive(Default)]
struct FirstCall(OnceLock<()>);

impl FirstCall {
    fn claim(&self) -> bool {
        self.0.set(()).is_ok()
    }
}

fn follow_thenable(target: &Future, receiver: Value, then: Function) {
    trace!("Following thenable. id: {}", target.id());

    let first_call = Arc::new(FirstCall::default());

    let resolve_promise = {
        let target = target.clone();
        let first_call = first_call.clone();
        Function::new(move |_, args| {
            if first_call.claim() {
                let value = args
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                resolve(&target, value);
            } else {
                trace!("Ignored settlement capability call. id: {}", target.id());
            }
            Ok(Value::Undefined)
        })
    };

    let reject_promise = {
        let target = target.clone();
        let first_call = first_call.clone();
        Function::new(move |_, args| {
            if first_call.claim() {
                let reason = args
                    .into_iter()
                    .next()
                    .unwrap_or_default();
                target.reject(reason);
            } else {
                trace!("Ignored settlement capability call. id: {}", target.id());
            }
            Ok(Value::Undefined)
        })
    };

    let result = guarded(|| {
        then.call(&receiver, vec![
            Value::Function(resolve_promise),
            Value::Function(reject_promise),
        ])
    });

    if let Err(reason) = result {
        if first_call.claim() {
            debug!("Calling 'then' raised. id: {}, reason: {:?}", target.id(), reason);
            target.reject(reason);
        } else {
            trace!("Discarded 'then' fault after settlement. id: {}", target.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::future::{Settled, State};
    use crate::scheduler::QueueScheduler;
    use crate::value::{Object, Properties, Record};

    fn setup() -> (Arc<QueueScheduler>, Future) {
        let scheduler = Arc::new(QueueScheduler::new());
        let future = Future::new(scheduler.clone());
        (scheduler, future)
    }

    fn thenable<F>(then: F) -> Value
    where
        F: Fn(&Value, Vec<Value>) -> Result<Value, Value> + Send + Sync + 'static,
    {
        Value::from(Record::new().with(THEN, Function::new(then)))
    }

    fn call(capability: &Value, value: Value) {
        capability
            .as_function()
            .expect("callable")
            .call(&Value::Undefined, vec![value])
            .expect("capabilities never raise");
    }

    #[test]
    fn resolving_with_itself_rejects() {
        // given
        let (_scheduler, future) = setup();

        // when
        future.resolve(Value::from(future.clone()));

        // then
        let settled = future.outcome().expect("settled");
        assert_eq!(settled.state(), State::Rejected);
        assert!(matches!(
            settled.value().downcast_error::<FutureError>(),
            Some(FutureError::SelfResolution { id }) if *id == future.id()
        ));
    }

    #[test]
    fn plain_values_fulfill_immediately() {
        // given
        let (_scheduler, future) = setup();

        // when
        future.resolve(Value::from(5));

        // then
        assert_eq!(future.outcome(), Some(Settled::Fulfilled(Value::from(5))));
    }

    #[test]
    fn object_without_then_fulfills_with_the_object() {
        // given
        let (_scheduler, future) = setup();
        let object = Value::from(Record::new().with("then", 5));

        // when
        future.resolve(object.clone());

        // then
        assert_eq!(future.outcome(), Some(Settled::Fulfilled(object)));
    }

    #[test]
    fn pending_future_is_adopted() {
        // given
        let (scheduler, future) = setup();
        let source = Future::new(scheduler.clone());

        // when
        future.resolve(Value::from(source.clone()));
        scheduler.run_until_idle();

        // then
        assert!(future.is_pending());

        // and
        source.reject(Value::from("later"));
        scheduler.run_until_idle();
        assert_eq!(future.outcome(), Some(Settled::Rejected(Value::from("later"))));
    }

    #[test]
    fn thenable_settles_when_capability_is_called() {
        // given
        let (_scheduler, future) = setup();
        let captured = Arc::new(Mutex::new(None));
        let slot = captured.clone();
        let value = thenable(move |_, args| {
            *slot.lock() = Some(args);
            Ok(Value::Undefined)
        });

        // when
        future.resolve(value);

        // then
        assert!(future.is_pending());

        // and
        let capabilities = captured
            .lock()
            .take()
            .expect("then was called");
        call(&capabilities[0], Value::from(5));
        assert_eq!(future.outcome(), Some(Settled::Fulfilled(Value::from(5))));
    }

    #[test]
    fn only_first_capability_call_counts() {
        // given
        let (_scheduler, future) = setup();
        let value = thenable(|_, args| {
            call(&args[1], Value::from("first"));
            call(&args[0], Value::from("second"));
            call(&args[1], Value::from("third"));
            Ok(Value::Undefined)
        });

        // when
        future.resolve(value);

        // then
        assert_eq!(future.outcome(), Some(Settled::Rejected(Value::from("first"))));
    }

    #[test]
    fn repeated_resolve_capability_is_ignored() {
        // given
        let (scheduler, future) = setup();
        let source = Future::new(scheduler.clone());
        let pending = Value::from(source.clone());
        let value = thenable(move |_, args| {
            call(&args[0], pending.clone());
            call(&args[0], Value::from("ignored"));
            Ok(Value::Undefined)
        });

        // when
        future.resolve(value);
        source.fulfill(Value::from("adopted"));
        scheduler.run_until_idle();

        // then
        assert_eq!(future.outcome(), Some(Settled::Fulfilled(Value::from("adopted"))));
    }

    #[test]
    fn then_receives_the_thenable_as_receiver() {
        // given
        let (_scheduler, future) = setup();
        let receiver = Arc::new(Mutex::new(None));
        let slot = receiver.clone();
        let value = thenable(move |this, _| {
            *slot.lock() = Some(this.clone());
            Ok(Value::Undefined)
        });

        // when
        future.resolve(value.clone());

        // then
        assert_eq!(*receiver.lock(), Some(value));
    }

    #[test]
    fn raising_then_rejects() {
        // given
        let (_scheduler, future) = setup();
        let value = thenable(|_, _| Err(Value::from("then failed")));

        // when
        future.resolve(value);

        // then
        assert_eq!(future.outcome(), Some(Settled::Rejected(Value::from("then failed"))));
    }

    #[test]
    fn raising_after_capability_call_is_discarded() {
        // given
        let (_scheduler, future) = setup();
        let value = thenable(|_, args| {
            call(&args[0], Value::from("kept"));
            Err(Value::from("discarded"))
        });

        // when
        future.resolve(value);

        // then
        assert_eq!(future.outcome(), Some(Settled::Fulfilled(Value::from("kept"))));
    }

    #[test]
    fn capability_after_raising_then_is_ignored() {
        // given
        let (_scheduler, future) = setup();
        let captured = Arc::new(Mutex::new(None));
        let slot = captured.clone();
        let value = thenable(move |_, args| {
            *slot.lock() = Some(args);
            Err(Value::from("raised"))
        });

        // when
        future.resolve(value);
        let capabilities = captured
            .lock()
            .take()
            .expect("then was called");
        call(&capabilities[0], Value::from("late"));

        // then
        assert_eq!(future.outcome(), Some(Settled::Rejected(Value::from("raised"))));
    }

    struct RaisingThen;

    impl Properties for RaisingThen {
        fn get(&self, name: &str) -> Result<Value, Value> {
            match name {
                THEN => Err(Value::from("no access")),
                _ => Ok(Value::Undefined),
            }
        }
    }

    #[test]
    fn raising_then_access_rejects() {
        // given
        let (_scheduler, future) = setup();

        // when
        future.resolve(Value::from(Object::new(RaisingThen)));

        // then
        assert_eq!(future.outcome(), Some(Settled::Rejected(Value::from("no access"))));
    }

    #[test]
    fn callable_thenable() {
        // given
        let (_scheduler, future) = setup();
        let then = Function::new(|_, args| {
            call(&args[0], Value::from(8));
            Ok(Value::Undefined)
        });
        let function = Function::new(|_, _| Ok(Value::Undefined)).with_properties(Object::new(Record::new().with(THEN, then)));

        // when
        future.resolve(Value::from(function));

        // then
        assert_eq!(future.outcome(), Some(Settled::Fulfilled(Value::from(8))));
    }

    #[test]
    fn nested_thenables_are_followed() {
        // given
        let (_scheduler, future) = setup();
        let inner = thenable(|_, args| {
            call(&args[0], Value::from("innermost"));
            Ok(Value::Undefined)
        });
        let outer = thenable(move |_, args| {
            call(&args[0], inner.clone());
            Ok(Value::Undefined)
        });

        // when
        future.resolve(outer);

        // then
        assert_eq!(future.outcome(), Some(Settled::Fulfilled(Value::from("innermost"))));
    }

    #[test]
    fn rejection_reason_is_not_unwrapped() {
        // given
        let (_scheduler, future) = setup();
        let reason = thenable(|_, args| {
            call(&args[0], Value::from("unwrapped"));
            Ok(Value::Undefined)
        });
        let value = {
            let reason = reason.clone();
            thenable(move |_, args| {
                call(&args[1], reason.clone());
                Ok(Value::Undefined)
            })
        };

        // when
        future.resolve(value);

        // then
        assert_eq!(future.outcome(), Some(Settled::Rejected(reason)));
    }

    #[test]
    fn object_borrowing_a_future_then_adopts_that_future() {
        // given
        let (scheduler, future) = setup();
        let source = Future::new(scheduler.clone());
        source.fulfill(Value::from(7));
        let then = Value::from(source)
            .get(THEN)
            .expect("ok");
        let borrowed = Value::from(Record::new().with(THEN, then));

        // when
        future.resolve(borrowed);
        scheduler.run_until_idle();

        // then
        assert_eq!(future.outcome(), Some(Settled::Fulfilled(Value::from(7))));
    }
}
