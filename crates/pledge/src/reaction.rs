use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::error::FutureError;
use crate::value::{Function, Value};

type ReactionFn = dyn Fn(Value) -> Result<Value, Value> + Send + Sync;

#[derive(Clone)]
enum Callback {
    Native(Arc<ReactionFn>),
    Function(Function),
}

/// An observer callback registered through [`crate::Future::observe`].
///
/// A reaction is a handle: clones share identity, and registering the same handle twice on one
/// future runs the callback once for both registrations. Two reactions built from equal closures
/// are distinct.
///
/// Returning `Err` is raising; the value becomes the rejection reason of the downstream futures.
#[derive(Clone)]
pub struct Reaction(Callback);

impl Reaction {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Value> + Send + Sync + 'static,
    {
        Self(Callback::Native(Arc::new(callback)))
    }

    /// Returns a reaction for callable values, `None` for anything that must be ignored.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Function(function) => Some(Self::from(function.clone())),
            _ => None,
        }
    }

    pub fn same(&self, other: &Reaction) -> bool {
        match (&self.0, &other.0) {
            (Callback::Native(a), Callback::Native(b)) => Arc::ptr_eq(a, b),
            (Callback::Function(a), Callback::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Runs the callback with the settled outcome as its only input and no receiver.
    pub(crate) fn invoke(&self, input: Value) -> Result<Value, Value> {
        guarded(|| match &self.0 {
            Callback::Native(callback) => callback(input),
            Callback::Function(function) => function.call(&Value::Undefined, vec![input]),
        })
    }
}

impl From<Function> for Reaction {
    fn from(function: Function) -> Self {
        Self(Callback::Function(function))
    }
}

impl Debug for Reaction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Callback::Native(_) => f.write_str("Reaction(native)"),
            Callback::Function(_) => f.write_str("Reaction(function)"),
        }
    }
}

/// Runs user code, turning a panic into a raised [`FutureError::CallbackPanicked`].
pub(crate) fn guarded<F>(callback: F) -> Result<Value, Value>
where
    F: FnOnce() -> Result<Value, Value>,
{
    panic::catch_unwind(AssertUnwindSafe(callback)).unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        warn!("Callback panicked. message: {}", message);
        Err(Value::error(FutureError::CallbackPanicked {
            message,
        }))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_are_the_same_reaction() {
        // given
        let reaction = Reaction::new(Ok);
        let lookalike = Reaction::new(Ok);

        // expect
        assert!(reaction.same(&reaction.clone()));
        assert!(!reaction.same(&lookalike));
    }

    #[test]
    fn reactions_from_the_same_function_are_the_same() {
        // given
        let function = Function::new(|_, mut args| Ok(args.remove(0)));

        // expect
        assert!(Reaction::from(function.clone()).same(&Reaction::from(function)));
    }

    #[test]
    fn non_callable_values_are_ignored() {
        // expect
        assert!(Reaction::from_value(&Value::from(1)).is_none());
        assert!(Reaction::from_value(&Value::Undefined).is_none());
    }

    #[test]
    fn function_reaction_has_no_receiver() {
        // given
        let reaction = Reaction::from(Function::new(|this, _| Ok(this.clone())));

        // when
        let result = reaction.invoke(Value::from(1));

        // then
        assert_eq!(result, Ok(Value::Undefined));
    }

    #[test]
    fn panic_becomes_raised_error() {
        // given
        let reaction = Reaction::new(|_| panic!("boom"));

        // when
        let result = reaction.invoke(Value::Undefined);

        // then
        let reason = result.expect_err("raised");
        match reason.downcast_error::<FutureError>() {
            Some(FutureError::CallbackPanicked { message }) => assert_eq!(message, "boom"),
            other => panic!("unexpected reason: {:?}", other),
        }
    }
}
