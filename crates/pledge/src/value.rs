//! Dynamically typed payloads carried by futures.
//!
//! A [`Value`] is what a future is fulfilled with, what it is rejected with, and what a
//! reaction receives and returns. Reference-like variants (`Function`, `Object`, `Future`,
//! `Error`) compare by identity, primitives compare by value.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::future::Future;
use crate::reaction::Reaction;

/// Name of the property that makes a value a thenable.
pub const THEN: &str = "then";

pub type ErrorValue = Arc<dyn std::error::Error + Send + Sync + 'static>;

type NativeFunction = dyn Fn(&Value, Vec<Value>) -> Result<Value, Value> + Send + Sync;

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Arc<str>),
    Error(ErrorValue),
    Function(Function),
    Object(Object),
    Future(Future),
}

impl Value {
    pub fn error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Value::Error(Arc::new(error))
    }

    /// Reads a property.
    ///
    /// Objects delegate to their [`Properties`] implementation, which may raise. Functions
    /// expose whatever properties they were given. A future exposes a callable `then` bound to
    /// that future. Everything else has no properties.
    pub fn get(&self, name: &str) -> Result<Value, Value> {
        match self {
            Value::Object(object) => object.get(name),
            Value::Function(function) => function.get(name),
            Value::Future(future) if name == THEN => Ok(Value::Function(observe_function(future.clone()))),
            _ => Ok(Value::Undefined),
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(string) => Some(&**string),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(function) => Some(function),
            _ => None,
        }
    }

    pub fn as_future(&self) -> Option<&Future> {
        match self {
            Value::Future(future) => Some(future),
            _ => None,
        }
    }

    pub fn downcast_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Value::Error(error) => error.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// The `then` a future exposes to foreign code. The receiver is ignored, so the function keeps
/// observing `future` when it is borrowed by another object.
fn observe_function(future: Future) -> Function {
    Function::new(move |_, args| {
        let on_fulfilled = args.first().and_then(Reaction::from_value);
        let on_rejected = args.get(1).and_then(Reaction::from_value);

        Ok(Value::Future(future.observe(on_fulfilled.as_ref(), on_rejected.as_ref())))
    })
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Future(a), Value::Future(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Number(value) => write!(f, "{}", value),
            Value::String(value) => write!(f, "{:?}", value),
            Value::Error(error) => write!(f, "Error({})", error),
            Value::Function(_) => f.write_str("Function"),
            Value::Object(_) => f.write_str("Object"),
            Value::Future(future) => write!(f, "Future({})", future.id()),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<Function> for Value {
    fn from(value: Function) -> Self {
        Value::Function(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Object(Object::new(value))
    }
}

impl From<Future> for Value {
    fn from(value: Future) -> Self {
        Value::Future(value)
    }
}

/// A callable value.
///
/// `call` receives the receiver (`this`) and the arguments; an `Err` is a raised value.
/// Clones share one identity, every construction creates a new one.
#[derive(Clone)]
pub struct Function(Arc<FunctionInner>);

struct FunctionInner {
    call: Arc<NativeFunction>,
    properties: Option<Object>,
}

impl Function {
    pub fn new<F>(call: F) -> Self
    where
        F: Fn(&Value, Vec<Value>) -> Result<Value, Value> + Send + Sync + 'static,
    {
        Self(Arc::new(FunctionInner {
            call: Arc::new(call),
            properties: None,
        }))
    }

    /// Returns a new function with the same callable and the given properties, e.g. a `then`.
    ///
    /// The result has its own identity.
    pub fn with_properties(self, properties: Object) -> Self {
        Self(Arc::new(FunctionInner {
            call: self.0.call.clone(),
            properties: Some(properties),
        }))
    }

    pub fn call(&self, this: &Value, args: Vec<Value>) -> Result<Value, Value> {
        (self.0.call)(this, args)
    }

    pub fn get(&self, name: &str) -> Result<Value, Value> {
        match &self.0.properties {
            Some(properties) => properties.get(name),
            None => Ok(Value::Undefined),
        }
    }

    pub fn ptr_eq(&self, other: &Function) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Property lookup for object values. Reading a property may raise.
pub trait Properties: Send + Sync {
    fn get(&self, name: &str) -> Result<Value, Value>;
}

#[derive(Clone)]
pub struct Object(Arc<dyn Properties>);

impl Object {
    pub fn new(properties: impl Properties + 'static) -> Self {
        Self(Arc::new(properties))
    }

    pub fn get(&self, name: &str) -> Result<Value, Value> {
        self.0.get(name)
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Object::new(iter.into_iter().collect::<Record>())
    }
}

/// A plain property bag, properties are kept in insertion order.
#[derive(Default, Debug)]
pub struct Record {
    properties: IndexMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties
            .insert(name.into(), value.into());
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self {
            properties: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

impl Properties for Record {
    fn get(&self, name: &str) -> Result<Value, Value> {
        Ok(self
            .properties
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}
