//! Worker-side object model
//!
//! The wrapped library is seen only as a namespace of names resolving to
//! [`Value`]s. Plain data crosses the boundary by value; everything else is an
//! [`Object`] that stays in the worker and is driven through the four
//! operations of the trait.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::exception::{Exception, Raised};

/// Shared handle to a live worker-side object
///
/// Cloning shares the object; registering the same object twice yields two
/// distinct reference ids that alias one target.
pub type ObjectRef = Arc<dyn Object>;

/// Keyword arguments, ordered by name
pub type Kwargs = BTreeMap<String, Value>;

/// Signature for native callables exposed by a namespace
pub type NativeFnPtr = Arc<dyn Fn(Vec<Value>, Kwargs) -> Raised<Value> + Send + Sync>;

/// A value produced or consumed by the wrapped library
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Anything that cannot travel by value
    Object(ObjectRef),
}

impl Value {
    /// Wrap a concrete object
    pub fn object<O: Object + 'static>(object: O) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Short type description used in error messages
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Object(o) => o.type_name(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Native textual representation, the same text `represent` reports
    pub fn represent(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Str(s) => format!("{s:?}"),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::represent).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Map(entries) => {
                let inner: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{k:?}: {}", v.represent()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Self::Object(o) => o.represent(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object(o) => write!(f, "Object({})", o.represent()),
            other => f.write_str(&other.represent()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Self::Object(o)
    }
}

/// A worker-side object reachable from the client through a proxy handle
///
/// Every operation has a default that raises the same exception a missing
/// capability would, so implementors only override what they support.
/// Mutation goes through `&self`; objects that accept `set_attribute` keep
/// their state behind interior mutability.
pub trait Object: Send + Sync {
    /// Type name used in representations and error messages
    fn type_name(&self) -> &str;

    fn get_attribute(&self, name: &str) -> Raised<Value> {
        Err(Exception::attribute(self.type_name(), name))
    }

    fn set_attribute(&self, name: &str, _value: Value) -> Raised<()> {
        Err(Exception::attribute(self.type_name(), name))
    }

    fn invoke(&self, _args: Vec<Value>, _kwargs: Kwargs) -> Raised<Value> {
        Err(Exception::type_error(format!(
            "'{}' object is not callable",
            self.type_name()
        )))
    }

    fn represent(&self) -> String {
        format!("<{} object>", self.type_name())
    }
}

/// A native function exposed as a callable object
#[derive(Clone)]
pub struct NativeFn {
    name: String,
    func: NativeFnPtr,
}

impl NativeFn {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Vec<Value>, Kwargs) -> Raised<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Object for NativeFn {
    fn type_name(&self) -> &str {
        "function"
    }

    fn get_attribute(&self, name: &str) -> Raised<Value> {
        match name {
            "__name__" => Ok(Value::Str(self.name.clone())),
            _ => Err(Exception::attribute(self.type_name(), name)),
        }
    }

    fn invoke(&self, args: Vec<Value>, kwargs: Kwargs) -> Raised<Value> {
        (self.func)(args, kwargs)
    }

    fn represent(&self) -> String {
        format!("<function {}>", self.name)
    }
}

/// Top-level names of the wrapped library
pub trait Namespace: Send + Sync {
    fn get(&self, name: &str) -> Raised<Value>;
}

impl<F> Namespace for F
where
    F: Fn(&str) -> Raised<Value> + Send + Sync,
{
    fn get(&self, name: &str) -> Raised<Value> {
        self(name)
    }
}

/// A namespace backed by a fixed table of values
///
/// Values are cloned out on every lookup, so an object stored here is the same
/// target on every access.
#[derive(Clone)]
pub struct StaticNamespace {
    name: String,
    entries: BTreeMap<String, Value>,
}

impl StaticNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Add a value under `name`
    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(name.into(), value.into());
        self
    }

    /// Add a native function under `name`
    pub fn with_function<F>(self, name: &str, func: F) -> Self
    where
        F: Fn(Vec<Value>, Kwargs) -> Raised<Value> + Send + Sync + 'static,
    {
        self.with_value(name, Value::object(NativeFn::new(name, func)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Namespace for StaticNamespace {
    fn get(&self, name: &str) -> Raised<Value> {
        self.entries
            .get(name)
            .cloned()
            .ok_or_else(|| Exception::attribute(&self.name, name))
    }
}
