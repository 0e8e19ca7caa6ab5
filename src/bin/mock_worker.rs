//! Mock worker binary for integration testing
//!
//! Serves a small demo library through the real dispatcher, so the client can
//! be exercised end to end without wrapping an actual library:
//!
//! - `parse(source, path=None)` returns an `Analysis` object
//! - `echo(*args, **kwargs)` returns its arguments as `{"args", "kwargs"}`
//! - `fail(kind, *args)` raises an exception of any kind
//! - `shared` is one `Counter` returned on every lookup
//! - `Counter(start=0)` constructs a fresh counter
//! - `total(*counters)` sums the `value` attribute of its arguments
//! - `divide(a, b)` plain float division, infinite on zero
//! - `exit(code=0)` terminates the process without responding
//! - `boom()` panics

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::{json, Value as Json};

use objproxy::common::logging;
use objproxy::worker::{self, Exception, Kwargs, NativeFn, Object, Raised, StaticNamespace, Value};

#[tokio::main]
async fn main() {
    let logging = logging::init_worker();
    if let Some(path) = &logging.log_file {
        tracing::debug!(path = %path.display(), "Logging to file");
    }

    if let Err(e) = worker::run(namespace()).await {
        tracing::error!(error = %e, "Worker failed");
        std::process::exit(1);
    }
}

fn namespace() -> StaticNamespace {
    StaticNamespace::new("mocklib")
        .with_value("version", "0.3.1")
        .with_value("shared", Value::object(Counter::new(0)))
        .with_function("parse", |args, kwargs| {
            let mut args = Bound::new("parse", args, kwargs);
            let source = args.required_str("source")?;
            let path = args.optional("path").and_then(|p| p.as_str().map(str::to_string));
            args.finish()?;
            Ok(Value::object(Analysis::new(source, path)))
        })
        .with_function("echo", |args, kwargs| {
            let mut echoed = BTreeMap::new();
            echoed.insert("args".to_string(), Value::List(args));
            echoed.insert("kwargs".to_string(), Value::Map(kwargs));
            Ok(Value::Map(echoed))
        })
        .with_function("fail", |args, _| {
            let mut args: VecDeque<Value> = args.into();
            let kind = match args.pop_front() {
                Some(Value::Str(kind)) => kind,
                _ => return Err(Exception::type_error("fail() requires an exception kind")),
            };
            Err(Exception::new(kind, args.iter().map(plain).collect()))
        })
        .with_function("Counter", |args, kwargs| {
            let mut args = Bound::new("Counter", args, kwargs);
            let start = match args.optional("start") {
                None => 0,
                Some(v) => v
                    .as_i64()
                    .ok_or_else(|| Exception::type_error("Counter() start must be an int"))?,
            };
            args.finish()?;
            Ok(Value::object(Counter::new(start)))
        })
        .with_function("total", |args, _| {
            let mut sum = 0;
            for arg in &args {
                let object = arg.as_object().ok_or_else(|| {
                    Exception::type_error(format!("total() expects counters, not {}", arg.type_name()))
                })?;
                sum += object
                    .get_attribute("value")?
                    .as_i64()
                    .ok_or_else(|| Exception::type_error("counter value must be an int"))?;
            }
            Ok(Value::Int(sum))
        })
        .with_function("divide", |args, kwargs| {
            let mut args = Bound::new("divide", args, kwargs);
            let a = args.required_f64("a")?;
            let b = args.required_f64("b")?;
            args.finish()?;
            Ok(Value::Float(a / b))
        })
        .with_function("exit", |args, kwargs| {
            let mut args = Bound::new("exit", args, kwargs);
            let code = args.optional("code").and_then(|c| c.as_i64()).unwrap_or(0);
            tracing::info!(code, "Exit requested");
            std::process::exit(code as i32)
        })
        .with_function("boom", |_, _| panic!("boom() was called"))
}

/// Result of `parse`: a structured object that stays in the worker
struct Analysis {
    source: String,
    path: Option<String>,
    names: Vec<String>,
}

impl Analysis {
    fn new(source: String, path: Option<String>) -> Self {
        let names = source
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(name, _)| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        Self { source, path, names }
    }
}

impl Object for Analysis {
    fn type_name(&self) -> &str {
        "Analysis"
    }

    fn get_attribute(&self, name: &str) -> Raised<Value> {
        match name {
            "source" => Ok(self.source.clone().into()),
            "path" => Ok(self.path.clone().map(Value::Str).unwrap_or(Value::Null)),
            "names" => Ok(Value::List(self.names.iter().map(|n| n.as_str().into()).collect())),
            "line_count" => Ok(Value::Int(self.source.lines().count() as i64)),
            "definitions" => {
                let definitions = self
                    .names
                    .iter()
                    .enumerate()
                    .map(|(line, name)| Value::object(Definition { name: name.clone(), line: line as i64 + 1 }))
                    .collect();
                Ok(Value::List(definitions))
            }
            _ => Err(Exception::attribute(self.type_name(), name)),
        }
    }

    fn represent(&self) -> String {
        format!(
            "<Analysis path={} names={:?}>",
            self.path.as_deref().unwrap_or("None"),
            self.names
        )
    }
}

struct Definition {
    name: String,
    line: i64,
}

impl Object for Definition {
    fn type_name(&self) -> &str {
        "Definition"
    }

    fn get_attribute(&self, name: &str) -> Raised<Value> {
        match name {
            "name" => Ok(self.name.clone().into()),
            "line" => Ok(Value::Int(self.line)),
            _ => Err(Exception::attribute(self.type_name(), name)),
        }
    }

    fn represent(&self) -> String {
        format!("<Definition {} line={}>", self.name, self.line)
    }
}

/// Mutable counter; `increment` is a bound method
struct Counter {
    value: Arc<Mutex<i64>>,
}

impl Counter {
    fn new(start: i64) -> Self {
        Self {
            value: Arc::new(Mutex::new(start)),
        }
    }

    fn current(&self) -> Raised<i64> {
        self.value
            .lock()
            .map(|v| *v)
            .map_err(|_| Exception::runtime("counter lock poisoned"))
    }
}

impl Object for Counter {
    fn type_name(&self) -> &str {
        "Counter"
    }

    fn get_attribute(&self, name: &str) -> Raised<Value> {
        match name {
            "value" => Ok(Value::Int(self.current()?)),
            "increment" => {
                let value = Arc::clone(&self.value);
                Ok(Value::object(NativeFn::new("increment", move |args, kwargs| {
                    let mut args = Bound::new("increment", args, kwargs);
                    let by = args.optional("by").and_then(|b| b.as_i64()).unwrap_or(1);
                    args.finish()?;
                    let mut value = value.lock().map_err(|_| Exception::runtime("counter lock poisoned"))?;
                    *value += by;
                    Ok(Value::Int(*value))
                })))
            }
            _ => Err(Exception::attribute(self.type_name(), name)),
        }
    }

    fn set_attribute(&self, name: &str, value: Value) -> Raised<()> {
        if name != "value" {
            return Err(Exception::attribute(self.type_name(), name));
        }
        let new = value
            .as_i64()
            .ok_or_else(|| Exception::type_error(format!("value must be an int, not {}", value.type_name())))?;
        let mut current = self.value.lock().map_err(|_| Exception::runtime("counter lock poisoned"))?;
        *current = new;
        Ok(())
    }

    fn represent(&self) -> String {
        match self.current() {
            Ok(value) => format!("Counter({value})"),
            Err(_) => "Counter(?)".to_string(),
        }
    }
}

/// Positional-then-keyword binding for the demo functions
struct Bound {
    func: &'static str,
    positional: VecDeque<Value>,
    kwargs: Kwargs,
}

impl Bound {
    fn new(func: &'static str, positional: Vec<Value>, kwargs: Kwargs) -> Self {
        Self {
            func,
            positional: positional.into(),
            kwargs,
        }
    }

    fn optional(&mut self, name: &str) -> Option<Value> {
        self.positional.pop_front().or_else(|| self.kwargs.remove(name))
    }

    fn required(&mut self, name: &str) -> Raised<Value> {
        self.optional(name).ok_or_else(|| {
            Exception::type_error(format!("{}() missing required argument: '{name}'", self.func))
        })
    }

    fn required_str(&mut self, name: &str) -> Raised<String> {
        match self.required(name)? {
            Value::Str(s) => Ok(s),
            other => Err(Exception::type_error(format!(
                "{}() argument '{name}' must be a str, not {}",
                self.func,
                other.type_name()
            ))),
        }
    }

    fn required_f64(&mut self, name: &str) -> Raised<f64> {
        let value = self.required(name)?;
        value.as_f64().ok_or_else(|| {
            Exception::type_error(format!(
                "{}() argument '{name}' must be a number, not {}",
                self.func,
                value.type_name()
            ))
        })
    }

    fn finish(self) -> Raised<()> {
        if self.positional.is_empty() && self.kwargs.is_empty() {
            Ok(())
        } else {
            Err(Exception::type_error(format!("{}() got unexpected arguments", self.func)))
        }
    }
}

/// Exception arguments must be plain JSON; objects travel as their representation
fn plain(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => json!(b),
        Value::Int(i) => json!(i),
        Value::Float(f) => json!(f),
        Value::Str(s) => json!(s),
        Value::List(items) => Json::Array(items.iter().map(plain).collect()),
        Value::Map(entries) => Json::Object(entries.iter().map(|(k, v)| (k.clone(), plain(v))).collect()),
        Value::Object(o) => json!(o.represent()),
    }
}
