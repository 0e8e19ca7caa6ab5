//! Request dispatcher
//!
//! Reads one request per line, executes it against the namespace and the
//! reference registry, and writes exactly one response line before reading
//! the next. No request can abort the loop: decode failures, unknown
//! operations, library exceptions and panics all become `ng` responses.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};

use serde_json::{Map, Value as Json};
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::common::Result;
use crate::protocol::codec::{self, Line};
use crate::protocol::{Method, Operation, Request, Response};

use super::encode;
use super::exception::{Exception, Raised};
use super::object::{ObjectRef, Namespace, Value};
use super::registry::Registry;

/// Worker-side protocol loop state
pub struct Dispatcher<N> {
    namespace: N,
    registry: Registry,
    line_limit: usize,
}

impl<N: Namespace> Dispatcher<N> {
    pub fn new(namespace: N) -> Self {
        Self {
            namespace,
            registry: Registry::new(),
            line_limit: codec::MAX_LINE_BYTES,
        }
    }

    /// Override the request line size limit
    pub fn with_line_limit(mut self, limit: usize) -> Self {
        self.line_limit = limit;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Serve requests until the input stream ends
    ///
    /// End of input is a clean shutdown, not an error.
    pub async fn serve<R, W>(&mut self, reader: &mut R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut served: u64 = 0;

        while let Some(line) = codec::read_line_limited(reader, self.line_limit).await? {
            let response = match line {
                Line::Data(line) => self.handle_line(&line),
                Line::TooLong { length } => {
                    tracing::warn!(length, limit = self.line_limit, "Oversized request line");
                    Exception::decode(format!(
                        "request line of {length} bytes exceeds the {} byte limit",
                        self.line_limit
                    ))
                    .into_response()
                }
            };
            let json = serde_json::to_string(&response)?;
            codec::write_line(writer, &json).await?;
            served += 1;
        }

        tracing::info!(
            served,
            live_references = self.registry.len(),
            "Input closed, dispatcher exiting"
        );
        Ok(())
    }

    /// Handle one raw request line
    pub fn handle_line(&mut self, line: &[u8]) -> Response {
        match serde_json::from_slice::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable request line");
                Exception::decode(e.to_string()).into_response()
            }
        }
    }

    /// Execute a decoded request and encode its outcome
    pub fn handle(&mut self, request: Request) -> Response {
        let func = request.func.clone();
        tracing::debug!(func = %func, args = request.args.len(), "Request");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(request)));

        match outcome {
            Ok(Ok(value)) => Response::ok(encode::encode(value, &mut self.registry)),
            Ok(Err(exception)) => {
                tracing::debug!(func = %func, %exception, "Request raised");
                exception.into_response()
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(func = %func, %message, "Request panicked");
                Exception::runtime(message).into_response()
            }
        }
    }

    fn execute(&mut self, request: Request) -> Raised<Value> {
        let operation = Operation::from_name(&request.func)
            .ok_or_else(|| Exception::unknown_operation(&request.func))?;
        let mut args = Args::new(operation.as_str(), request.args, request.kwargs);

        match operation {
            Operation::GetFromNamespace => {
                let name = args.take_str("name")?;
                args.finish()?;
                self.namespace.get(&name)
            }
            Operation::Free => {
                let id = args.take_id("id")?;
                args.finish()?;
                self.registry.release(id)?;
                Ok(Value::Null)
            }
            Operation::RemoteObjectCall => {
                let id = args.take_id("id")?;
                let method = args.take_str("method")?;
                let target = self.registry.resolve(id)?;
                let method = Method::from_name(&method).ok_or_else(|| Exception::not_supported(&method))?;
                self.call_method(target, method, args)
            }
        }
    }

    fn call_method(&self, target: ObjectRef, method: Method, mut args: Args) -> Raised<Value> {
        match method {
            Method::GetAttribute => {
                let name = args.take_str("name")?;
                args.finish()?;
                target.get_attribute(&name)
            }
            Method::SetAttribute => {
                let name = args.take_str("name")?;
                let value = encode::decode(args.take("value")?, &self.registry)?;
                args.finish()?;
                target.set_attribute(&name, value)?;
                Ok(Value::Null)
            }
            Method::Invoke => {
                let (positional, kwargs) = args.into_parts();
                let positional = positional
                    .into_iter()
                    .map(|v| encode::decode(v, &self.registry))
                    .collect::<Raised<Vec<_>>>()?;
                let kwargs = encode::decode_map(kwargs, &self.registry)?;
                target.invoke(positional, kwargs)
            }
            Method::Represent => {
                args.finish()?;
                Ok(Value::Str(target.represent()))
            }
        }
    }
}

/// Argument binder: positional first, then keyword by parameter name
struct Args {
    func: &'static str,
    positional: VecDeque<Json>,
    kwargs: Map<String, Json>,
}

impl Args {
    fn new(func: &'static str, positional: Vec<Json>, kwargs: Map<String, Json>) -> Self {
        Self {
            func,
            positional: positional.into(),
            kwargs,
        }
    }

    fn take(&mut self, name: &str) -> Raised<Json> {
        self.positional
            .pop_front()
            .or_else(|| self.kwargs.remove(name))
            .ok_or_else(|| {
                Exception::type_error(format!(
                    "{}() missing required argument: '{name}'",
                    self.func
                ))
            })
    }

    fn take_str(&mut self, name: &str) -> Raised<String> {
        match self.take(name)? {
            Json::String(s) => Ok(s),
            other => Err(Exception::type_error(format!(
                "{}() argument '{name}' must be a string, not {}",
                self.func,
                json_type(&other)
            ))),
        }
    }

    fn take_id(&mut self, name: &str) -> Raised<u64> {
        let value = self.take(name)?;
        value.as_u64().ok_or_else(|| {
            Exception::type_error(format!(
                "{}() argument '{name}' must be a reference id, not {}",
                self.func,
                json_type(&value)
            ))
        })
    }

    fn finish(self) -> Raised<()> {
        if self.positional.is_empty() && self.kwargs.is_empty() {
            return Ok(());
        }
        let mut extra: Vec<String> = Vec::new();
        if !self.positional.is_empty() {
            extra.push(format!("{} positional", self.positional.len()));
        }
        extra.extend(self.kwargs.keys().map(|k| format!("'{k}'")));
        Err(Exception::type_error(format!(
            "{}() got unexpected arguments: {}",
            self.func,
            extra.join(", ")
        )))
    }

    fn into_parts(self) -> (Vec<Json>, Map<String, Json>) {
        (self.positional.into(), self.kwargs)
    }
}

fn json_type(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "str",
        Json::Array(_) => "list",
        Json::Object(_) => "map",
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker callable panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::object::{Kwargs, Object, StaticNamespace};
    use serde_json::json;
    use std::io::Cursor;
    use std::sync::Mutex;
    use tokio::io::BufReader;

    struct Cell {
        value: Mutex<Value>,
    }

    impl Object for Cell {
        fn type_name(&self) -> &str {
            "Cell"
        }

        fn get_attribute(&self, name: &str) -> Raised<Value> {
            match (name, self.value.lock()) {
                ("value", Ok(v)) => Ok(v.clone()),
                _ => Err(Exception::attribute(self.type_name(), name)),
            }
        }

        fn set_attribute(&self, name: &str, value: Value) -> Raised<()> {
            match (name, self.value.lock()) {
                ("value", Ok(mut v)) => {
                    *v = value;
                    Ok(())
                }
                _ => Err(Exception::attribute(self.type_name(), name)),
            }
        }

        fn represent(&self) -> String {
            match self.value.lock() {
                Ok(v) => format!("Cell({})", v.represent()),
                Err(_) => "Cell(<poisoned>)".to_string(),
            }
        }
    }

    fn namespace() -> StaticNamespace {
        StaticNamespace::new("testlib")
            .with_value("version", "2.1")
            .with_function("cell", |args, _| {
                let initial = args.into_iter().next().unwrap_or(Value::Null);
                Ok(Value::object(Cell {
                    value: Mutex::new(initial),
                }))
            })
            .with_function("describe", |args, kwargs: Kwargs| {
                let text = args.iter().map(Value::represent).collect::<Vec<_>>().join(",");
                let keys = kwargs.keys().cloned().collect::<Vec<_>>().join(",");
                Ok(Value::Str(format!("{text}|{keys}")))
            })
            .with_function("fail", |_, _| {
                Err(Exception::new("ValueErrorEquivalent", vec![json!("bad"), json!(1), json!(2)]))
            })
            .with_function("boom", |_, _| panic!("kaboom"))
    }

    fn dispatcher() -> Dispatcher<StaticNamespace> {
        Dispatcher::new(namespace())
    }

    fn request(d: &mut Dispatcher<StaticNamespace>, value: Json) -> Response {
        d.handle_line(value.to_string().as_bytes())
    }

    fn returned_id(resp: &Response) -> u64 {
        match resp {
            Response::Ok { value } => value["__id"].as_u64().unwrap(),
            other => panic!("expected ok, got {other:?}"),
        }
    }

    fn get(d: &mut Dispatcher<StaticNamespace>, name: &str) -> Response {
        request(d, json!({"func": "get_from_namespace", "args": [name], "kwargs": {}}))
    }

    fn call(d: &mut Dispatcher<StaticNamespace>, id: u64, method: &str, rest: Vec<Json>, kwargs: Json) -> Response {
        let mut args = vec![json!(id), json!(method)];
        args.extend(rest);
        request(d, json!({"func": "remote_object_call", "args": args, "kwargs": kwargs}))
    }

    fn assert_ng(resp: &Response, expected: &str) {
        match resp {
            Response::Error { exception, .. } => assert_eq!(exception, expected),
            other => panic!("expected {expected}, got {other:?}"),
        }
    }

    #[test]
    fn test_plain_namespace_value() {
        let mut d = dispatcher();
        assert_eq!(get(&mut d, "version"), Response::ok(json!("2.1")));
        assert!(d.registry().is_empty());
    }

    #[test]
    fn test_malformed_line_is_decode_error() {
        let mut d = dispatcher();
        assert_ng(&d.handle_line(b"{not json"), "DecodeError");
        assert_ng(&d.handle_line(b""), "DecodeError");
        assert_ng(&d.handle_line(&[0xff, 0x00]), "DecodeError");
        assert_ng(&d.handle_line(br#"{"args": []}"#), "DecodeError");
    }

    #[test]
    fn test_unknown_operation() {
        let mut d = dispatcher();
        let resp = request(&mut d, json!({"func": "exec", "args": [], "kwargs": {}}));
        assert_eq!(resp, Response::error("UnknownOperationError", vec![json!("exec")]));
    }

    #[test]
    fn test_unknown_method_is_not_supported() {
        let mut d = dispatcher();
        let id = returned_id(&get(&mut d, "cell"));
        let resp = call(&mut d, id, "__del__", vec![], json!({}));
        assert_eq!(resp, Response::error("NotSupportedError", vec![json!("__del__")]));
    }

    #[test]
    fn test_unknown_id_checked_before_method() {
        let mut d = dispatcher();
        let resp = call(&mut d, 404, "__del__", vec![], json!({}));
        assert_ng(&resp, "UnknownReferenceError");
    }

    #[test]
    fn test_invoke_returns_new_reference() {
        let mut d = dispatcher();
        let f = returned_id(&get(&mut d, "cell"));
        let c = returned_id(&call(&mut d, f, "invoke", vec![json!(5)], json!({})));
        assert_ne!(f, c);

        let repr = call(&mut d, c, "represent", vec![], json!({}));
        assert_eq!(repr, Response::ok(json!("Cell(5)")));
    }

    #[test]
    fn test_get_and_set_attribute() {
        let mut d = dispatcher();
        let f = returned_id(&get(&mut d, "cell"));
        let c = returned_id(&call(&mut d, f, "invoke", vec![], json!({})));

        let set = call(&mut d, c, "set_attribute", vec![json!("value"), json!([1, 2])], json!({}));
        assert_eq!(set, Response::ok(Json::Null));

        let got = call(&mut d, c, "get_attribute", vec![json!("value")], json!({}));
        assert_eq!(got, Response::ok(json!([1, 2])));

        let missing = call(&mut d, c, "get_attribute", vec![json!("other")], json!({}));
        assert_ng(&missing, "AttributeError");
    }

    #[test]
    fn test_keyword_binding() {
        let mut d = dispatcher();
        let resp = request(
            &mut d,
            json!({"func": "get_from_namespace", "args": [], "kwargs": {"name": "version"}}),
        );
        assert_eq!(resp, Response::ok(json!("2.1")));

        let f = returned_id(&get(&mut d, "describe"));
        let resp = call(&mut d, f, "invoke", vec![json!(1), json!("a")], json!({"id": 3, "method": "m"}));
        assert_eq!(resp, Response::ok(json!(r#"1,"a"|id,method"#)));
    }

    #[test]
    fn test_argument_errors() {
        let mut d = dispatcher();
        let missing = request(&mut d, json!({"func": "get_from_namespace", "args": [], "kwargs": {}}));
        assert_ng(&missing, "TypeError");

        let extra = request(&mut d, json!({"func": "free", "args": [1, 2], "kwargs": {}}));
        assert_ng(&extra, "TypeError");

        let bad_id = request(&mut d, json!({"func": "free", "args": ["one"], "kwargs": {}}));
        assert_ng(&bad_id, "TypeError");
    }

    #[test]
    fn test_free_then_use_fails() {
        let mut d = dispatcher();
        let id = returned_id(&get(&mut d, "cell"));

        let freed = request(&mut d, json!({"func": "free", "args": [id], "kwargs": {}}));
        assert_eq!(freed, Response::ok(Json::Null));

        assert_ng(&call(&mut d, id, "represent", vec![], json!({})), "UnknownReferenceError");
        let again = request(&mut d, json!({"func": "free", "args": [id], "kwargs": {}}));
        assert_eq!(again, Response::error("UnknownReferenceError", vec![json!(id)]));
    }

    #[test]
    fn test_library_exception_preserved() {
        let mut d = dispatcher();
        let f = returned_id(&get(&mut d, "fail"));
        let resp = call(&mut d, f, "invoke", vec![], json!({}));
        assert_eq!(
            resp,
            Response::error("ValueErrorEquivalent", vec![json!("bad"), json!(1), json!(2)])
        );
    }

    #[test]
    fn test_panic_becomes_runtime_error() {
        let mut d = dispatcher();
        let f = returned_id(&get(&mut d, "boom"));
        let resp = call(&mut d, f, "invoke", vec![], json!({}));
        assert_eq!(resp, Response::error("RuntimeError", vec![json!("kaboom")]));

        // Loop state survives
        assert_eq!(get(&mut d, "version"), Response::ok(json!("2.1")));
    }

    #[test]
    fn test_fresh_objects_get_distinct_ids() {
        let mut d = dispatcher();
        let a = returned_id(&get(&mut d, "cell"));
        let b = returned_id(&get(&mut d, "cell"));
        assert_ne!(a, b);
        assert_eq!(d.registry().len(), 2);
    }

    #[test]
    fn test_reference_argument_resolved() {
        let mut d = dispatcher();
        let f = returned_id(&get(&mut d, "cell"));
        let inner = returned_id(&call(&mut d, f, "invoke", vec![json!("x")], json!({})));
        let outer = returned_id(&call(
            &mut d,
            f,
            "invoke",
            vec![json!({"__type": "RemoteObject", "__id": inner})],
            json!({}),
        ));

        let repr = call(&mut d, outer, "represent", vec![], json!({}));
        assert_eq!(repr, Response::ok(json!(r#"Cell(Cell("x"))"#)));
    }

    #[tokio::test]
    async fn test_serve_continues_after_bad_line() {
        let input = concat!(
            "garbage\n",
            r#"{"func": "get_from_namespace", "args": ["version"], "kwargs": {}}"#,
            "\n",
        );
        let mut reader = BufReader::new(Cursor::new(input.as_bytes().to_vec()));
        let mut output = Vec::new();

        let mut d = dispatcher();
        d.serve(&mut reader, &mut output).await.unwrap();

        let lines: Vec<Json> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["code"], "ng");
        assert_eq!(lines[0]["exception"], "DecodeError");
        assert_eq!(lines[1], json!({"code": "ok", "return": "2.1"}));
    }

    #[tokio::test]
    async fn test_serve_answers_oversized_line_and_continues() {
        let mut input = vec![b'x'; 300];
        input.push(b'\n');
        input.extend_from_slice(br#"{"func": "get_from_namespace", "args": ["version"], "kwargs": {}}"#);
        input.push(b'\n');
        let mut reader = BufReader::with_capacity(64, Cursor::new(input));
        let mut output = Vec::new();

        let mut d = dispatcher().with_line_limit(128);
        d.serve(&mut reader, &mut output).await.unwrap();

        let lines: Vec<Json> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["code"], "ng");
        assert_eq!(lines[0]["exception"], "DecodeError");
        assert_eq!(
            lines[0]["args"],
            json!(["request line of 300 bytes exceeds the 128 byte limit"])
        );
        assert_eq!(lines[1], json!({"code": "ok", "return": "2.1"}));
    }

    #[tokio::test]
    async fn test_serve_empty_input_exits_cleanly() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        let mut output = Vec::new();
        dispatcher().serve(&mut reader, &mut output).await.unwrap();
        assert!(output.is_empty());
    }
}
