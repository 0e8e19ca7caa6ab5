//! Wire protocol shared by client and worker
//!
//! One JSON value per line, UTF-8, newline terminated:
//! ```text
//! {"func": "get_from_namespace", "args": ["parse"], "kwargs": {}}
//! {"code": "ok", "return": {"__type": "RemoteObject", "__id": 1}}
//! {"code": "ng", "exception": "UnknownReferenceError", "args": [7]}
//! ```

pub mod codec;
pub mod message;

pub use message::{Method, Operation, Request, Response};

use serde_json::{json, Map, Value};

/// Exception kind names that appear in `ng` responses
pub mod kind {
    pub const DECODE_ERROR: &str = "DecodeError";
    pub const UNKNOWN_OPERATION_ERROR: &str = "UnknownOperationError";
    pub const UNKNOWN_REFERENCE_ERROR: &str = "UnknownReferenceError";
    pub const NOT_SUPPORTED_ERROR: &str = "NotSupportedError";
    pub const PROTOCOL_ERROR: &str = "ProtocolError";

    pub const ATTRIBUTE_ERROR: &str = "AttributeError";
    pub const TYPE_ERROR: &str = "TypeError";
    pub const VALUE_ERROR: &str = "ValueError";
    pub const KEY_ERROR: &str = "KeyError";
    pub const INDEX_ERROR: &str = "IndexError";
    pub const RUNTIME_ERROR: &str = "RuntimeError";
}

const TAG_TYPE: &str = "__type";
const TAG_ID: &str = "__id";
const REMOTE_OBJECT: &str = "RemoteObject";

/// Build the embedded marker for a registry reference
pub fn remote_object_tag(id: u64) -> Value {
    json!({ TAG_TYPE: REMOTE_OBJECT, TAG_ID: id })
}

/// Classification of a JSON mapping with respect to the remote-object tag
#[derive(Debug, PartialEq, Eq)]
pub enum Tag {
    /// Ordinary mapping
    NotTag,
    /// Well-formed tag naming a reference id
    RemoteObject(u64),
    /// `__type` says RemoteObject but `__id` is missing or not an integer
    Malformed,
}

/// Inspect a mapping for the remote-object tag
pub fn classify(map: &Map<String, Value>) -> Tag {
    match map.get(TAG_TYPE).and_then(Value::as_str) {
        Some(REMOTE_OBJECT) => match map.get(TAG_ID).and_then(Value::as_u64) {
            Some(id) => Tag::RemoteObject(id),
            None => Tag::Malformed,
        },
        _ => Tag::NotTag,
    }
}

/// Render exception arguments for a human-readable message
///
/// A single string argument is shown bare, anything else as a JSON array.
pub fn describe_args(args: &[Value]) -> String {
    match args {
        [Value::String(s)] => s.clone(),
        _ => Value::Array(args.to_vec()).to_string(),
    }
}
