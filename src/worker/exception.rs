//! Worker-side exception values
//!
//! Everything that can go wrong while serving a request is an [`Exception`]:
//! a kind name plus constructor arguments. It travels to the client as an
//! `ng` response and never aborts the dispatch loop.

use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::{describe_args, kind, Response};

/// A failure raised while executing a request
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {}", describe_args(.args))]
pub struct Exception {
    /// Kind name, matched by the client against its exception table
    pub kind: String,
    /// Constructor arguments, reproduced verbatim on the client
    ///
    /// Plain JSON only: arguments never pass through the object encoder, so
    /// an exception cannot hand out remote references. Raisers that hold an
    /// object put its representation here instead.
    pub args: Vec<Value>,
}

/// Result type for operations on worker-side objects
pub type Raised<T> = std::result::Result<T, Exception>;

impl Exception {
    /// Create an exception of any kind, including library-defined kinds
    pub fn new(kind: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            kind: kind.into(),
            args,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(kind::DECODE_ERROR, vec![json!(message.into())])
    }

    pub fn unknown_operation(name: &str) -> Self {
        Self::new(kind::UNKNOWN_OPERATION_ERROR, vec![json!(name)])
    }

    pub fn unknown_reference(id: u64) -> Self {
        Self::new(kind::UNKNOWN_REFERENCE_ERROR, vec![json!(id)])
    }

    pub fn not_supported(method: &str) -> Self {
        Self::new(kind::NOT_SUPPORTED_ERROR, vec![json!(method)])
    }

    /// Missing attribute on an object or namespace
    pub fn attribute(owner: &str, name: &str) -> Self {
        Self::new(
            kind::ATTRIBUTE_ERROR,
            vec![json!(format!("'{owner}' object has no attribute '{name}'"))],
        )
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(kind::TYPE_ERROR, vec![json!(message.into())])
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Self::new(kind::VALUE_ERROR, vec![json!(message.into())])
    }

    pub fn key_error(key: impl Into<String>) -> Self {
        Self::new(kind::KEY_ERROR, vec![json!(key.into())])
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        Self::new(kind::RUNTIME_ERROR, vec![json!(message.into())])
    }

    pub fn into_response(self) -> Response {
        Response::error(self.kind, self.args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_single_message() {
        let e = Exception::attribute("Script", "completions");
        assert_eq!(
            e.to_string(),
            "AttributeError: 'Script' object has no attribute 'completions'"
        );
    }

    #[test]
    fn test_display_multiple_args() {
        let e = Exception::new("ValueErrorEquivalent", vec![json!("bad"), json!(1), json!(2)]);
        assert_eq!(e.to_string(), r#"ValueErrorEquivalent: ["bad",1,2]"#);
    }

    #[test]
    fn test_into_response() {
        let resp = Exception::unknown_reference(9).into_response();
        assert_eq!(resp, Response::error("UnknownReferenceError", vec![json!(9)]));
    }
}
