//! Request/response message types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A request line: one operation with positional and keyword arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Operation name, looked up in the worker's operation table
    pub func: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Request {
    pub fn new(func: impl Into<String>, args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            func: func.into(),
            args,
            kwargs,
        }
    }
}

/// A response line, strictly following its request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum Response {
    #[serde(rename = "ok")]
    Ok {
        #[serde(rename = "return", default)]
        value: Value,
    },

    #[serde(rename = "ng")]
    Error {
        /// Exception kind name
        exception: String,
        /// Exception constructor arguments
        #[serde(default)]
        args: Vec<Value>,
    },
}

impl Response {
    pub fn ok(value: Value) -> Self {
        Self::Ok { value }
    }

    pub fn error(exception: impl Into<String>, args: Vec<Value>) -> Self {
        Self::Error {
            exception: exception.into(),
            args,
        }
    }
}

/// Operations in the worker's fixed operation table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read a top-level attribute of the wrapped namespace
    GetFromNamespace,
    /// Release a registry entry
    Free,
    /// Forward a method to a registered object
    RemoteObjectCall,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::GetFromNamespace,
        Operation::Free,
        Operation::RemoteObjectCall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetFromNamespace => "get_from_namespace",
            Self::Free => "free",
            Self::RemoteObjectCall => "remote_object_call",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == name)
    }
}

/// Methods accepted by `remote_object_call`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GetAttribute,
    SetAttribute,
    Invoke,
    Represent,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::GetAttribute,
        Method::SetAttribute,
        Method::Invoke,
        Method::Represent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetAttribute => "get_attribute",
            Self::SetAttribute => "set_attribute",
            Self::Invoke => "invoke",
            Self::Represent => "represent",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}
