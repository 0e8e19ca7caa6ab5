//! Client-side exception reconstruction
//!
//! An `ng` response carries a kind name and constructor arguments. The
//! [`ExceptionTable`] maps kind names to local constructors: kinds exported by
//! the wrapped library's binding surface are tried first, then the built-in
//! kinds, and anything else becomes [`RemoteError::Generic`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;

use crate::protocol::{describe_args, kind};

/// An exception raised in the worker, reconstructed locally
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    #[error("DecodeError: {}", describe_args(.0))]
    Decode(Vec<Value>),

    #[error("UnknownOperationError: {}", describe_args(.0))]
    UnknownOperation(Vec<Value>),

    #[error("UnknownReferenceError: {}", describe_args(.0))]
    UnknownReference(Vec<Value>),

    #[error("NotSupportedError: {}", describe_args(.0))]
    NotSupported(Vec<Value>),

    #[error("AttributeError: {}", describe_args(.0))]
    Attribute(Vec<Value>),

    #[error("TypeError: {}", describe_args(.0))]
    Type(Vec<Value>),

    #[error("ValueError: {}", describe_args(.0))]
    Value(Vec<Value>),

    #[error("KeyError: {}", describe_args(.0))]
    Key(Vec<Value>),

    #[error("IndexError: {}", describe_args(.0))]
    Index(Vec<Value>),

    #[error("RuntimeError: {}", describe_args(.0))]
    Runtime(Vec<Value>),

    /// A kind exported by the wrapped library, arguments kept verbatim
    #[error("{kind}: {}", describe_args(.args))]
    Library { kind: String, args: Vec<Value> },

    /// Unknown kind; `args` holds the single message `"<kind>: <args>"`
    #[error("{}", describe_args(.args))]
    Generic { kind: String, args: Vec<Value> },
}

impl RemoteError {
    /// Kind name as reported by the worker
    pub fn kind(&self) -> &str {
        match self {
            Self::Decode(_) => kind::DECODE_ERROR,
            Self::UnknownOperation(_) => kind::UNKNOWN_OPERATION_ERROR,
            Self::UnknownReference(_) => kind::UNKNOWN_REFERENCE_ERROR,
            Self::NotSupported(_) => kind::NOT_SUPPORTED_ERROR,
            Self::Attribute(_) => kind::ATTRIBUTE_ERROR,
            Self::Type(_) => kind::TYPE_ERROR,
            Self::Value(_) => kind::VALUE_ERROR,
            Self::Key(_) => kind::KEY_ERROR,
            Self::Index(_) => kind::INDEX_ERROR,
            Self::Runtime(_) => kind::RUNTIME_ERROR,
            Self::Library { kind, .. } | Self::Generic { kind, .. } => kind,
        }
    }

    /// Constructor arguments of the reconstructed exception
    pub fn args(&self) -> &[Value] {
        match self {
            Self::Decode(args)
            | Self::UnknownOperation(args)
            | Self::UnknownReference(args)
            | Self::NotSupported(args)
            | Self::Attribute(args)
            | Self::Type(args)
            | Self::Value(args)
            | Self::Key(args)
            | Self::Index(args)
            | Self::Runtime(args) => args,
            Self::Library { args, .. } | Self::Generic { args, .. } => args,
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, Self::Generic { .. })
    }

    /// Stale or released reference: the id is no longer in the worker's registry
    pub fn unknown_reference(id: u64) -> Self {
        Self::UnknownReference(vec![json!(id)])
    }
}

type Constructor = Arc<dyn Fn(Vec<Value>) -> RemoteError + Send + Sync>;

/// Kinds every client understands without registration
const BUILTIN: &[(&str, fn(Vec<Value>) -> RemoteError)] = &[
    (kind::DECODE_ERROR, RemoteError::Decode),
    (kind::UNKNOWN_OPERATION_ERROR, RemoteError::UnknownOperation),
    (kind::UNKNOWN_REFERENCE_ERROR, RemoteError::UnknownReference),
    (kind::NOT_SUPPORTED_ERROR, RemoteError::NotSupported),
    (kind::ATTRIBUTE_ERROR, RemoteError::Attribute),
    (kind::TYPE_ERROR, RemoteError::Type),
    (kind::VALUE_ERROR, RemoteError::Value),
    (kind::KEY_ERROR, RemoteError::Key),
    (kind::INDEX_ERROR, RemoteError::Index),
    (kind::RUNTIME_ERROR, RemoteError::Runtime),
];

/// Mapping from kind names to local exception constructors
#[derive(Clone, Default)]
pub struct ExceptionTable {
    library: HashMap<String, Constructor>,
}

impl ExceptionTable {
    /// Table with only the built-in kinds
    pub fn new() -> Self {
        Self::default()
    }

    /// Table recognizing each of `kinds` as a library exception
    pub fn with_library_kinds<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Self::new();
        for kind in kinds {
            table.register_kind(kind);
        }
        table
    }

    /// Recognize `kind` as a library exception keeping its arguments verbatim
    pub fn register_kind(&mut self, kind: impl Into<String>) {
        let kind = kind.into();
        let name = kind.clone();
        self.library.insert(
            kind,
            Arc::new(move |args| RemoteError::Library {
                kind: name.clone(),
                args,
            }),
        );
    }

    /// Register a custom constructor for `kind`; takes precedence over built-ins
    pub fn register<F>(&mut self, kind: impl Into<String>, constructor: F)
    where
        F: Fn(Vec<Value>) -> RemoteError + Send + Sync + 'static,
    {
        self.library.insert(kind.into(), Arc::new(constructor));
    }

    /// Build the local exception for a worker-reported failure
    pub fn reconstruct(&self, kind: &str, args: Vec<Value>) -> RemoteError {
        if let Some(constructor) = self.library.get(kind) {
            return constructor(args);
        }

        if let Some((_, constructor)) = BUILTIN.iter().find(|(name, _)| *name == kind) {
            return constructor(args);
        }

        tracing::debug!(kind, "Unrecognized exception kind, using generic exception");
        RemoteError::Generic {
            kind: kind.to_string(),
            args: vec![json!(format!("{kind}: {}", Value::Array(args)))],
        }
    }
}

impl fmt::Debug for ExceptionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&String> = self.library.keys().collect();
        kinds.sort();
        f.debug_struct("ExceptionTable").field("library", &kinds).finish()
    }
}
