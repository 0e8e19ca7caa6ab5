//! objproxy - drive objects living in a worker process
//!
//! A client program talks to a separate worker process over its stdin and
//! stdout, one JSON request per line. Values that cannot travel as plain data
//! stay in the worker and are represented on the client by [`ProxyHandle`]s.
//!
//! The [`worker`] module is the worker-side half: a reference registry and a
//! dispatcher serving any [`worker::Namespace`]. The [`client`] module is the
//! client-side half: the [`Session`] that owns the worker, the namespace
//! accessor and exception reconstruction.

pub mod cli;
pub mod client;
pub mod commands;
pub mod common;
pub mod protocol;
pub mod worker;

// Re-export commonly used types
pub use client::{ExceptionTable, Kwargs, ProxyHandle, RemoteError, RemoteNamespace, RemoteValue, Session};
pub use common::{Error, Result};
