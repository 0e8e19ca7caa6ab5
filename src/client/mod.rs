//! Client side - drives objects living in the worker
//!
//! A [`Session`] owns the worker process. [`RemoteNamespace`] resolves the
//! wrapped library's top-level names through it, and every non-plain result
//! comes back as a [`ProxyHandle`] forwarding attribute reads, attribute
//! writes, invocation and representation to the worker.

pub mod exception;
pub mod launcher;
pub mod namespace;
pub mod proxy;
pub mod session;
pub mod value;

pub use exception::{ExceptionTable, RemoteError};
pub use launcher::{CommandLauncher, WorkerLauncher};
pub use namespace::RemoteNamespace;
pub use proxy::ProxyHandle;
pub use session::Session;
pub use value::{Kwargs, RemoteValue};
