//! Worker side - hosts the real objects
//!
//! A worker binary builds a [`Namespace`] for the library it wraps and hands it
//! to [`run`], which serves requests on stdin/stdout until stdin closes.

pub mod dispatcher;
pub mod encode;
pub mod exception;
pub mod object;
pub mod registry;

pub use dispatcher::Dispatcher;
pub use exception::{Exception, Raised};
pub use object::{Kwargs, NativeFn, Namespace, Object, ObjectRef, StaticNamespace, Value};
pub use registry::Registry;

use tokio::io::BufReader;

use crate::common::Result;

/// Serve the protocol on this process's stdin/stdout
///
/// Returns when the client closes stdin. Nothing else may write to stdout
/// while this runs.
pub async fn run<N: Namespace>(namespace: N) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "Starting worker"
    );

    let mut reader = BufReader::new(tokio::io::stdin());
    let mut writer = tokio::io::stdout();

    let mut dispatcher = Dispatcher::new(namespace);
    dispatcher.serve(&mut reader, &mut writer).await
}
