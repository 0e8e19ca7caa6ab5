//! Namespace accessor: top-level names of the wrapped library

use serde_json::json;

use super::session::Session;
use super::value::{Kwargs, RemoteValue};
use crate::common::Result;
use crate::protocol::{kind, Operation};

/// Resolves names in the worker's namespace instead of a local import
#[derive(Debug, Clone)]
pub struct RemoteNamespace {
    session: Session,
}

impl RemoteNamespace {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Fetch attribute `name`; plain data by value, anything else as a proxy
    pub async fn get(&self, name: &str) -> Result<RemoteValue> {
        self.session
            .call(Operation::GetFromNamespace.as_str(), &[name.into()], &Kwargs::new())
            .await
    }

    /// Fetch `name` and invoke it
    ///
    /// The intermediate handle is disposed before returning.
    pub async fn call(&self, name: &str, args: &[RemoteValue], kwargs: &Kwargs) -> Result<RemoteValue> {
        let function = match self.get(name).await? {
            RemoteValue::Proxy(p) => p,
            other => {
                let message = format!("'{name}' is not callable (got {})", other.to_json());
                return Err(self
                    .session
                    .exceptions()
                    .reconstruct(kind::TYPE_ERROR, vec![json!(message)])
                    .into());
            }
        };

        let result = function.invoke(args, kwargs).await;
        function.dispose().await;
        result
    }
}
