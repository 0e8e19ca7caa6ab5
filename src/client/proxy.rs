//! Proxy handles for objects that live in the worker
//!
//! A handle does not own its object; the worker's registry does. The handle
//! is a capability to reach it by id through four operations. Bookkeeping
//! (`id`, `generation`, `session`) is answered locally and never forwarded.

use std::fmt;
use std::sync::Arc;

use super::session::{RemoteRef, Session};
use super::value::{Kwargs, RemoteValue};
use crate::common::{Error, Result};
use crate::protocol::Method;

/// Client-side stand-in for a worker-side object
///
/// Clones share one registry entry. When the last clone goes away the entry is
/// freed: immediately with [`ProxyHandle::dispose`], or on the session's next
/// exchange when simply dropped.
#[derive(Clone)]
pub struct ProxyHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    session: Session,
    target: RemoteRef,
    released: bool,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        if !self.released {
            self.session.defer_free(self.target);
        }
    }
}

impl ProxyHandle {
    pub(crate) fn new(session: Session, target: RemoteRef) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                session,
                target,
                released: false,
            }),
        }
    }

    /// Registry id in the worker that issued this handle
    pub fn id(&self) -> u64 {
        self.inner.target.id
    }

    /// Worker incarnation that issued this handle
    pub fn generation(&self) -> u64 {
        self.inner.target.generation
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub(crate) fn target(&self) -> RemoteRef {
        self.inner.target
    }

    /// Read attribute `name` of the remote object
    pub async fn get_attribute(&self, name: &str) -> Result<RemoteValue> {
        self.forward(Method::GetAttribute, &[name.into()], &Kwargs::new())
            .await
    }

    /// Write attribute `name` of the remote object
    pub async fn set_attribute(&self, name: &str, value: impl Into<RemoteValue>) -> Result<()> {
        self.forward(Method::SetAttribute, &[name.into(), value.into()], &Kwargs::new())
            .await
            .map(|_| ())
    }

    /// Invoke the remote object with positional and keyword arguments
    pub async fn invoke(&self, args: &[RemoteValue], kwargs: &Kwargs) -> Result<RemoteValue> {
        self.forward(Method::Invoke, args, kwargs).await
    }

    /// Invoke with positional arguments only
    pub async fn call(&self, args: &[RemoteValue]) -> Result<RemoteValue> {
        self.invoke(args, &Kwargs::new()).await
    }

    /// The remote object's native textual representation
    pub async fn represent(&self) -> Result<String> {
        match self.forward(Method::Represent, &[], &Kwargs::new()).await? {
            RemoteValue::String(s) => Ok(s),
            other => Err(Error::Protocol(format!(
                "represent returned a non-string value: {}",
                other.to_json()
            ))),
        }
    }

    /// Free the remote object now if this is the last clone
    ///
    /// Never fails: a reference that is already gone (released elsewhere, or
    /// lost with a restarted worker) is ignored.
    pub async fn dispose(self) {
        let Ok(mut inner) = Arc::try_unwrap(self.inner) else {
            return;
        };
        inner.released = true;

        if let Err(e) = inner.session.release(inner.target).await {
            tracing::debug!(id = inner.target.id, error = %e, "Ignoring failed free on dispose");
        }
    }

    async fn forward(&self, method: Method, args: &[RemoteValue], kwargs: &Kwargs) -> Result<RemoteValue> {
        self.inner
            .session
            .remote_object_call(self.inner.target, method, args, kwargs)
            .await
    }
}

impl PartialEq for ProxyHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.target == other.inner.target && self.inner.session.ptr_eq(&other.inner.session)
    }
}

impl fmt::Debug for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyHandle")
            .field("id", &self.inner.target.id)
            .field("generation", &self.inner.target.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::launcher::CommandLauncher;

    fn handle(session: &Session, id: u64) -> ProxyHandle {
        ProxyHandle::new(session.clone(), RemoteRef { generation: 1, id })
    }

    #[test]
    fn test_bookkeeping_is_local() {
        let session = Session::new(CommandLauncher::new("unused"));
        let h = handle(&session, 12);

        assert_eq!(h.id(), 12);
        assert_eq!(h.generation(), 1);
        assert!(h.session().ptr_eq(&session));
        assert_eq!(format!("{h:?}"), "ProxyHandle { id: 12, generation: 1 }");
    }

    #[test]
    fn test_equality_by_target_and_session() {
        let session = Session::new(CommandLauncher::new("unused"));
        let other = Session::new(CommandLauncher::new("unused"));

        assert_eq!(handle(&session, 1), handle(&session, 1));
        assert_ne!(handle(&session, 1), handle(&session, 2));
        assert_ne!(handle(&session, 1), handle(&other, 1));
    }
}
