//! Session manager: owns the worker process and the request/response exchange
//!
//! The worker is started lazily on the first call and restarted whenever it
//! is found to have exited. Each incarnation gets a new generation number;
//! proxy handles remember the generation they were created in, so a handle
//! can never reach an object of a later incarnation that happens to reuse
//! its id.

use std::fmt;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Map, Value as Json};
use tokio::io::{BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout};

use crate::common::config::{Config, SessionConfig};
use crate::common::{Error, Result};
use crate::protocol::codec::{self, Line};
use crate::protocol::{kind, Method, Operation, Request, Response};

use super::exception::ExceptionTable;
use super::launcher::{CommandLauncher, WorkerLauncher};
use super::namespace::RemoteNamespace;
use super::value::{self, Kwargs, RemoteValue};

/// A reference id qualified by the worker incarnation that issued it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RemoteRef {
    pub generation: u64,
    pub id: u64,
}

/// Client-side binding to one worker process at a time
///
/// Cloning is cheap and shares the same worker. Calls are serialized: a call
/// holds the worker until its response line has been read.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

struct Shared {
    launcher: Box<dyn WorkerLauncher>,
    exceptions: ExceptionTable,
    options: SessionConfig,
    state: tokio::sync::Mutex<State>,
    /// Frees queued by dropped handles, sent before the next exchange
    deferred: Mutex<Vec<RemoteRef>>,
}

#[derive(Default)]
struct State {
    worker: Option<Worker>,
    generation: u64,
}

/// One running worker incarnation
struct Worker {
    child: Child,
    reader: BufReader<ChildStdout>,
    writer: BufWriter<ChildStdin>,
    generation: u64,
}

impl Session {
    /// Create a session with default options and only built-in exception kinds
    ///
    /// No process is started until the first call.
    pub fn new<L: WorkerLauncher + 'static>(launcher: L) -> Self {
        Self::with_options(launcher, SessionConfig::default(), ExceptionTable::new())
    }

    pub fn with_options<L: WorkerLauncher + 'static>(
        launcher: L,
        options: SessionConfig,
        exceptions: ExceptionTable,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                launcher: Box::new(launcher),
                exceptions,
                options,
                state: tokio::sync::Mutex::new(State::default()),
                deferred: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Build a session from the loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let launcher = CommandLauncher::from_config(&config.worker)?;
        let exceptions = ExceptionTable::with_library_kinds(config.exceptions.library.iter().cloned());
        Ok(Self::with_options(launcher, config.session.clone(), exceptions))
    }

    /// Accessor for the wrapped library's top-level names
    pub fn namespace(&self) -> RemoteNamespace {
        RemoteNamespace::new(self.clone())
    }

    pub fn exceptions(&self) -> &ExceptionTable {
        &self.shared.exceptions
    }

    /// Start the worker if none is running; returns the current generation
    pub async fn ensure_worker(&self) -> Result<u64> {
        let mut state = self.shared.state.lock().await;
        self.ensure_worker_locked(&mut state).await
    }

    /// Generation of the most recently started worker (0 before the first start)
    pub async fn generation(&self) -> u64 {
        self.shared.state.lock().await.generation
    }

    /// OS process id of the running worker, if any
    pub async fn worker_pid(&self) -> Option<u32> {
        let state = self.shared.state.lock().await;
        state.worker.as_ref().and_then(|w| w.child.id())
    }

    /// Perform one request/response exchange
    pub async fn call(&self, func: &str, args: &[RemoteValue], kwargs: &Kwargs) -> Result<RemoteValue> {
        self.exchange(func, |generation| {
            let args = args
                .iter()
                .map(|a| value::encode(a, self, generation))
                .collect::<Result<Vec<_>>>()?;
            let kwargs = value::encode_map(kwargs, self, generation)?;
            Ok((args, kwargs))
        })
        .await
    }

    /// Release a reference id in the current worker
    pub async fn free(&self, id: u64) -> Result<()> {
        self.exchange(Operation::Free.as_str(), |_| Ok((vec![json!(id)], Map::new())))
            .await
            .map(|_| ())
    }

    /// Close the worker's stdin and wait for it to exit
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if let Some(worker) = state.worker.take() {
            let Worker {
                mut child,
                writer,
                generation,
                ..
            } = worker;
            drop(writer);
            let status = child.wait().await?;
            tracing::info!(generation, %status, "Worker shut down");
        }
        Ok(())
    }

    /// Kill the worker; the next call starts a fresh one
    ///
    /// This is the only way to recover from a worker that stopped responding.
    /// Every outstanding proxy handle becomes unresolvable.
    pub async fn terminate(&self) -> Result<()> {
        let mut state = self.shared.state.lock().await;
        if let Some(mut worker) = state.worker.take() {
            worker.child.start_kill()?;
            let status = worker.child.wait().await?;
            tracing::info!(generation = worker.generation, %status, "Worker terminated");
        }
        Ok(())
    }

    pub(crate) async fn remote_object_call(
        &self,
        target: RemoteRef,
        method: Method,
        args: &[RemoteValue],
        kwargs: &Kwargs,
    ) -> Result<RemoteValue> {
        self.exchange(Operation::RemoteObjectCall.as_str(), |generation| {
            self.check_current(target, generation)?;
            let mut encoded = vec![json!(target.id), json!(method.as_str())];
            for arg in args {
                encoded.push(value::encode(arg, self, generation)?);
            }
            Ok((encoded, value::encode_map(kwargs, self, generation)?))
        })
        .await
    }

    /// Free a handle's reference now
    pub(crate) async fn release(&self, target: RemoteRef) -> Result<()> {
        {
            // Nothing to free, and no reason to start a worker just to find out
            let state = self.shared.state.lock().await;
            if state.worker.is_none() || state.generation != target.generation {
                return Err(self.stale(target));
            }
        }

        self.exchange(Operation::Free.as_str(), |generation| {
            self.check_current(target, generation)?;
            Ok((vec![json!(target.id)], Map::new()))
        })
        .await
        .map(|_| ())
    }

    /// Queue a free for the next exchange; called from `Drop`, so it cannot block
    pub(crate) fn defer_free(&self, target: RemoteRef) {
        if let Ok(mut deferred) = self.shared.deferred.lock() {
            deferred.push(target);
        }
    }

    /// Fail with `UnknownReferenceError` if `target` belongs to an older worker
    pub(crate) fn check_current(&self, target: RemoteRef, generation: u64) -> Result<()> {
        if target.generation == generation {
            return Ok(());
        }
        tracing::debug!(
            id = target.id,
            handle_generation = target.generation,
            generation,
            "Handle outlived its worker"
        );
        Err(self.stale(target))
    }

    fn stale(&self, target: RemoteRef) -> Error {
        self.shared
            .exceptions
            .reconstruct(kind::UNKNOWN_REFERENCE_ERROR, vec![json!(target.id)])
            .into()
    }

    pub(crate) fn ptr_eq(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Run one request with arguments built for the live generation
    async fn exchange<F>(&self, func: &str, build: F) -> Result<RemoteValue>
    where
        F: FnOnce(u64) -> Result<(Vec<Json>, Map<String, Json>)>,
    {
        let mut state = self.shared.state.lock().await;

        self.ensure_worker_locked(&mut state).await?;
        self.flush_deferred(&mut state).await;
        let generation = self.ensure_worker_locked(&mut state).await?;

        let (args, kwargs) = build(generation)?;
        let request = Request::new(func, args, kwargs);

        match Self::round_trip(&mut state, &request).await? {
            Response::Ok { value } => value::decode(value, self, generation),
            Response::Error { exception, args } => {
                tracing::debug!(func, exception = %exception, "Remote exception");
                Err(self.shared.exceptions.reconstruct(&exception, args).into())
            }
        }
    }

    /// Send queued frees that still belong to the live worker; failures are dropped
    async fn flush_deferred(&self, state: &mut State) {
        let pending: Vec<RemoteRef> = match self.shared.deferred.lock() {
            Ok(mut deferred) => std::mem::take(&mut *deferred),
            Err(_) => return,
        };

        for target in pending {
            if target.generation != state.generation || state.worker.is_none() {
                continue;
            }
            let request = Request::new(Operation::Free.as_str(), vec![json!(target.id)], Map::new());
            match Self::round_trip(state, &request).await {
                Ok(Response::Ok { .. }) => tracing::trace!(id = target.id, "Deferred free sent"),
                Ok(Response::Error { exception, .. }) => {
                    tracing::debug!(id = target.id, exception = %exception, "Deferred free rejected")
                }
                Err(e) => tracing::debug!(id = target.id, error = %e, "Deferred free failed"),
            }
        }
    }

    async fn ensure_worker_locked(&self, state: &mut State) -> Result<u64> {
        if let Some(worker) = state.worker.as_mut() {
            match worker.child.try_wait() {
                Ok(None) => return Ok(worker.generation),
                Ok(Some(status)) => {
                    tracing::warn!(generation = worker.generation, %status, "Worker exited, restarting");
                }
                Err(e) => {
                    tracing::warn!(generation = worker.generation, error = %e, "Cannot poll worker, restarting");
                }
            }
            state.worker = None;
        }

        let generation = state.generation + 1;
        let worker = self.spawn_worker(generation).await?;
        state.generation = generation;
        state.worker = Some(worker);
        Ok(generation)
    }

    async fn spawn_worker(&self, generation: u64) -> Result<Worker> {
        let attempts = self.shared.options.start_attempts.max(1);
        let backoff = Duration::from_millis(self.shared.options.restart_backoff_ms);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.try_spawn(generation) {
                Ok(worker) => {
                    tracing::info!(
                        generation,
                        pid = worker.child.id(),
                        attempt,
                        worker = %self.shared.launcher.describe(),
                        "Worker started"
                    );
                    return Ok(worker);
                }
                Err(e) => {
                    tracing::warn!(attempt, attempts, error = %e, "Worker failed to start");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(backoff * attempt).await;
                    }
                }
            }
        }

        Err(Error::WorkerStartFailed {
            attempts,
            reason: last_error,
        })
    }

    fn try_spawn(&self, generation: u64) -> Result<Worker> {
        let mut cmd = self.shared.launcher.command()?;
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).kill_on_drop(true);

        let mut child = cmd.spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to get worker stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Io(std::io::Error::other("failed to get worker stdout")))?;

        Ok(Worker {
            child,
            reader: BufReader::new(stdout),
            writer: BufWriter::new(stdin),
            generation,
        })
    }

    /// Write one request line and read exactly one response line
    ///
    /// A broken channel discards the worker so the next call restarts it.
    async fn round_trip(state: &mut State, request: &Request) -> Result<Response> {
        let worker = state.worker.as_mut().ok_or(Error::WorkerExited)?;
        let json = serde_json::to_string(request)?;
        tracing::trace!(generation = worker.generation, ">>> {}", json);

        let line = match codec::write_line(&mut worker.writer, &json).await {
            Ok(()) => codec::read_line(&mut worker.reader).await,
            Err(e) => Err(e),
        };

        let line = match line {
            Ok(Some(Line::Data(line))) => line,
            Ok(Some(Line::TooLong { length })) => {
                return Err(Error::Decode(format!("response line of {length} bytes exceeds the size limit")));
            }
            Ok(None) => {
                tracing::warn!(generation = worker.generation, "Worker closed its output");
                state.worker = None;
                return Err(Error::WorkerExited);
            }
            Err(e) => {
                tracing::warn!(generation = worker.generation, error = %e, "Worker channel broken");
                state.worker = None;
                return Err(Error::WorkerExited);
            }
        };

        tracing::trace!(generation = worker.generation, "<<< {}", String::from_utf8_lossy(&line));

        let json: Json = serde_json::from_slice(&line).map_err(|e| Error::Decode(e.to_string()))?;
        serde_json::from_value::<Response>(json.clone())
            .map_err(|_| Error::Protocol(format!("unexpected response: {json}")))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("worker", &self.shared.launcher.describe())
            .field("exceptions", &self.shared.exceptions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::exception::RemoteError;

    fn idle_session() -> Session {
        Session::new(CommandLauncher::new("objproxy-test-never-started"))
    }

    #[test]
    fn test_check_current_rejects_old_generation() {
        let session = idle_session();
        let stale = RemoteRef { generation: 1, id: 5 };

        assert!(session.check_current(stale, 1).is_ok());
        let err = session.check_current(stale, 2).unwrap_err();
        assert_eq!(err.as_remote(), Some(&RemoteError::unknown_reference(5)));
    }

    #[test]
    fn test_decode_nested_tags_into_proxies() {
        let session = idle_session();
        let payload = json!({
            "script": {"__type": "RemoteObject", "__id": 3},
            "items": [1, {"__type": "RemoteObject", "__id": 4}]
        });

        let value = value::decode(payload, &session, 7).unwrap();
        let map = value.as_map().unwrap();

        let script = map["script"].as_proxy().unwrap();
        assert_eq!(script.id(), 3);
        assert_eq!(script.generation(), 7);
        assert!(script.session().ptr_eq(&session));

        let items = map["items"].as_list().unwrap();
        assert_eq!(items[0].as_i64(), Some(1));
        assert_eq!(items[1].as_proxy().unwrap().id(), 4);
    }

    #[test]
    fn test_decode_malformed_tag_is_protocol_error() {
        let session = idle_session();
        let err = value::decode(json!({"__type": "RemoteObject"}), &session, 1).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn test_dropped_handle_queues_free() {
        let session = idle_session();
        let value = value::decode(json!({"__type": "RemoteObject", "__id": 9}), &session, 1).unwrap();
        let copy = value.clone();

        drop(value);
        assert!(session.shared.deferred.lock().unwrap().is_empty());

        drop(copy);
        let deferred = session.shared.deferred.lock().unwrap();
        assert_eq!(deferred.as_slice(), [RemoteRef { generation: 1, id: 9 }]);
    }

    #[test]
    fn test_encode_stale_proxy_argument_fails() {
        let session = idle_session();
        let proxy = value::decode(json!({"__type": "RemoteObject", "__id": 2}), &session, 1).unwrap();

        assert_eq!(
            value::encode(&proxy, &session, 1).unwrap(),
            json!({"__type": "RemoteObject", "__id": 2})
        );
        let err = value::encode(&proxy, &session, 2).unwrap_err();
        assert_eq!(err.kind(), "UnknownReferenceError");
    }

    #[tokio::test]
    async fn test_start_failure_exhausts_attempts() {
        let session = Session::with_options(
            CommandLauncher::new("/nonexistent/objproxy-worker"),
            SessionConfig {
                start_attempts: 2,
                restart_backoff_ms: 1,
            },
            ExceptionTable::new(),
        );

        let err = session.ensure_worker().await.unwrap_err();
        assert!(matches!(err, Error::WorkerStartFailed { attempts: 2, .. }));
        assert_eq!(session.generation().await, 0);
    }
}
