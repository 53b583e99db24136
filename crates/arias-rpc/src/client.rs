//! Request/response correlation over a duplex frame transport.
//!
//! # Design
//! - One background reader owns the read half for the life of the connection
//!   and routes every frame, in wire order, either to the pending call with the
//!   matching id or to the handler registered for the notification method.
//! - One background writer owns the write half; callers enqueue encoded frames
//!   and never touch the transport directly.
//! - Closing is terminal: every outstanding call fails with
//!   [`RpcError::ConnectionClosed`] and later calls fail immediately.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::{CancellationToken, DropGuard, WaitForCancellationFutureOwned};
use tracing::{debug, trace, warn};

use crate::error::{RpcError, RpcResult};
use crate::message::{self, Incoming, RemoteFault, Request};
use crate::transport::{FrameSink, FrameSource};

const OUTGOING_BUFFER: usize = 64;

/// Callback invoked with the `params` of a matching notification.
///
/// Handlers run on the connection's read loop and must not block.
pub type NotificationHandler = Arc<dyn Fn(Value) + Send + Sync>;

type Reply = oneshot::Sender<Result<Value, RemoteFault>>;

#[derive(Default)]
struct PendingCalls {
    closed: bool,
    calls: HashMap<u64, Reply>,
}

struct Inner {
    outgoing: mpsc::Sender<String>,
    pending: Mutex<PendingCalls>,
    handlers: RwLock<HashMap<String, NotificationHandler>>,
    next_id: AtomicU64,
    closed: CancellationToken,
}

/// Cloneable handle to one duplex RPC connection.
///
/// The connection shuts down when [`RpcClient::close`] is called, when the
/// transport fails, or when the last handle is dropped.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
    _lifetime: Arc<DropGuard>,
}

/// Collects notification handlers before the connection starts reading.
#[derive(Default)]
pub struct RpcClientBuilder {
    handlers: HashMap<String, NotificationHandler>,
}

impl RpcClientBuilder {
    /// Register `handler` for notifications named `method`, replacing any
    /// earlier registration.
    #[must_use]
    pub fn handle<F>(mut self, method: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.handlers.insert(method.into(), Arc::new(handler));
        self
    }

    /// Start the background read and write loops over the given transport.
    ///
    /// Must be called within a Tokio runtime.
    pub fn spawn<S, R>(self, sink: S, source: R) -> RpcClient
    where
        S: FrameSink + 'static,
        R: FrameSource + 'static,
    {
        let (outgoing, frames) = mpsc::channel(OUTGOING_BUFFER);
        let closed = CancellationToken::new();
        let inner = Arc::new(Inner {
            outgoing,
            pending: Mutex::new(PendingCalls::default()),
            handlers: RwLock::new(self.handlers),
            next_id: AtomicU64::new(1),
            closed: closed.clone(),
        });

        tokio::spawn(write_loop(sink, frames, closed.clone()));
        tokio::spawn(read_loop(Arc::clone(&inner), source));

        RpcClient {
            inner,
            _lifetime: Arc::new(closed.drop_guard()),
        }
    }
}

impl RpcClient {
    /// Start building a client.
    #[must_use]
    pub fn builder() -> RpcClientBuilder {
        RpcClientBuilder::default()
    }

    /// Register `handler` for notifications named `method` on a running
    /// connection. Frames already dispatched are not replayed.
    pub fn handle<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.into(), Arc::new(handler));
    }

    /// Invoke `method` and decode its result.
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::ConnectionClosed`] if the connection is or becomes
    /// closed before the response arrives, [`RpcError::Remote`] if the remote
    /// side answers with an error object, and [`RpcError::Encode`] or
    /// [`RpcError::Decode`] on payload mismatches.
    pub async fn call<P, R>(&self, method: &str, params: P) -> RpcResult<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let value = self.call_value(method, params).await?;
        serde_json::from_value(value).map_err(|source| RpcError::Decode {
            method: method.to_string(),
            source,
        })
    }

    /// Invoke `method` and return its raw JSON result.
    ///
    /// # Errors
    ///
    /// Same as [`RpcClient::call`] minus result decoding.
    pub async fn call_value<P>(&self, method: &str, params: P) -> RpcResult<Value>
    where
        P: Serialize + Send,
    {
        let params = serde_json::to_value(params).map_err(|source| RpcError::Encode {
            method: method.to_string(),
            source,
        })?;
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&Request::new(id, method, params)).map_err(|source| {
            RpcError::Encode {
                method: method.to_string(),
                source,
            }
        })?;

        let (reply, response) = oneshot::channel();
        {
            let mut pending = self.inner.lock_pending();
            if pending.closed {
                return Err(RpcError::ConnectionClosed);
            }
            pending.calls.insert(id, reply);
        }
        let _entry = PendingEntry {
            inner: &self.inner,
            id,
        };

        trace!(id, method, "sending rpc request");
        self.inner
            .outgoing
            .send(frame)
            .await
            .map_err(|_| RpcError::ConnectionClosed)?;

        match response.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(fault)) => Err(RpcError::Remote {
                method: method.to_string(),
                code: fault.code,
                message: fault.message,
            }),
            Err(_) => Err(RpcError::ConnectionClosed),
        }
    }

    /// Close the connection. Outstanding calls fail with
    /// [`RpcError::ConnectionClosed`].
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    /// Whether the connection has shut down.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once the connection has shut down for any reason.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Owned variant of [`RpcClient::closed`] that does not keep the
    /// connection alive while pending.
    #[must_use]
    pub fn closed_owned(&self) -> WaitForCancellationFutureOwned {
        self.inner.closed.clone().cancelled_owned()
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.inner.lock_pending().calls.len()
    }
}

/// Removes a call's pending slot when the caller stops waiting.
struct PendingEntry<'a> {
    inner: &'a Inner,
    id: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.inner.lock_pending().calls.remove(&self.id);
    }
}

impl Inner {
    fn lock_pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, frame: &str) {
        let messages = match message::decode(frame) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(error = %err, "discarding malformed rpc frame");
                return;
            }
        };
        for message in messages {
            match message {
                Incoming::Response { id, outcome } => self.resolve(id, outcome),
                Incoming::Notification { method, params } => self.notify(&method, params),
                Incoming::Unroutable => debug!("discarding unroutable rpc message"),
            }
        }
    }

    fn resolve(&self, id: u64, outcome: Result<Value, RemoteFault>) {
        let reply = self.lock_pending().calls.remove(&id);
        match reply {
            Some(reply) => {
                if reply.send(outcome).is_err() {
                    trace!(id, "rpc caller stopped waiting before response");
                }
            }
            None => debug!(id, "discarding response for unknown call"),
        }
    }

    fn notify(&self, method: &str, params: Value) {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned();
        match handler {
            Some(handler) => handler(params),
            None => trace!(method, "no handler for notification"),
        }
    }

    fn shutdown(&self) {
        let abandoned = {
            let mut pending = self.lock_pending();
            pending.closed = true;
            std::mem::take(&mut pending.calls)
        };
        if !abandoned.is_empty() {
            debug!(count = abandoned.len(), "failing outstanding rpc calls");
        }
        drop(abandoned);
        self.closed.cancel();
    }
}

async fn read_loop<R: FrameSource>(inner: Arc<Inner>, mut source: R) {
    loop {
        let frame = tokio::select! {
            () = inner.closed.cancelled() => break,
            frame = source.next_frame() => frame,
        };
        match frame {
            Some(Ok(text)) => inner.dispatch(&text),
            Some(Err(err)) => {
                warn!(error = %err, "rpc transport read failed");
                break;
            }
            None => {
                debug!("rpc transport reached end of stream");
                break;
            }
        }
    }
    inner.shutdown();
}

async fn write_loop<S: FrameSink>(
    mut sink: S,
    mut frames: mpsc::Receiver<String>,
    closed: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            () = closed.cancelled() => break,
            frame = frames.recv() => frame,
        };
        let Some(frame) = frame else { break };
        if let Err(err) = sink.send_frame(frame).await {
            warn!(error = %err, "rpc transport write failed");
            closed.cancel();
            break;
        }
    }
    if let Err(err) = sink.close().await {
        debug!(error = %err, "rpc transport close failed");
    }
}
