//! RPC connection to a single media node.
//!
//! # States
//!
//! ```text
//! Connecting --attach--> Ready --close / transport lost--> Closed
//!      \______________________close_____________________/
//! ```
//!
//! # Semantics
//!
//! - `request` correlates replies by id; concurrent requests are independent
//!   and may complete out of order. Every request resolves with the reply,
//!   fails with `RequestFailed`, `Timeout` or `ConnectionClosed`.
//! - `request` and `notify` issued while `Connecting` wait for `Ready`,
//!   bounded by the request timeout.
//! - Inbound notifications and requests from the node run through
//!   [`MediaNodeConnection::pipeline`] one at a time, in arrival order.
//!   Handlers must not await a `request` on the same connection: its reply is
//!   queued behind them.
//! - `close` fails every pending request with `ConnectionClosed` before it
//!   returns, and is idempotent.

use crate::errors::RcError;
use crate::media::channel::NodeChannel;
use crate::media::messages::NodeMessage;
use crate::middleware::{Pipeline, PipelineContext};
use crate::observability::metrics;

use common::types::MediaNodeId;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Default bound on a request round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Lifecycle state of a [`MediaNodeConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Closed,
}

/// Local lifecycle events observable through `on` / `once`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Ready,
    Close,
}

/// Whether an inbound event expects a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    Request,
    Notification,
}

/// An unsolicited event from the node, flowing through the connection pipeline.
#[derive(Debug, Clone)]
pub struct InboundContext {
    pub kind: InboundKind,
    pub method: String,
    pub data: Value,
    /// Reply payload for an inbound request.
    pub response: Option<Value>,
    pub handled: bool,
}

impl InboundContext {
    #[must_use]
    pub fn notification(method: impl Into<String>, data: Value) -> Self {
        Self {
            kind: InboundKind::Notification,
            method: method.into(),
            data,
            response: None,
            handled: false,
        }
    }

    #[must_use]
    pub fn request(method: impl Into<String>, data: Value) -> Self {
        Self {
            kind: InboundKind::Request,
            ..Self::notification(method, data)
        }
    }

    /// String field of the payload, if present.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Decode the payload into a typed message.
    ///
    /// # Errors
    ///
    /// Returns `RcError::Serialization` if the payload does not match `T`.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, RcError> {
        Ok(T::deserialize(&self.data)?)
    }
}

impl PipelineContext for InboundContext {
    fn is_handled(&self) -> bool {
        self.handled
    }
}

type Listener = Arc<dyn Fn() + Send + Sync>;

struct ListenerEntry {
    event: ConnectionEvent,
    once: bool,
    callback: Listener,
}

struct PendingRequest {
    method: String,
    sender: oneshot::Sender<Result<Value, RcError>>,
}

/// Connection to one media node.
pub struct MediaNodeConnection {
    node_id: MediaNodeId,
    request_timeout: Duration,
    state: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::Sender<NodeMessage>>>,
    pending: Mutex<HashMap<u64, PendingRequest>>,
    next_request_id: AtomicU64,
    pipeline: Pipeline<InboundContext>,
    listeners: Mutex<Vec<ListenerEntry>>,
    cancel_token: CancellationToken,
}

impl std::fmt::Debug for MediaNodeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaNodeConnection")
            .field("node_id", &self.node_id)
            .field("state", &self.state())
            .field("pending_requests", &self.pending_requests())
            .finish_non_exhaustive()
    }
}

impl MediaNodeConnection {
    /// Create a connection in the `Connecting` state.
    #[must_use]
    pub fn new(node_id: MediaNodeId, request_timeout: Duration) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Arc::new(Self {
            node_id,
            request_timeout,
            state,
            outbound: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            pipeline: Pipeline::new(),
            listeners: Mutex::new(Vec::new()),
            cancel_token: CancellationToken::new(),
        })
    }

    /// Create a connection and attach it to `channel` immediately.
    #[must_use]
    pub fn with_channel(
        node_id: MediaNodeId,
        channel: NodeChannel,
        request_timeout: Duration,
    ) -> Arc<Self> {
        let connection = Self::new(node_id, request_timeout);
        connection.attach(channel);
        connection
    }

    pub fn node_id(&self) -> &MediaNodeId {
        &self.node_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Inbound pipeline for node-initiated events.
    pub fn pipeline(&self) -> &Pipeline<InboundContext> {
        &self.pipeline
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Attach the transport and transition to `Ready`.
    ///
    /// Ignored (the channel is dropped) unless the connection is `Connecting`.
    pub fn attach(self: &Arc<Self>, channel: NodeChannel) {
        let NodeChannel { outbound, inbound } = channel;
        {
            let mut slot = self.outbound.lock();
            if *self.state.borrow() != ConnectionState::Connecting {
                tracing::warn!(
                    target: "rc.media.connection",
                    node_id = %self.node_id,
                    "Transport attached to a connection that is not connecting, dropping it"
                );
                return;
            }
            *slot = Some(outbound);
            self.state.send_replace(ConnectionState::Ready);
        }

        let connection = Arc::clone(self);
        tokio::spawn(async move {
            connection.run_inbound(inbound).await;
        });

        metrics::record_node_connection_opened();
        tracing::info!(target: "rc.media.connection", node_id = %self.node_id, "Media node connection ready");
        self.emit(ConnectionEvent::Ready);
    }

    /// Wait until the connection is `Ready`.
    ///
    /// # Errors
    ///
    /// Returns `RcError::ConnectionClosed` if the connection closes first.
    pub async fn ready(&self) -> Result<(), RcError> {
        let mut state = self.state.subscribe();
        let current = *state
            .wait_for(|s| *s != ConnectionState::Connecting)
            .await
            .map_err(|_| RcError::ConnectionClosed)?;

        match current {
            ConnectionState::Ready => Ok(()),
            ConnectionState::Connecting | ConnectionState::Closed => Err(RcError::ConnectionClosed),
        }
    }

    /// Send a one-way message.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` if closed (or closing before ready), `Timeout` if
    /// the connection does not become ready in time.
    pub async fn notify(&self, method: &str, data: impl Serialize) -> Result<(), RcError> {
        if self.is_closed() {
            return Err(RcError::ConnectionClosed);
        }
        let frame = NodeMessage::Notification {
            method: method.to_string(),
            data: serde_json::to_value(data)?,
        };

        match tokio::time::timeout(self.request_timeout, self.send(frame)).await {
            Ok(result) => result,
            Err(_) => Err(RcError::Timeout {
                method: method.to_string(),
            }),
        }
    }

    /// Send a request and decode the reply as `T`.
    ///
    /// # Errors
    ///
    /// See [`request_raw`](Self::request_raw). A reply that does not decode
    /// as `T` is reported as `RequestFailed`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        data: impl Serialize,
    ) -> Result<T, RcError> {
        let reply = self.request_raw(method, serde_json::to_value(data)?).await?;
        T::deserialize(reply).map_err(|e| RcError::RequestFailed {
            method: method.to_string(),
            reason: format!("malformed reply: {e}"),
        })
    }

    /// Send a request and return the raw reply payload.
    ///
    /// # Errors
    ///
    /// - `RequestFailed` with the node's error text
    /// - `Timeout` if no reply arrives within the request timeout
    /// - `ConnectionClosed` if the connection is or becomes closed
    #[instrument(skip_all, name = "rc.media.request", fields(node_id = %self.node_id, method = %method))]
    pub async fn request_raw(&self, method: &str, data: Value) -> Result<Value, RcError> {
        if self.is_closed() {
            return Err(RcError::ConnectionClosed);
        }

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        self.pending.lock().insert(
            id,
            PendingRequest {
                method: method.to_string(),
                sender,
            },
        );

        let start = Instant::now();
        let frame = NodeMessage::Request {
            id,
            method: method.to_string(),
            data,
        };
        let outcome =
            tokio::time::timeout(self.request_timeout, self.exchange(frame, receiver)).await;

        let result = outcome.unwrap_or_else(|_| {
            tracing::warn!(
                target: "rc.media.connection",
                node_id = %self.node_id,
                method = %method,
                request_id = id,
                "Request timed out"
            );
            Err(RcError::Timeout {
                method: method.to_string(),
            })
        });

        if result.is_err() {
            self.pending.lock().remove(&id);
        }
        metrics::record_rpc_request(method, metrics::rpc_status(&result), start.elapsed());
        result
    }

    /// Close the connection. Idempotent.
    pub fn close(&self) {
        let outbound = {
            let mut slot = self.outbound.lock();
            let previous = self.state.send_replace(ConnectionState::Closed);
            if previous == ConnectionState::Closed {
                return;
            }
            if previous == ConnectionState::Ready {
                metrics::record_node_connection_closed();
            }
            slot.take()
        };
        drop(outbound);
        self.cancel_token.cancel();

        let pending: Vec<PendingRequest> = self.pending.lock().drain().map(|(_, p)| p).collect();
        if !pending.is_empty() {
            tracing::debug!(
                target: "rc.media.connection",
                node_id = %self.node_id,
                count = pending.len(),
                "Failing pending requests on close"
            );
        }
        for request in pending {
            let _ = request.sender.send(Err(RcError::ConnectionClosed));
        }

        tracing::info!(target: "rc.media.connection", node_id = %self.node_id, "Media node connection closed");
        self.emit(ConnectionEvent::Close);
    }

    /// Register a listener for every occurrence of `event`.
    pub fn on<F>(&self, event: ConnectionEvent, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_listener(event, false, Arc::new(callback));
    }

    /// Register a listener fired at most once.
    pub fn once<F>(&self, event: ConnectionEvent, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.add_listener(event, true, Arc::new(callback));
    }

    fn add_listener(&self, event: ConnectionEvent, once: bool, callback: Listener) {
        self.listeners.lock().push(ListenerEntry {
            event,
            once,
            callback,
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        // Callbacks run outside the lock so they may register listeners.
        let callbacks: Vec<Listener> = {
            let mut listeners = self.listeners.lock();
            let callbacks = listeners
                .iter()
                .filter(|l| l.event == event)
                .map(|l| Arc::clone(&l.callback))
                .collect();
            listeners.retain(|l| !(l.event == event && l.once));
            callbacks
        };
        for callback in callbacks {
            callback();
        }
    }

    async fn exchange(
        &self,
        frame: NodeMessage,
        receiver: oneshot::Receiver<Result<Value, RcError>>,
    ) -> Result<Value, RcError> {
        self.send(frame).await?;
        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(RcError::ConnectionClosed),
        }
    }

    async fn send(&self, frame: NodeMessage) -> Result<(), RcError> {
        self.ready().await?;
        let sender = self
            .outbound
            .lock()
            .clone()
            .ok_or(RcError::ConnectionClosed)?;
        sender
            .send(frame)
            .await
            .map_err(|_| RcError::ConnectionClosed)
    }

    async fn run_inbound(self: Arc<Self>, mut inbound: mpsc::Receiver<NodeMessage>) {
        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                frame = inbound.recv() => match frame {
                    Some(frame) => self.dispatch(frame).await,
                    None => {
                        tracing::warn!(target: "rc.media.connection", node_id = %self.node_id, "Transport to media node lost");
                        self.close();
                        break;
                    }
                },
            }
        }
        tracing::debug!(target: "rc.media.connection", node_id = %self.node_id, "Inbound task exiting");
    }

    async fn dispatch(&self, frame: NodeMessage) {
        match frame {
            NodeMessage::Response { id, data, error } => self.resolve(id, data, error),
            NodeMessage::Notification { method, data } => {
                let mut context = InboundContext::notification(method, data);
                if let Err(e) = self.pipeline.execute(&mut context).await {
                    tracing::warn!(
                        target: "rc.media.connection",
                        node_id = %self.node_id,
                        method = %context.method,
                        error = %e,
                        "Notification handler failed"
                    );
                } else if !context.handled {
                    tracing::debug!(
                        target: "rc.media.connection",
                        node_id = %self.node_id,
                        method = %context.method,
                        "Unhandled notification"
                    );
                }
            }
            NodeMessage::Request { id, method, data } => {
                let mut context = InboundContext::request(method, data);
                let reply = match self.pipeline.execute(&mut context).await {
                    Ok(()) if context.handled => {
                        NodeMessage::reply(id, context.response.take().unwrap_or(Value::Null))
                    }
                    Ok(()) => NodeMessage::reply_error(id, format!("unknown method {}", context.method)),
                    Err(e) => NodeMessage::reply_error(id, e.to_string()),
                };
                if let Err(e) = self.send(reply).await {
                    tracing::debug!(
                        target: "rc.media.connection",
                        node_id = %self.node_id,
                        error = %e,
                        "Could not reply to inbound request"
                    );
                }
            }
        }
    }

    fn resolve(&self, id: u64, data: Value, error: Option<String>) {
        let Some(request) = self.pending.lock().remove(&id) else {
            tracing::debug!(
                target: "rc.media.connection",
                node_id = %self.node_id,
                request_id = id,
                "Reply for unknown or expired request"
            );
            return;
        };

        let result = match error {
            None => Ok(data),
            Some(reason) => Err(RcError::RequestFailed {
                method: request.method,
                reason,
            }),
        };
        let _ = request.sender.send(result);
    }
}
