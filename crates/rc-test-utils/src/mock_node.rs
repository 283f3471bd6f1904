//! Scripted in-memory media node.
//!
//! `MockMediaNode` answers control requests from a handler table, records
//! every frame the controller sends, and can push notifications or drop the
//! transport on demand.
//!
//! # Example
//!
//! ```rust,ignore
//! use rc_test_utils::{MockMediaNode, MockReply};
//!
//! let node = MockMediaNode::new("mn-1").with_default_handlers();
//! node.on_request("createPipeTransport", |_| MockReply::Err("no ports".into()));
//!
//! let connection = node.connection(Duration::from_millis(500));
//! // drive the controller, then inspect node.requests_for(...)
//! ```

use async_trait::async_trait;
use common::types::MediaNodeId;
use parking_lot::Mutex;
use room_controller::errors::RcError;
use room_controller::media::messages::methods;
use room_controller::media::{
    MediaNodeConnection, NodeChannel, NodeConnector, NodeEndpoint, NodeMessage, RemoteChannel,
    DEFAULT_CHANNEL_BUFFER,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How the mock answers one request.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Ok(Value),
    Err(String),
    /// Never answer; the controller's timeout fires.
    NoReply,
}

type Handler = Arc<dyn Fn(&Value) -> MockReply + Send + Sync>;

/// A frame received from the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Request { method: String, data: Value },
    Notification { method: String, data: Value },
    /// Reply to a request the mock sent with [`MockMediaNode::send_request`].
    Response {
        id: u64,
        data: Value,
        error: Option<String>,
    },
}

/// In-memory media node for controller tests.
pub struct MockMediaNode {
    id: MediaNodeId,
    handlers: Arc<Mutex<HashMap<String, Handler>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    to_controller: Mutex<Option<mpsc::Sender<NodeMessage>>>,
    responder: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MockMediaNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockMediaNode")
            .field("id", &self.id)
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

impl MockMediaNode {
    /// A node with no handlers: every request is answered with an error.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: MediaNodeId::new(id),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            to_controller: Mutex::new(None),
            responder: Mutex::new(None),
        }
    }

    /// Install handlers that behave like a healthy media node.
    #[must_use]
    pub fn with_default_handlers(self) -> Self {
        let node_id = self.id.to_string();
        let next_port = Arc::new(AtomicU16::new(40000));
        let producer_kinds: Arc<Mutex<HashMap<String, Value>>> =
            Arc::new(Mutex::new(HashMap::new()));

        self.on_request(methods::GET_ROUTER, move |data| {
            let room_id = data["roomId"].as_str().unwrap_or("room");
            MockReply::Ok(json!({
                "id": format!("router-{node_id}-{room_id}"),
                "rtpCapabilities": { "codecs": [] },
            }))
        });

        self.on_request(methods::CREATE_PIPE_TRANSPORT, move |_| {
            let port = next_port.fetch_add(1, Ordering::SeqCst);
            MockReply::Ok(json!({
                "id": format!("pipe-transport-{}", Uuid::new_v4()),
                "ip": "127.0.0.1",
                "port": port,
            }))
        });

        self.on_request(methods::CONNECT_PIPE_TRANSPORT, |_| MockReply::Ok(json!({})));

        let kinds = Arc::clone(&producer_kinds);
        self.on_request(methods::CREATE_PIPE_PRODUCER, move |data| {
            let producer_id = data["producerId"].as_str().unwrap_or_default().to_string();
            kinds.lock().insert(producer_id.clone(), data["kind"].clone());
            MockReply::Ok(json!({ "id": producer_id }))
        });

        self.on_request(methods::CREATE_PIPE_CONSUMER, move |data| {
            let producer_id = data["producerId"].as_str().unwrap_or_default();
            let kind = producer_kinds
                .lock()
                .get(producer_id)
                .cloned()
                .unwrap_or_else(|| json!("video"));
            MockReply::Ok(json!({
                "id": format!("pipe-consumer-{}", Uuid::new_v4()),
                "kind": kind,
                "producerPaused": false,
                "rtpParameters": crate::fixtures::test_rtp_parameters(),
            }))
        });

        self.on_request(methods::PAUSE_PIPE_PRODUCER, |_| MockReply::Ok(json!({})));
        self.on_request(methods::RESUME_PIPE_PRODUCER, |_| MockReply::Ok(json!({})));
        self
    }

    #[must_use]
    pub fn id(&self) -> &MediaNodeId {
        &self.id
    }

    /// Set (or replace) the handler for `method`.
    pub fn on_request<F>(&self, method: &str, handler: F)
    where
        F: Fn(&Value) -> MockReply + Send + Sync + 'static,
    {
        self.handlers
            .lock()
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Open a fresh transport to this node, replacing any previous one.
    pub fn channel(&self) -> NodeChannel {
        let (channel, remote) = NodeChannel::pair(DEFAULT_CHANNEL_BUFFER);
        let RemoteChannel {
            inbound: mut from_controller,
            outbound: to_controller,
        } = remote;
        let replies = to_controller.clone();
        let handlers = Arc::clone(&self.handlers);
        let calls = Arc::clone(&self.calls);

        let responder = tokio::spawn(async move {
            while let Some(frame) = from_controller.recv().await {
                match frame {
                    NodeMessage::Request { id, method, data } => {
                        calls.lock().push(RecordedCall::Request {
                            method: method.clone(),
                            data: data.clone(),
                        });
                        let handler = handlers.lock().get(&method).cloned();
                        let reply = match handler {
                            Some(handler) => handler(&data),
                            None => MockReply::Err(format!("unknown method {method}")),
                        };
                        let response = match reply {
                            MockReply::Ok(value) => NodeMessage::reply(id, value),
                            MockReply::Err(error) => NodeMessage::reply_error(id, error),
                            MockReply::NoReply => continue,
                        };
                        if replies.send(response).await.is_err() {
                            break;
                        }
                    }
                    NodeMessage::Notification { method, data } => {
                        calls
                            .lock()
                            .push(RecordedCall::Notification { method, data });
                    }
                    NodeMessage::Response { id, data, error } => {
                        calls
                            .lock()
                            .push(RecordedCall::Response { id, data, error });
                    }
                }
            }
        });

        if let Some(previous) = self.responder.lock().replace(responder) {
            previous.abort();
        }
        *self.to_controller.lock() = Some(to_controller);
        channel
    }

    /// A controller connection already attached to this node.
    pub fn connection(&self, request_timeout: Duration) -> Arc<MediaNodeConnection> {
        MediaNodeConnection::with_channel(self.id.clone(), self.channel(), request_timeout)
    }

    /// Push a notification to the controller.
    pub async fn send_notification(&self, method: &str, data: Value) {
        let sender = self
            .to_controller
            .lock()
            .clone()
            .expect("mock node has no open channel");
        sender
            .send(NodeMessage::Notification {
                method: method.to_string(),
                data,
            })
            .await
            .expect("controller side of the channel is gone");
    }

    /// Send a request to the controller, as a node would.
    pub async fn send_request(&self, id: u64, method: &str, data: Value) {
        let sender = self
            .to_controller
            .lock()
            .clone()
            .expect("mock node has no open channel");
        sender
            .send(NodeMessage::Request {
                id,
                method: method.to_string(),
                data,
            })
            .await
            .expect("controller side of the channel is gone");
    }

    /// Drop the transport; the controller sees the connection end.
    pub fn disconnect(&self) {
        self.to_controller.lock().take();
        if let Some(responder) = self.responder.lock().take() {
            responder.abort();
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Payloads of every request for `method`, in arrival order.
    #[must_use]
    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Request { method: m, data } if m == method => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Payloads of every notification for `method`, in arrival order.
    #[must_use]
    pub fn notifications_for(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Notification { method: m, data } if m == method => {
                    Some(data.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// The controller's reply to request `id`, if it has arrived.
    #[must_use]
    pub fn response_for(&self, id: u64) -> Option<(Value, Option<String>)> {
        self.calls.lock().iter().find_map(|call| match call {
            RecordedCall::Response {
                id: reply_id,
                data,
                error,
            } if *reply_id == id => Some((data.clone(), error.clone())),
            _ => None,
        })
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl Drop for MockMediaNode {
    fn drop(&mut self) {
        if let Some(responder) = self.responder.get_mut().take() {
            responder.abort();
        }
    }
}

/// Connects controller nodes to registered mock nodes by id.
///
/// Unknown ids are refused.
#[derive(Debug, Default)]
pub struct MockConnector {
    nodes: Mutex<HashMap<MediaNodeId, Arc<MockMediaNode>>>,
    connects: AtomicUsize,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_node(self, node: Arc<MockMediaNode>) -> Self {
        self.add_node(node);
        self
    }

    pub fn add_node(&self, node: Arc<MockMediaNode>) {
        self.nodes.lock().insert(node.id().clone(), node);
    }

    /// Number of connection attempts so far.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<NodeChannel, RcError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let node = self.nodes.lock().get(&endpoint.id).cloned();
        match node {
            Some(node) => Ok(node.channel()),
            None => Err(RcError::Transport(format!(
                "no mock media node {}",
                endpoint.id
            ))),
        }
    }
}
