//! A registered media node.
//!
//! The node owns at most one live [`MediaNodeConnection`]. It is created on
//! first use: `connection()` returns a `Connecting` connection immediately and
//! dials in the background, so callers simply queue on it. A closed connection
//! is replaced on the next call.
//!
//! Every connection the node creates carries a middleware that records the
//! node's `load` reports, used by the load balancer.

use crate::errors::RcError;
use crate::media::channel::{NodeConnector, NodeEndpoint};
use crate::media::connection::{InboundContext, InboundKind, MediaNodeConnection};
use crate::media::messages::{methods, GetRouterRequest, LoadReport, RouterInfo};
use crate::media::router::{Router, RouterOptions};
use crate::middleware::{Middleware, Next};

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::{GeoPosition, MediaNodeId, RoomId};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::instrument;

/// Load at or above which a node takes no new rooms.
pub const OVERLOAD_THRESHOLD: f64 = 0.95;

/// Static description of a media node.
#[derive(Debug, Clone)]
pub struct MediaNodeOptions {
    pub id: MediaNodeId,
    pub hostname: String,
    pub port: u16,
    pub secret: SecretString,
    pub tls: bool,
    pub location: Option<GeoPosition>,
    pub request_timeout: Duration,
}

pub struct MediaNode {
    endpoint: NodeEndpoint,
    location: Option<GeoPosition>,
    request_timeout: Duration,
    load: RwLock<f64>,
    connector: Arc<dyn NodeConnector>,
    connection: Mutex<Option<Arc<MediaNodeConnection>>>,
    closed: AtomicBool,
}

impl std::fmt::Debug for MediaNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaNode")
            .field("id", &self.endpoint.id)
            .field("hostname", &self.endpoint.hostname)
            .field("port", &self.endpoint.port)
            .field("location", &self.location)
            .field("load", &self.load())
            .finish_non_exhaustive()
    }
}

impl MediaNode {
    #[must_use]
    pub fn new(options: MediaNodeOptions, connector: Arc<dyn NodeConnector>) -> Arc<Self> {
        Arc::new(Self {
            endpoint: NodeEndpoint {
                id: options.id,
                hostname: options.hostname,
                port: options.port,
                secret: options.secret,
                tls: options.tls,
            },
            location: options.location,
            request_timeout: options.request_timeout,
            load: RwLock::new(0.0),
            connector,
            connection: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &MediaNodeId {
        &self.endpoint.id
    }

    pub fn hostname(&self) -> &str {
        &self.endpoint.hostname
    }

    pub fn port(&self) -> u16 {
        self.endpoint.port
    }

    pub fn location(&self) -> Option<GeoPosition> {
        self.location
    }

    /// Last reported load in `0.0..=1.0`.
    pub fn load(&self) -> f64 {
        *self.load.read()
    }

    pub fn set_load(&self, load: f64) {
        *self.load.write() = if load.is_finite() {
            load.clamp(0.0, 1.0)
        } else {
            1.0
        };
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Open and not overloaded.
    pub fn is_viable(&self) -> bool {
        !self.closed() && self.load() < OVERLOAD_THRESHOLD
    }

    /// The node's live connection, creating one if needed.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed` once the node itself is closed.
    pub fn connection(self: &Arc<Self>) -> Result<Arc<MediaNodeConnection>, RcError> {
        if self.closed() {
            return Err(RcError::ConnectionClosed);
        }

        let connection = {
            let mut slot = self.connection.lock();
            if let Some(existing) = slot.as_ref() {
                if !existing.is_closed() {
                    return Ok(Arc::clone(existing));
                }
            }
            let connection = MediaNodeConnection::new(self.id().clone(), self.request_timeout);
            connection.pipeline().use_middleware(Arc::new(LoadMiddleware {
                node: Arc::downgrade(self),
            }));
            *slot = Some(Arc::clone(&connection));
            connection
        };

        let connector = Arc::clone(&self.connector);
        let endpoint = self.endpoint.clone();
        let connecting = Arc::clone(&connection);
        let timeout = self.request_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, connector.connect(&endpoint)).await {
                Ok(Ok(channel)) => connecting.attach(channel),
                Ok(Err(e)) => {
                    tracing::warn!(target: "rc.media.node", node_id = %endpoint.id, error = %e, "Failed to connect to media node");
                    connecting.close();
                }
                Err(_) => {
                    tracing::warn!(target: "rc.media.node", node_id = %endpoint.id, "Timed out connecting to media node");
                    connecting.close();
                }
            }
        });

        tracing::debug!(target: "rc.media.node", node_id = %self.id(), "Connecting to media node");
        Ok(connection)
    }

    /// Get (or have the node create) the router for `room_id`.
    ///
    /// # Errors
    ///
    /// `ConnectionClosed`, `Timeout` or `RequestFailed` from the connection.
    #[instrument(skip_all, name = "rc.media.node.get_router", fields(node_id = %self.id(), room_id = %room_id))]
    pub async fn get_router(self: &Arc<Self>, room_id: &RoomId) -> Result<Arc<Router>, RcError> {
        let connection = self.connection()?;
        let info: RouterInfo = connection
            .request(
                methods::GET_ROUTER,
                GetRouterRequest {
                    room_id: room_id.to_string(),
                },
            )
            .await?;

        tracing::debug!(target: "rc.media.node", node_id = %self.id(), router_id = %info.id, "Router ready");
        Ok(Router::new(RouterOptions {
            id: info.id,
            media_node: Arc::clone(self),
            connection,
            rtp_capabilities: info.rtp_capabilities,
        }))
    }

    /// Close the node's connection and refuse new ones. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let connection = self.connection.lock().take();
        if let Some(connection) = connection {
            connection.close();
        }
        tracing::info!(target: "rc.media.node", node_id = %self.id(), "Media node closed");
    }
}

/// Records `load` notifications on the owning node.
struct LoadMiddleware {
    node: Weak<MediaNode>,
}

#[async_trait]
impl Middleware<InboundContext> for LoadMiddleware {
    async fn handle(
        &self,
        context: &mut InboundContext,
        next: Next<'_, InboundContext>,
    ) -> Result<(), RcError> {
        if context.kind != InboundKind::Notification || context.method != methods::LOAD {
            return next.run(context).await;
        }
        let Some(node) = self.node.upgrade() else {
            return next.run(context).await;
        };

        let report: LoadReport = context.parse()?;
        node.set_load(report.load);
        tracing::trace!(target: "rc.media.node", node_id = %node.id(), load = report.load, "Load report");
        context.handled = true;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::channel::NodeChannel;

    struct RefusingConnector;

    #[async_trait]
    impl NodeConnector for RefusingConnector {
        async fn connect(
            &self,
            _endpoint: &NodeEndpoint,
        ) -> Result<NodeChannel, RcError> {
            Err(RcError::Transport("connection refused".to_string()))
        }
    }

    fn options() -> MediaNodeOptions {
        MediaNodeOptions {
            id: MediaNodeId::new("mn-1"),
            hostname: "mn1.example.com".to_string(),
            port: 3000,
            secret: SecretString::from("hunter2"),
            tls: true,
            location: Some(GeoPosition::new(59.91, 10.75)),
            request_timeout: Duration::from_millis(500),
        }
    }

    #[test]
    fn test_load_is_clamped() {
        let node = MediaNode::new(options(), Arc::new(RefusingConnector));
        node.set_load(1.7);
        assert!((node.load() - 1.0).abs() < f64::EPSILON);
        node.set_load(-0.3);
        assert!(node.load().abs() < f64::EPSILON);
        node.set_load(f64::NAN);
        assert!(!node.is_viable());
    }

    #[test]
    fn test_debug_omits_secret() {
        let node = MediaNode::new(options(), Arc::new(RefusingConnector));
        let debug = format!("{node:?}");
        assert!(debug.contains("mn1.example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_failed_dial_closes_connection_and_is_replaced() {
        let node = MediaNode::new(options(), Arc::new(RefusingConnector));
        let first = node.connection().unwrap();
        assert!(matches!(first.ready().await, Err(RcError::ConnectionClosed)));

        let second = node.connection().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_closed_node_refuses_connections() {
        let node = MediaNode::new(options(), Arc::new(RefusingConnector));
        node.close();
        assert!(matches!(node.connection(), Err(RcError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_load_notification_updates_node() {
        let node = MediaNode::new(options(), Arc::new(RefusingConnector));
        let connection = MediaNodeConnection::new(node.id().clone(), Duration::from_millis(500));
        connection.pipeline().use_middleware(Arc::new(LoadMiddleware {
            node: Arc::downgrade(&node),
        }));
        let (channel, remote) = NodeChannel::pair(4);
        connection.attach(channel);

        let mut context =
            InboundContext::notification(methods::LOAD, serde_json::json!({"load": 0.42}));
        connection.pipeline().execute(&mut context).await.unwrap();

        assert!(context.handled);
        assert!((node.load() - 0.42).abs() < 1e-9);
        drop(remote);
    }
}
