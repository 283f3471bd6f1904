//! A room's routing context on one media node.
//!
//! Routers own the pipe transports created on them. `pipe_to_router` cascades
//! a producer to another router by building (or reusing) a connected pair of
//! pipe transports between the two.

use crate::errors::RcError;
use crate::media::connection::{
    ConnectionEvent, InboundContext, InboundKind, MediaNodeConnection,
};
use crate::media::messages::{methods, CreatePipeTransportRequest, PipeTransportInfo, RouterTarget};
use crate::media::node::MediaNode;
use crate::media::pipe_consumer::PipeConsumer;
use crate::media::pipe_producer::PipeProducer;
use crate::media::pipe_transport::{PipeProduceParams, PipeTransport};
use crate::middleware::{Middleware, Next};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::instrument;

/// Everything needed to wrap a router the node created.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub id: String,
    pub media_node: Arc<MediaNode>,
    pub connection: Arc<MediaNodeConnection>,
    pub rtp_capabilities: Value,
}

/// Both ends of a producer piped into another router.
#[derive(Debug, Clone)]
pub struct PipeToRouterResult {
    /// Consumer on the source router.
    pub pipe_consumer: Arc<PipeConsumer>,
    /// Producer on the destination router.
    pub pipe_producer: Arc<PipeProducer>,
}

#[derive(Debug, Clone)]
struct PipePair {
    local: Arc<PipeTransport>,
    remote: Arc<PipeTransport>,
}

impl PipePair {
    fn usable(&self) -> bool {
        !self.local.closed() && !self.remote.closed()
    }
}

pub struct Router {
    id: String,
    media_node: Arc<MediaNode>,
    connection: Arc<MediaNodeConnection>,
    rtp_capabilities: Value,
    closed: AtomicBool,
    pipe_transports: Mutex<HashMap<String, Arc<PipeTransport>>>,
    /// Cached pipe pairs keyed by destination router id.
    pipe_pairs: Mutex<HashMap<String, PipePair>>,
    pipe_lock: tokio::sync::Mutex<()>,
    middleware: Arc<dyn Middleware<InboundContext>>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.id)
            .field("media_node", self.media_node.id())
            .field("closed", &self.closed())
            .finish_non_exhaustive()
    }
}

impl Router {
    /// Wrap a node-side router and start listening for its notifications.
    ///
    /// The router closes locally when its connection closes; a router on a
    /// lost connection is never reused.
    #[must_use]
    pub fn new(options: RouterOptions) -> Arc<Self> {
        let RouterOptions {
            id,
            media_node,
            connection,
            rtp_capabilities,
        } = options;

        let router = Arc::new_cyclic(|weak: &Weak<Router>| {
            let middleware: Arc<dyn Middleware<InboundContext>> = Arc::new(RouterMiddleware {
                router: weak.clone(),
                router_id: id.clone(),
            });
            Router {
                id,
                media_node,
                connection,
                rtp_capabilities,
                closed: AtomicBool::new(false),
                pipe_transports: Mutex::new(HashMap::new()),
                pipe_pairs: Mutex::new(HashMap::new()),
                pipe_lock: tokio::sync::Mutex::new(()),
                middleware,
            }
        });
        router
            .connection
            .pipeline()
            .use_middleware(Arc::clone(&router.middleware));

        let weak = Arc::downgrade(&router);
        router.connection.once(ConnectionEvent::Close, move || {
            if let Some(router) = weak.upgrade() {
                tracing::debug!(target: "rc.media.router", router_id = %router.id, "Connection lost, closing router");
                router.close_local();
            }
        });
        // Closed before the listener was registered.
        if router.connection.is_closed() {
            router.close_local();
        }
        router
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn media_node(&self) -> &Arc<MediaNode> {
        &self.media_node
    }

    pub fn connection(&self) -> &Arc<MediaNodeConnection> {
        &self.connection
    }

    pub fn rtp_capabilities(&self) -> &Value {
        &self.rtp_capabilities
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Open and on a live connection.
    pub fn usable(&self) -> bool {
        !self.closed() && !self.connection.is_closed()
    }

    pub fn pipe_transport(&self, id: &str) -> Option<Arc<PipeTransport>> {
        self.pipe_transports.lock().get(id).cloned()
    }

    pub fn pipe_transports(&self) -> Vec<Arc<PipeTransport>> {
        self.pipe_transports.lock().values().cloned().collect()
    }

    fn ensure_open(&self) -> Result<(), RcError> {
        if self.closed() {
            Err(RcError::RouterClosed(self.id.clone()))
        } else {
            Ok(())
        }
    }

    /// Ask the node for a new pipe transport on this router.
    ///
    /// `internal` selects the node's internal address, for pipes between
    /// routers on the same node.
    ///
    /// # Errors
    ///
    /// `RouterClosed` if closed, otherwise the RPC error.
    #[instrument(skip_all, name = "rc.media.router.create_pipe_transport", fields(router_id = %self.id, internal = internal))]
    pub async fn create_pipe_transport(
        self: &Arc<Self>,
        internal: bool,
    ) -> Result<Arc<PipeTransport>, RcError> {
        self.ensure_open()?;
        let info: PipeTransportInfo = self
            .connection
            .request(
                methods::CREATE_PIPE_TRANSPORT,
                CreatePipeTransportRequest {
                    router_id: self.id.clone(),
                    internal,
                },
            )
            .await?;

        let transport = PipeTransport::new(self, info);
        let admitted = {
            let mut transports = self.pipe_transports.lock();
            if self.closed() {
                false
            } else {
                transports.insert(transport.id().to_string(), Arc::clone(&transport));
                true
            }
        };
        if !admitted {
            // Closed while the request was in flight.
            transport.close().await;
            return Err(RcError::RouterClosed(self.id.clone()));
        }

        tracing::debug!(
            target: "rc.media.router",
            router_id = %self.id,
            pipe_transport_id = %transport.id(),
            "Pipe transport created"
        );
        Ok(transport)
    }

    /// Relay `producer_id` from this router into `destination`.
    ///
    /// # Errors
    ///
    /// - `RouterClosed` if either router is closed
    /// - `ProduceFailed` if `destination` is this router
    /// - any transport creation, connect, consume or produce error
    #[instrument(skip_all, name = "rc.media.router.pipe_to_router", fields(router_id = %self.id, destination = %destination.id, producer_id = %producer_id))]
    pub async fn pipe_to_router(
        self: &Arc<Self>,
        producer_id: &str,
        destination: &Arc<Router>,
    ) -> Result<PipeToRouterResult, RcError> {
        self.ensure_open()?;
        destination.ensure_open()?;
        if Arc::ptr_eq(self, destination) {
            return Err(RcError::ProduceFailed(
                "cannot pipe a producer into its own router".to_string(),
            ));
        }

        let pair = self.pipe_pair_to(destination).await?;
        let pipe_consumer = pair.local.consume(producer_id).await?;
        let produced = pair
            .remote
            .produce(PipeProduceParams {
                producer_id: pipe_consumer.producer_id().to_string(),
                kind: pipe_consumer.kind(),
                paused: pipe_consumer.producer_paused(),
                rtp_parameters: pipe_consumer.rtp_parameters().clone(),
            })
            .await;

        match produced {
            Ok(pipe_producer) => Ok(PipeToRouterResult {
                pipe_consumer,
                pipe_producer,
            }),
            Err(e) => {
                pipe_consumer.close().await;
                Err(e)
            }
        }
    }

    async fn pipe_pair_to(self: &Arc<Self>, destination: &Arc<Router>) -> Result<PipePair, RcError> {
        let _guard = self.pipe_lock.lock().await;

        let cached = self.pipe_pairs.lock().get(destination.id()).cloned();
        if let Some(pair) = cached {
            if pair.usable() {
                return Ok(pair);
            }
        }

        let internal = self.media_node.id() == destination.media_node.id();
        let local = self.create_pipe_transport(internal).await?;
        let remote = match destination.create_pipe_transport(internal).await {
            Ok(remote) => remote,
            Err(e) => {
                local.close().await;
                return Err(e);
            }
        };

        if let Err(e) = connect_pair(&local, &remote).await {
            local.close().await;
            remote.close().await;
            return Err(e);
        }

        let pair = PipePair { local, remote };
        self.pipe_pairs
            .lock()
            .insert(destination.id().to_string(), pair.clone());
        tracing::info!(
            target: "rc.media.router",
            router_id = %self.id,
            destination = %destination.id(),
            internal,
            "Pipe transport pair established"
        );
        Ok(pair)
    }

    /// Close the router on the node and every pipe transport it owns. Idempotent.
    ///
    /// The node is notified without waiting for an acknowledgement.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.teardown();
        if let Err(e) = self
            .connection
            .notify(
                methods::CLOSE_ROUTER,
                RouterTarget {
                    router_id: self.id.clone(),
                },
            )
            .await
        {
            tracing::debug!(target: "rc.media.router", router_id = %self.id, error = %e, "closeRouter notify failed");
        }
    }

    fn close_local(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.teardown();
    }

    fn teardown(&self) {
        self.connection.pipeline().remove(&self.middleware);
        let transports: Vec<Arc<PipeTransport>> = self
            .pipe_transports
            .lock()
            .drain()
            .map(|(_, t)| t)
            .collect();
        for transport in transports {
            transport.close_local();
        }
        self.pipe_pairs.lock().clear();
        tracing::debug!(target: "rc.media.router", router_id = %self.id, "Router closed");
    }

    pub(crate) fn forget_pipe_transport(&self, id: &str) {
        self.pipe_transports.lock().remove(id);
        self.pipe_pairs.lock().retain(|_, pair| pair.local.id() != id);
    }
}

async fn connect_pair(local: &PipeTransport, remote: &PipeTransport) -> Result<(), RcError> {
    local.connect(remote.connect_params()).await?;
    remote.connect(local.connect_params()).await
}

/// Handles `routerClosed` for one router.
struct RouterMiddleware {
    router: Weak<Router>,
    router_id: String,
}

#[async_trait]
impl Middleware<InboundContext> for RouterMiddleware {
    async fn handle(
        &self,
        context: &mut InboundContext,
        next: Next<'_, InboundContext>,
    ) -> Result<(), RcError> {
        let addressed = context.kind == InboundKind::Notification
            && context.method == methods::ROUTER_CLOSED
            && context.field("routerId") == Some(self.router_id.as_str());
        if !addressed {
            return next.run(context).await;
        }
        let Some(router) = self.router.upgrade() else {
            return next.run(context).await;
        };

        tracing::info!(target: "rc.media.router", router_id = %self.router_id, "Router closed by media node");
        router.close_local();
        context.handled = true;
        Ok(())
    }
}
