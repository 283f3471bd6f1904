//! Pipe transport: relays media between two routers, usually on different nodes.
//!
//! A transport owns the pipe producers and consumers created through it and
//! keeps them in maps keyed by the node-assigned id while it is open. Closing
//! the transport closes and clears both maps.
//!
//! At construction the transport registers a middleware on its connection's
//! inbound pipeline. The middleware reacts to node notifications addressed to
//! this transport (`routerId` and `pipeTransportId` both match):
//!
//! | method | effect |
//! |--------|--------|
//! | `pipeTransportClosed` | close locally, no `closePipeTransport` sent |
//! | `pipeProducerClosed` | close and forget `pipeProducerId` |
//! | `pipeConsumerClosed` | close and forget `pipeConsumerId` |
//! | `pipeConsumerPaused` / `pipeConsumerResumed` | update `producer_paused` |
//!
//! Everything else passes through.

use crate::errors::RcError;
use crate::media::connection::{InboundContext, InboundKind, MediaNodeConnection};
use crate::media::messages::{
    methods, ConnectPipeTransportRequest, CreatePipeConsumerRequest, CreatePipeProducerRequest,
    CreatedPipeProducer, MediaKind, PipeConsumerInfo, PipeConsumerTarget, PipeProducerTarget,
    PipeTransportInfo, PipeTransportTarget, SrtpParameters,
};
use crate::media::pipe_consumer::PipeConsumer;
use crate::media::pipe_producer::PipeProducer;
use crate::media::router::Router;
use crate::middleware::{Middleware, Next};
use crate::observability::metrics;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::instrument;

/// Remote endpoint to connect a pipe transport to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeConnectParams {
    pub ip: String,
    pub port: u16,
    pub srtp_parameters: Option<SrtpParameters>,
}

/// Stream to re-publish through a pipe transport.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeProduceParams {
    pub producer_id: String,
    pub kind: MediaKind,
    pub paused: bool,
    pub rtp_parameters: Value,
}

pub struct PipeTransport {
    id: String,
    ip: String,
    port: u16,
    srtp_parameters: Option<SrtpParameters>,
    router_id: String,
    router: Weak<Router>,
    connection: Arc<MediaNodeConnection>,
    closed: AtomicBool,
    pipe_producers: Mutex<HashMap<String, Arc<PipeProducer>>>,
    pipe_consumers: Mutex<HashMap<String, Arc<PipeConsumer>>>,
    middleware: Arc<dyn Middleware<InboundContext>>,
}

impl std::fmt::Debug for PipeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeTransport")
            .field("id", &self.id)
            .field("router_id", &self.router_id)
            .field("ip", &self.ip)
            .field("port", &self.port)
            .field("closed", &self.closed())
            .finish_non_exhaustive()
    }
}

impl PipeTransport {
    /// Wrap a transport the node created on `router`, and start listening for
    /// its notifications.
    #[must_use]
    pub fn new(router: &Arc<Router>, info: PipeTransportInfo) -> Arc<Self> {
        let transport = Arc::new_cyclic(|weak: &Weak<PipeTransport>| {
            let middleware: Arc<dyn Middleware<InboundContext>> =
                Arc::new(PipeTransportMiddleware {
                    transport: weak.clone(),
                    router_id: router.id().to_string(),
                    pipe_transport_id: info.id.clone(),
                });
            PipeTransport {
                id: info.id,
                ip: info.ip,
                port: info.port,
                srtp_parameters: info.srtp_parameters,
                router_id: router.id().to_string(),
                router: Arc::downgrade(router),
                connection: Arc::clone(router.connection()),
                closed: AtomicBool::new(false),
                pipe_producers: Mutex::new(HashMap::new()),
                pipe_consumers: Mutex::new(HashMap::new()),
                middleware,
            }
        });
        transport
            .connection
            .pipeline()
            .use_middleware(Arc::clone(&transport.middleware));
        metrics::record_pipe_transport_opened();
        transport
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn srtp_parameters(&self) -> Option<&SrtpParameters> {
        self.srtp_parameters.as_ref()
    }

    pub fn router_id(&self) -> &str {
        &self.router_id
    }

    pub fn router(&self) -> Option<Arc<Router>> {
        self.router.upgrade()
    }

    pub fn connection(&self) -> &Arc<MediaNodeConnection> {
        &self.connection
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Parameters a peer transport uses to connect to this one.
    pub fn connect_params(&self) -> PipeConnectParams {
        PipeConnectParams {
            ip: self.ip.clone(),
            port: self.port,
            srtp_parameters: self.srtp_parameters.clone(),
        }
    }

    pub fn pipe_producer(&self, id: &str) -> Option<Arc<PipeProducer>> {
        self.pipe_producers.lock().get(id).cloned()
    }

    pub fn pipe_consumer(&self, id: &str) -> Option<Arc<PipeConsumer>> {
        self.pipe_consumers.lock().get(id).cloned()
    }

    pub fn pipe_producer_count(&self) -> usize {
        self.pipe_producers.lock().len()
    }

    pub fn pipe_consumer_count(&self) -> usize {
        self.pipe_consumers.lock().len()
    }

    pub(crate) fn router_weak(&self) -> Weak<Router> {
        self.router.clone()
    }

    fn ensure_open(&self) -> Result<(), RcError> {
        if self.closed() {
            Err(RcError::TransportClosed(self.id.clone()))
        } else {
            Ok(())
        }
    }

    fn target(&self) -> PipeTransportTarget {
        PipeTransportTarget {
            router_id: self.router_id.clone(),
            pipe_transport_id: self.id.clone(),
        }
    }

    /// Connect to the remote end of the pipe.
    ///
    /// # Errors
    ///
    /// - `TransportClosed` if closed
    /// - `ConnectFailed` if the node rejects the parameters
    /// - `Timeout` / `ConnectionClosed` from the connection
    #[instrument(skip_all, name = "rc.media.pipe_transport.connect", fields(pipe_transport_id = %self.id, ip = %params.ip, port = params.port))]
    pub async fn connect(&self, params: PipeConnectParams) -> Result<(), RcError> {
        self.ensure_open()?;
        let request = ConnectPipeTransportRequest {
            router_id: self.router_id.clone(),
            pipe_transport_id: self.id.clone(),
            ip: params.ip,
            port: params.port,
            srtp_parameters: params.srtp_parameters,
        };
        self.connection
            .request::<Value>(methods::CONNECT_PIPE_TRANSPORT, request)
            .await
            .map_err(|e| match e {
                RcError::RequestFailed { reason, .. } => RcError::ConnectFailed(reason),
                other => other,
            })?;

        tracing::debug!(target: "rc.media.pipe_transport", pipe_transport_id = %self.id, "Pipe transport connected");
        Ok(())
    }

    /// Re-publish a producer from the other side of the pipe.
    ///
    /// The returned producer is keyed by the node-assigned id.
    ///
    /// # Errors
    ///
    /// - `TransportClosed` if closed (also if it closed while the call was in flight)
    /// - `ProduceFailed` for an empty producer id or a node rejection
    /// - `Timeout` / `ConnectionClosed` from the connection
    #[instrument(skip_all, name = "rc.media.pipe_transport.produce", fields(pipe_transport_id = %self.id, producer_id = %params.producer_id))]
    pub async fn produce(
        self: &Arc<Self>,
        params: PipeProduceParams,
    ) -> Result<Arc<PipeProducer>, RcError> {
        self.ensure_open()?;
        if params.producer_id.is_empty() {
            return Err(RcError::ProduceFailed(
                "producerId must not be empty".to_string(),
            ));
        }

        let request = CreatePipeProducerRequest {
            router_id: self.router_id.clone(),
            pipe_transport_id: self.id.clone(),
            producer_id: params.producer_id,
            kind: params.kind,
            paused: params.paused,
            rtp_parameters: params.rtp_parameters,
        };
        let created: CreatedPipeProducer = self
            .connection
            .request(methods::CREATE_PIPE_PRODUCER, request)
            .await
            .map_err(|e| match e {
                RcError::RequestFailed { reason, .. } => RcError::ProduceFailed(reason),
                other => other,
            })?;

        let producer = PipeProducer::new(created.id, params.kind, params.paused, self);
        // Checked under the map lock so a concurrent teardown cannot miss it.
        let admitted = {
            let mut producers = self.pipe_producers.lock();
            if self.closed() {
                false
            } else {
                producers.insert(producer.id().to_string(), Arc::clone(&producer));
                true
            }
        };
        if !admitted {
            // Closed while the request was in flight.
            producer.close().await;
            return Err(RcError::TransportClosed(self.id.clone()));
        }

        tracing::debug!(
            target: "rc.media.pipe_transport",
            pipe_transport_id = %self.id,
            pipe_producer_id = %producer.id(),
            "Pipe producer created"
        );
        Ok(producer)
    }

    /// Consume a local producer so it can be relayed through the pipe.
    ///
    /// # Errors
    ///
    /// - `TransportClosed` if closed
    /// - `ConsumeFailed` if the node rejects the request
    /// - `Timeout` / `ConnectionClosed` from the connection
    #[instrument(skip_all, name = "rc.media.pipe_transport.consume", fields(pipe_transport_id = %self.id, producer_id = %producer_id))]
    pub async fn consume(self: &Arc<Self>, producer_id: &str) -> Result<Arc<PipeConsumer>, RcError> {
        self.ensure_open()?;
        let request = CreatePipeConsumerRequest {
            router_id: self.router_id.clone(),
            pipe_transport_id: self.id.clone(),
            producer_id: producer_id.to_string(),
        };
        let info: PipeConsumerInfo = self
            .connection
            .request(methods::CREATE_PIPE_CONSUMER, request)
            .await
            .map_err(|e| match e {
                RcError::RequestFailed { reason, .. } => RcError::ConsumeFailed(reason),
                other => other,
            })?;

        let consumer = PipeConsumer::new(producer_id.to_string(), info, self);
        let admitted = {
            let mut consumers = self.pipe_consumers.lock();
            if self.closed() {
                false
            } else {
                consumers.insert(consumer.id().to_string(), Arc::clone(&consumer));
                true
            }
        };
        if !admitted {
            consumer.close().await;
            return Err(RcError::TransportClosed(self.id.clone()));
        }

        tracing::debug!(
            target: "rc.media.pipe_transport",
            pipe_transport_id = %self.id,
            pipe_consumer_id = %consumer.id(),
            "Pipe consumer created"
        );
        Ok(consumer)
    }

    /// Close the transport on the node and release everything it owns. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.teardown();
        if let Err(e) = self
            .connection
            .notify(methods::CLOSE_PIPE_TRANSPORT, self.target())
            .await
        {
            tracing::debug!(
                target: "rc.media.pipe_transport",
                pipe_transport_id = %self.id,
                error = %e,
                "closePipeTransport notify failed"
            );
        }
    }

    /// Close without notifying the node (node-initiated, or cascaded from the router).
    pub(crate) fn close_local(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.teardown();
    }

    fn teardown(&self) {
        self.connection.pipeline().remove(&self.middleware);

        let producers: Vec<Arc<PipeProducer>> =
            self.pipe_producers.lock().drain().map(|(_, p)| p).collect();
        for producer in producers {
            producer.close_local();
        }
        let consumers: Vec<Arc<PipeConsumer>> =
            self.pipe_consumers.lock().drain().map(|(_, c)| c).collect();
        for consumer in consumers {
            consumer.close_local();
        }

        if let Some(router) = self.router.upgrade() {
            router.forget_pipe_transport(&self.id);
        }
        metrics::record_pipe_transport_closed();
        tracing::debug!(target: "rc.media.pipe_transport", pipe_transport_id = %self.id, "Pipe transport closed");
    }

    pub(crate) fn forget_pipe_producer(&self, id: &str) {
        self.pipe_producers.lock().remove(id);
    }

    pub(crate) fn forget_pipe_consumer(&self, id: &str) {
        self.pipe_consumers.lock().remove(id);
    }

    fn on_remote_producer_closed(&self, id: &str) {
        let producer = self.pipe_producers.lock().remove(id);
        if let Some(producer) = producer {
            producer.close_local();
        }
    }

    fn on_remote_consumer_closed(&self, id: &str) {
        let consumer = self.pipe_consumers.lock().remove(id);
        if let Some(consumer) = consumer {
            consumer.close_local();
        }
    }
}

/// Routes node notifications addressed to one pipe transport.
struct PipeTransportMiddleware {
    transport: Weak<PipeTransport>,
    router_id: String,
    pipe_transport_id: String,
}

impl PipeTransportMiddleware {
    fn addressed_to_me(&self, context: &InboundContext) -> bool {
        context.kind == InboundKind::Notification
            && context.field("routerId") == Some(self.router_id.as_str())
            && context.field("pipeTransportId") == Some(self.pipe_transport_id.as_str())
    }
}

#[async_trait]
impl Middleware<InboundContext> for PipeTransportMiddleware {
    async fn handle(
        &self,
        context: &mut InboundContext,
        next: Next<'_, InboundContext>,
    ) -> Result<(), RcError> {
        if !self.addressed_to_me(context) {
            return next.run(context).await;
        }
        let Some(transport) = self.transport.upgrade() else {
            return next.run(context).await;
        };

        match context.method.as_str() {
            methods::PIPE_TRANSPORT_CLOSED => {
                tracing::info!(
                    target: "rc.media.pipe_transport",
                    pipe_transport_id = %self.pipe_transport_id,
                    "Pipe transport closed by media node"
                );
                transport.close_local();
            }
            methods::PIPE_PRODUCER_CLOSED => {
                let target: PipeProducerTarget = context.parse()?;
                transport.on_remote_producer_closed(&target.pipe_producer_id);
            }
            methods::PIPE_CONSUMER_CLOSED => {
                let target: PipeConsumerTarget = context.parse()?;
                transport.on_remote_consumer_closed(&target.pipe_consumer_id);
            }
            methods::PIPE_CONSUMER_PAUSED | methods::PIPE_CONSUMER_RESUMED => {
                let target: PipeConsumerTarget = context.parse()?;
                let paused = context.method == methods::PIPE_CONSUMER_PAUSED;
                if let Some(consumer) = transport.pipe_consumer(&target.pipe_consumer_id) {
                    consumer.set_producer_paused(paused);
                }
            }
            _ => return next.run(context).await,
        }

        context.handled = true;
        Ok(())
    }
}
