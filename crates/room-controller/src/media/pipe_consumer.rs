//! Consumer created on a pipe transport, pulling a local producer towards another router.

use crate::media::connection::MediaNodeConnection;
use crate::media::messages::{methods, MediaKind, PipeConsumerInfo, PipeConsumerTarget};
use crate::media::pipe_transport::PipeTransport;
use crate::media::router::Router;

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Remote handle to a pipe consumer.
#[derive(Debug)]
pub struct PipeConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    rtp_parameters: Value,
    router_id: String,
    pipe_transport_id: String,
    router: Weak<Router>,
    pipe_transport: Weak<PipeTransport>,
    connection: Arc<MediaNodeConnection>,
    producer_paused: AtomicBool,
    closed: AtomicBool,
}

impl PipeConsumer {
    pub(crate) fn new(
        producer_id: String,
        info: PipeConsumerInfo,
        pipe_transport: &Arc<PipeTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: info.id,
            producer_id,
            kind: info.kind,
            rtp_parameters: info.rtp_parameters,
            router_id: pipe_transport.router_id().to_string(),
            pipe_transport_id: pipe_transport.id().to_string(),
            router: pipe_transport.router_weak(),
            pipe_transport: Arc::downgrade(pipe_transport),
            connection: Arc::clone(pipe_transport.connection()),
            producer_paused: AtomicBool::new(info.producer_paused),
            closed: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The producer this consumer reads from.
    pub fn producer_id(&self) -> &str {
        &self.producer_id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn rtp_parameters(&self) -> &Value {
        &self.rtp_parameters
    }

    pub fn router(&self) -> Option<Arc<Router>> {
        self.router.upgrade()
    }

    /// Whether the source producer is paused, as last reported by the node.
    pub fn producer_paused(&self) -> bool {
        self.producer_paused.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn set_producer_paused(&self, paused: bool) {
        self.producer_paused.store(paused, Ordering::SeqCst);
    }

    /// Close the consumer on the node and detach it from its transport. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let target = PipeConsumerTarget {
            router_id: self.router_id.clone(),
            pipe_transport_id: self.pipe_transport_id.clone(),
            pipe_consumer_id: self.id.clone(),
        };
        if let Some(transport) = self.pipe_transport.upgrade() {
            transport.forget_pipe_consumer(&self.id);
        }
        if let Err(e) = self
            .connection
            .notify(methods::CLOSE_PIPE_CONSUMER, target)
            .await
        {
            tracing::debug!(
                target: "rc.media.pipe_transport",
                pipe_consumer_id = %self.id,
                error = %e,
                "closePipeConsumer notify failed"
            );
        }
    }

    pub(crate) fn close_local(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
