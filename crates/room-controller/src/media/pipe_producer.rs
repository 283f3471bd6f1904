//! Producer created on a pipe transport, re-publishing a stream from another router.

use crate::errors::RcError;
use crate::media::connection::MediaNodeConnection;
use crate::media::messages::{methods, MediaKind, PipeProducerTarget};
use crate::media::pipe_transport::PipeTransport;
use crate::media::router::Router;

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Remote handle to a pipe producer.
///
/// Owned by its [`PipeTransport`]; the router and transport references are
/// non-owning.
#[derive(Debug)]
pub struct PipeProducer {
    id: String,
    kind: MediaKind,
    router_id: String,
    pipe_transport_id: String,
    router: Weak<Router>,
    pipe_transport: Weak<PipeTransport>,
    connection: Arc<MediaNodeConnection>,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl PipeProducer {
    pub(crate) fn new(
        id: String,
        kind: MediaKind,
        paused: bool,
        pipe_transport: &Arc<PipeTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            kind,
            router_id: pipe_transport.router_id().to_string(),
            pipe_transport_id: pipe_transport.id().to_string(),
            router: pipe_transport.router_weak(),
            pipe_transport: Arc::downgrade(pipe_transport),
            connection: Arc::clone(pipe_transport.connection()),
            paused: AtomicBool::new(paused),
            closed: AtomicBool::new(false),
        })
    }

    /// Id assigned by the media node.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// The router this producer lives on, while it is alive.
    pub fn router(&self) -> Option<Arc<Router>> {
        self.router.upgrade()
    }

    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Pause forwarding on the destination node.
    ///
    /// # Errors
    ///
    /// `TransportClosed` if closed, otherwise the RPC error.
    pub async fn pause(&self) -> Result<(), RcError> {
        self.set_paused(methods::PAUSE_PIPE_PRODUCER, true).await
    }

    /// Resume forwarding on the destination node.
    ///
    /// # Errors
    ///
    /// `TransportClosed` if closed, otherwise the RPC error.
    pub async fn resume(&self) -> Result<(), RcError> {
        self.set_paused(methods::RESUME_PIPE_PRODUCER, false).await
    }

    async fn set_paused(&self, method: &str, paused: bool) -> Result<(), RcError> {
        if self.closed() {
            return Err(RcError::TransportClosed(self.pipe_transport_id.clone()));
        }
        self.connection
            .request::<Value>(method, self.target())
            .await?;
        self.paused.store(paused, Ordering::SeqCst);
        Ok(())
    }

    /// Close the producer on the node and detach it from its transport. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(transport) = self.pipe_transport.upgrade() {
            transport.forget_pipe_producer(&self.id);
        }
        if let Err(e) = self
            .connection
            .notify(methods::CLOSE_PIPE_PRODUCER, self.target())
            .await
        {
            tracing::debug!(
                target: "rc.media.pipe_transport",
                pipe_producer_id = %self.id,
                error = %e,
                "closePipeProducer notify failed"
            );
        }
    }

    /// Mark closed without telling the node (owner or node already closed it).
    pub(crate) fn close_local(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn target(&self) -> PipeProducerTarget {
        PipeProducerTarget {
            router_id: self.router_id.clone(),
            pipe_transport_id: self.pipe_transport_id.clone(),
            pipe_producer_id: self.id.clone(),
        }
    }
}
