//! Room state: peers, lock flag, per-node routers and the peer-message pipeline.
//!
//! # Lifecycle
//!
//! A room is created with its lock middleware installed. Peers join through
//! [`Room::add_peer`], which refuses peers without `BypassRoomLock` while the
//! room is locked. [`Room::close`] closes every router the room holds, tells
//! the remaining peers and rejects all further joins and messages.

use crate::errors::RcError;
use crate::media::Router;
use crate::middleware::{LockMiddleware, Pipeline};
use crate::observability::metrics;
use crate::room::authorization::Permission;
use crate::room::context::{PeerContext, PeerMessage};
use crate::room::peer::Peer;

use common::types::{MediaNodeId, PeerId, RoomId};
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct Room {
    id: RoomId,
    session_id: String,
    locked: AtomicBool,
    closed: AtomicBool,
    peers: RwLock<HashMap<PeerId, Arc<Peer>>>,
    /// One router per media node, in the order they were assigned.
    routers: Mutex<Vec<Arc<Router>>>,
    pipeline: Pipeline<PeerContext>,
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("session_id", &self.session_id)
            .field("locked", &self.locked())
            .field("closed", &self.closed())
            .field("peers", &self.peers.read().len())
            .finish_non_exhaustive()
    }
}

impl Room {
    #[must_use]
    pub fn new(id: RoomId, session_id: impl Into<String>) -> Arc<Self> {
        let session_id = session_id.into();
        Arc::new_cyclic(|weak| {
            let pipeline = Pipeline::new();
            pipeline.use_middleware(Arc::new(LockMiddleware::new(weak.clone())));
            tracing::debug!(target: "rc.room", room_id = %id, session_id = %session_id, "Room created");
            Self {
                id,
                session_id,
                locked: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                peers: RwLock::new(HashMap::new()),
                routers: Mutex::new(Vec::new()),
                pipeline,
            }
        })
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Identifies this incarnation of the room; lock messages must name it.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub(crate) fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
        tracing::info!(target: "rc.room", room_id = %self.id, locked, "Room lock changed");
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Peer-message pipeline; the lock middleware is installed first.
    pub fn pipeline(&self) -> &Pipeline<PeerContext> {
        &self.pipeline
    }

    // ------------------------------------------------------------------
    // Peers
    // ------------------------------------------------------------------

    /// Admit a peer and announce it to the others.
    ///
    /// # Errors
    ///
    /// `RoomClosed` after close; `RoomLocked` if the room is locked and the
    /// peer lacks `BypassRoomLock`.
    pub fn add_peer(&self, peer: Arc<Peer>) -> Result<(), RcError> {
        if self.closed() {
            return Err(RcError::RoomClosed(self.id.to_string()));
        }
        if self.locked() && !peer.has_permission(Permission::BypassRoomLock) {
            tracing::debug!(target: "rc.room", room_id = %self.id, peer_id = %peer.id(), "Join refused, room locked");
            return Err(RcError::RoomLocked(self.id.to_string()));
        }

        let peer_id = peer.id().clone();
        self.peers.write().insert(peer_id.clone(), peer);
        self.notify_peers("newPeer", json!({ "peerId": peer_id }), Some(&peer_id));
        tracing::debug!(target: "rc.room", room_id = %self.id, peer_id = %peer_id, "Peer joined");
        Ok(())
    }

    pub fn remove_peer(&self, peer_id: &PeerId) -> Option<Arc<Peer>> {
        let removed = self.peers.write().remove(peer_id);
        if removed.is_some() {
            self.notify_peers("peerClosed", json!({ "peerId": peer_id }), None);
            tracing::debug!(target: "rc.room", room_id = %self.id, peer_id = %peer_id, "Peer left");
        }
        removed
    }

    pub fn peer(&self, peer_id: &PeerId) -> Option<Arc<Peer>> {
        self.peers.read().get(peer_id).cloned()
    }

    pub fn peers(&self) -> Vec<Arc<Peer>> {
        self.peers.read().values().cloned().collect()
    }

    /// Send one notification to every peer except `exclude`.
    pub fn notify_peers(&self, method: &str, data: Value, exclude: Option<&PeerId>) {
        for peer in self.peers() {
            if exclude == Some(peer.id()) {
                continue;
            }
            peer.notify(method, data.clone());
        }
    }

    /// Run a peer message through the room pipeline.
    ///
    /// # Errors
    ///
    /// `RoomClosed` after close, or whatever a middleware rejected with.
    pub async fn handle_peer_message(
        &self,
        peer: Arc<Peer>,
        message: PeerMessage,
    ) -> Result<PeerContext, RcError> {
        if self.closed() {
            metrics::record_peer_message("rejected");
            return Err(RcError::RoomClosed(self.id.to_string()));
        }

        let mut context = PeerContext::new(peer, message);
        match self.pipeline.execute(&mut context).await {
            Ok(()) => {
                metrics::record_peer_message(if context.handled {
                    "handled"
                } else {
                    "unhandled"
                });
                Ok(context)
            }
            Err(e) => {
                tracing::debug!(
                    target: "rc.room",
                    room_id = %self.id,
                    peer_id = %context.peer.id(),
                    method = %context.message.method,
                    error = %e,
                    "Peer message rejected"
                );
                metrics::record_peer_message("rejected");
                Err(e)
            }
        }
    }

    // ------------------------------------------------------------------
    // Routers
    // ------------------------------------------------------------------

    /// Track the room's router on a media node, replacing a closed one.
    pub fn add_router(&self, router: Arc<Router>) {
        let mut routers = self.routers.lock();
        routers.retain(|r| r.usable() && r.media_node().id() != router.media_node().id());
        routers.push(router);
    }

    pub fn router_for(&self, node_id: &MediaNodeId) -> Option<Arc<Router>> {
        self.routers
            .lock()
            .iter()
            .find(|r| r.usable() && r.media_node().id() == node_id)
            .cloned()
    }

    pub fn routers(&self) -> Vec<Arc<Router>> {
        self.routers
            .lock()
            .iter()
            .filter(|r| r.usable())
            .cloned()
            .collect()
    }

    /// Nodes currently hosting this room, in assignment order.
    pub fn media_node_ids(&self) -> Vec<MediaNodeId> {
        self.routers()
            .iter()
            .map(|r| r.media_node().id().clone())
            .collect()
    }

    /// Close routers, notify remaining peers and drop them. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let routers: Vec<Arc<Router>> = self.routers.lock().drain(..).collect();
        for router in routers {
            router.close().await;
        }

        self.notify_peers("roomClosed", json!({}), None);
        self.peers.write().clear();
        tracing::info!(target: "rc.room", room_id = %self.id, "Room closed");
    }
}
