//! The set of media nodes known to this controller and room placement over them.

use crate::errors::RcError;
use crate::loadbalance::{LoadBalancer, PlacementContext};
use crate::media::node::MediaNode;
use crate::media::router::Router;
use crate::observability::metrics;
use crate::room::Room;

use common::types::{GeoPosition, MediaNodeId};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::instrument;

#[derive(Debug)]
pub struct MediaCluster {
    nodes: RwLock<Vec<Arc<MediaNode>>>,
    load_balancer: LoadBalancer,
    /// Serializes router placement so a room never gets two routers on one node.
    placement_lock: tokio::sync::Mutex<()>,
}

impl MediaCluster {
    #[must_use]
    pub fn new(load_balancer: LoadBalancer) -> Self {
        Self {
            nodes: RwLock::new(Vec::new()),
            load_balancer,
            placement_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Register a node. Returns `false` if a node with the same id exists.
    pub fn add_node(&self, node: Arc<MediaNode>) -> bool {
        let count = {
            let mut nodes = self.nodes.write();
            if nodes.iter().any(|n| n.id() == node.id()) {
                return false;
            }
            tracing::info!(target: "rc.cluster", node_id = %node.id(), hostname = %node.hostname(), port = node.port(), "Media node registered");
            nodes.push(node);
            nodes.len()
        };
        metrics::set_media_nodes_registered(count);
        true
    }

    /// Unregister and close a node.
    pub fn remove_node(&self, id: &MediaNodeId) -> Option<Arc<MediaNode>> {
        let (removed, count) = {
            let mut nodes = self.nodes.write();
            let position = nodes.iter().position(|n| n.id() == id);
            (position.map(|p| nodes.remove(p)), nodes.len())
        };
        if let Some(node) = &removed {
            node.close();
            metrics::set_media_nodes_registered(count);
            tracing::info!(target: "rc.cluster", node_id = %id, "Media node removed");
        }
        removed
    }

    pub fn node(&self, id: &MediaNodeId) -> Option<Arc<MediaNode>> {
        self.nodes.read().iter().find(|n| n.id() == id).cloned()
    }

    pub fn nodes(&self) -> Vec<Arc<MediaNode>> {
        self.nodes.read().clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    pub fn load_balancer(&self) -> &LoadBalancer {
        &self.load_balancer
    }

    /// The router `room` should use for a client at `client_location`.
    ///
    /// Reuses the room's router on the chosen node, or asks the node for one.
    ///
    /// # Errors
    ///
    /// `NoMediaNodeAvailable` if placement fails, or the node's request error.
    #[instrument(skip_all, name = "rc.cluster.get_router", fields(room_id = %room.id()))]
    pub async fn get_router(
        &self,
        room: &Room,
        client_location: Option<GeoPosition>,
    ) -> Result<Arc<Router>, RcError> {
        if room.closed() {
            return Err(RcError::RoomClosed(room.id().to_string()));
        }

        let _guard = self.placement_lock.lock().await;
        let context = PlacementContext {
            client_location,
            current_nodes: room.media_node_ids(),
        };
        let placement = self.load_balancer.select(&self.nodes(), &context)?;

        if let Some(router) = room.router_for(placement.node.id()) {
            return Ok(router);
        }

        let router = placement.node.get_router(room.id()).await?;
        room.add_router(Arc::clone(&router));
        tracing::debug!(
            target: "rc.cluster",
            room_id = %room.id(),
            node_id = %placement.node.id(),
            router_id = %router.id(),
            strategy = placement.strategy,
            "Room placed on media node"
        );
        Ok(router)
    }

    /// Close every node.
    pub fn close(&self) {
        for node in self.nodes() {
            node.close();
        }
        tracing::info!(target: "rc.cluster", "Media cluster closed");
    }
}
