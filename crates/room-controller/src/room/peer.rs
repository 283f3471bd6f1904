//! A participant in a room.

use crate::room::authorization::{Permission, Role};

use common::types::PeerId;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outbound notification queue depth per peer.
pub const PEER_NOTIFICATION_BUFFER: usize = 64;

/// Server-to-client notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeerNotification {
    pub method: String,
    pub data: Value,
}

#[derive(Debug)]
pub struct Peer {
    id: PeerId,
    roles: RwLock<HashSet<Role>>,
    sender: mpsc::Sender<PeerNotification>,
}

impl Peer {
    /// Create a peer; the receiver is drained by the peer's signaling session.
    #[must_use]
    pub fn new(
        id: PeerId,
        roles: impl IntoIterator<Item = Role>,
    ) -> (Arc<Self>, mpsc::Receiver<PeerNotification>) {
        let (sender, receiver) = mpsc::channel(PEER_NOTIFICATION_BUFFER);
        let peer = Arc::new(Self {
            id,
            roles: RwLock::new(roles.into_iter().collect()),
            sender,
        });
        (peer, receiver)
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn roles(&self) -> HashSet<Role> {
        self.roles.read().clone()
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.read().contains(&role)
    }

    pub fn add_role(&self, role: Role) -> bool {
        self.roles.write().insert(role)
    }

    pub fn remove_role(&self, role: Role) -> bool {
        self.roles.write().remove(&role)
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        permission.granted_to(&self.roles.read())
    }

    /// Queue a notification without blocking. Returns `false` if it was dropped.
    pub fn notify(&self, method: &str, data: Value) -> bool {
        let notification = PeerNotification {
            method: method.to_string(),
            data,
        };
        match self.sender.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(target: "rc.room", peer_id = %self.id, method, "Peer notification queue full, dropping");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(target: "rc.room", peer_id = %self.id, method, "Peer gone, dropping notification");
                false
            }
        }
    }
}
