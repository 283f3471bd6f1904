//! Handles `lockRoom` and `unlockRoom` peer messages.
//!
//! A message is claimed only when its `sessionId` names the room's current
//! session. The sender must hold `ChangeRoomLock`; the other peers are told
//! who changed the lock.

use crate::errors::RcError;
use crate::middleware::pipeline::{Middleware, Next};
use crate::room::{PeerContext, Permission, Room};

use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Weak};

pub const LOCK_ROOM: &str = "lockRoom";
pub const UNLOCK_ROOM: &str = "unlockRoom";

#[derive(Debug)]
pub struct LockMiddleware {
    room: Weak<Room>,
}

impl LockMiddleware {
    #[must_use]
    pub fn new(room: Weak<Room>) -> Self {
        Self { room }
    }
}

/// Build the lock middleware for `room`, ready to be added to a pipeline.
#[must_use]
pub fn create_lock_middleware(room: &Arc<Room>) -> Arc<dyn Middleware<PeerContext>> {
    Arc::new(LockMiddleware::new(Arc::downgrade(room)))
}

#[async_trait]
impl Middleware<PeerContext> for LockMiddleware {
    async fn handle(
        &self,
        context: &mut PeerContext,
        next: Next<'_, PeerContext>,
    ) -> Result<(), RcError> {
        let locked = match context.message.method.as_str() {
            LOCK_ROOM => true,
            UNLOCK_ROOM => false,
            _ => return next.run(context).await,
        };

        let Some(room) = self.room.upgrade() else {
            return next.run(context).await;
        };
        if context.message.session_id() != Some(room.session_id()) {
            return next.run(context).await;
        }

        let peer = Arc::clone(&context.peer);
        if !peer.has_permission(Permission::ChangeRoomLock) {
            tracing::debug!(target: "rc.room", room_id = %room.id(), peer_id = %peer.id(), method = %context.message.method, "Lock change refused");
            return Err(RcError::NotAuthorized(format!(
                "peer {} may not change the room lock",
                peer.id()
            )));
        }

        room.set_locked(locked);
        room.notify_peers(
            &context.message.method,
            json!({ "peerId": peer.id() }),
            Some(peer.id()),
        );
        context.handled = true;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::middleware::Pipeline;
    use crate::room::{Peer, PeerMessage, Role};
    use common::types::{PeerId, RoomId};

    fn message(method: &str, session_id: &str) -> PeerMessage {
        PeerMessage::new(method, json!({ "sessionId": session_id }))
    }

    #[tokio::test]
    async fn test_lock_by_normal_peer_locks_and_notifies_others() {
        let room = Room::new(RoomId::new("room-1"), "session-1");
        let (alice, mut alice_rx) = Peer::new(PeerId::new("alice"), [Role::Normal]);
        let (bob, mut bob_rx) = Peer::new(PeerId::new("bob"), [Role::Normal]);
        room.add_peer(Arc::clone(&alice)).unwrap();
        room.add_peer(Arc::clone(&bob)).unwrap();
        let _ = alice_rx.recv().await.unwrap();

        let context = room
            .handle_peer_message(Arc::clone(&alice), message(LOCK_ROOM, "session-1"))
            .await
            .unwrap();

        assert!(context.handled);
        assert!(room.locked());
        let seen = bob_rx.recv().await.unwrap();
        assert_eq!(seen.method, LOCK_ROOM);
        assert_eq!(seen.data["peerId"], "alice");
        assert!(bob_rx.try_recv().is_err());
        assert!(alice_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unlock_clears_lock() {
        let room = Room::new(RoomId::new("room-1"), "session-1");
        let (admin, _rx) = Peer::new(PeerId::new("admin"), [Role::Admin]);
        room.set_locked(true);

        let context = room
            .handle_peer_message(admin, message(UNLOCK_ROOM, "session-1"))
            .await
            .unwrap();

        assert!(context.handled);
        assert!(!room.locked());
    }

    #[tokio::test]
    async fn test_peer_without_permission_is_rejected() {
        let room = Room::new(RoomId::new("room-1"), "session-1");
        let (presenter, _rx) = Peer::new(PeerId::new("presenter"), [Role::Presenter]);

        let result = room
            .handle_peer_message(presenter, message(LOCK_ROOM, "session-1"))
            .await;

        assert!(matches!(result, Err(RcError::NotAuthorized(_))));
        assert!(!room.locked());
    }

    #[tokio::test]
    async fn test_other_session_passes_through() {
        let room = Room::new(RoomId::new("room-1"), "session-1");
        let (alice, _rx) = Peer::new(PeerId::new("alice"), [Role::Normal]);

        let context = room
            .handle_peer_message(alice, message(LOCK_ROOM, "session-2"))
            .await
            .unwrap();

        assert!(!context.handled);
        assert!(!room.locked());
    }

    #[tokio::test]
    async fn test_missing_session_passes_through() {
        let room = Room::new(RoomId::new("room-1"), "session-1");
        let (alice, _rx) = Peer::new(PeerId::new("alice"), [Role::Normal]);

        let context = room
            .handle_peer_message(alice, PeerMessage::new(LOCK_ROOM, json!({})))
            .await
            .unwrap();

        assert!(!context.handled);
        assert!(!room.locked());
    }

    #[tokio::test]
    async fn test_other_method_passes_through() {
        let room = Room::new(RoomId::new("room-1"), "session-1");
        let (presenter, _rx) = Peer::new(PeerId::new("presenter"), [Role::Presenter]);

        let context = room
            .handle_peer_message(presenter, message("chatMessage", "session-1"))
            .await
            .unwrap();

        assert!(!context.handled);
    }

    #[tokio::test]
    async fn test_dropped_room_passes_through() {
        let room = Room::new(RoomId::new("room-1"), "session-1");
        let middleware = create_lock_middleware(&room);
        drop(room);

        let pipeline = Pipeline::new();
        pipeline.use_middleware(middleware);
        let (alice, _rx) = Peer::new(PeerId::new("alice"), [Role::Normal]);
        let mut context = PeerContext::new(alice, message(LOCK_ROOM, "session-1"));

        pipeline.execute(&mut context).await.unwrap();
        assert!(!context.handled);
    }
}
