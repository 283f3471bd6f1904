//! Rooms, their peers and role-based permissions.

pub mod authorization;
pub mod context;
pub mod peer;
#[allow(clippy::module_inception)]
pub mod room;

pub use authorization::{Permission, Role};
pub use context::{PeerContext, PeerMessage};
pub use peer::{Peer, PeerNotification, PEER_NOTIFICATION_BUFFER};
pub use room::Room;
