//! Peer roles and the permissions they grant.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Role held by a peer in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Moderator,
    Authenticated,
    Presenter,
    /// Minimal operating role, granted to every admitted peer.
    Normal,
}

/// Room operations gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Lock or unlock the room.
    ChangeRoomLock,
    /// Join while the room is locked.
    BypassRoomLock,
}

impl Permission {
    /// Roles that grant this permission.
    #[must_use]
    pub fn allowed_roles(self) -> &'static [Role] {
        match self {
            Permission::ChangeRoomLock => &[Role::Admin, Role::Moderator, Role::Normal],
            Permission::BypassRoomLock => &[Role::Admin, Role::Moderator],
        }
    }

    /// Whether any of `roles` grants this permission.
    #[must_use]
    pub fn granted_to(self, roles: &HashSet<Role>) -> bool {
        self.allowed_roles().iter().any(|role| roles.contains(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_roles_grants_nothing() {
        let roles = HashSet::new();
        assert!(!Permission::ChangeRoomLock.granted_to(&roles));
        assert!(!Permission::BypassRoomLock.granted_to(&roles));
    }

    #[test]
    fn test_normal_may_change_lock_but_not_bypass() {
        let roles = HashSet::from([Role::Normal]);
        assert!(Permission::ChangeRoomLock.granted_to(&roles));
        assert!(!Permission::BypassRoomLock.granted_to(&roles));
    }

    #[test]
    fn test_presenter_alone_may_not_change_lock() {
        let roles = HashSet::from([Role::Presenter, Role::Authenticated]);
        assert!(!Permission::ChangeRoomLock.granted_to(&roles));
    }

    #[test]
    fn test_moderator_may_bypass_lock() {
        let roles = HashSet::from([Role::Moderator]);
        assert!(Permission::BypassRoomLock.granted_to(&roles));
    }
}
