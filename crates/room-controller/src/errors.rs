//! Room Controller error types.
//!
//! Error types map to signaling `ErrorCode` values for client responses.
//! Internal details (node hostnames, remote error text) are logged server-side
//! but never exposed to clients.

use thiserror::Error;

/// Room Controller error type.
///
/// Maps to signaling `ErrorCode` values:
/// - `NotAuthorized`, `RoomLocked`: `FORBIDDEN` (3)
/// - `RoomClosed`, `RouterClosed`, `TransportClosed`: `NOT_FOUND` (4)
/// - RPC, transport and configuration failures: `INTERNAL_ERROR` (6)
/// - `NoMediaNodeAvailable`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Clone, Error)]
pub enum RcError {
    /// The media node connection is closed (or closed while the call was pending).
    #[error("Media node connection closed")]
    ConnectionClosed,

    /// No reply arrived within the request timeout.
    #[error("Request timed out: {method}")]
    Timeout { method: String },

    /// The media node answered the request with an error.
    #[error("Request {method} failed: {reason}")]
    RequestFailed { method: String, reason: String },

    /// Operation on a closed router.
    #[error("Router closed: {0}")]
    RouterClosed(String),

    /// Operation on a closed pipe transport.
    #[error("Pipe transport closed: {0}")]
    TransportClosed(String),

    /// The remote node rejected `connectPipeTransport`.
    #[error("Pipe transport connect failed: {0}")]
    ConnectFailed(String),

    /// The remote node rejected `createPipeProducer`, or its parameters were invalid.
    #[error("Pipe producer creation failed: {0}")]
    ProduceFailed(String),

    /// The remote node rejected `createPipeConsumer`.
    #[error("Pipe consumer creation failed: {0}")]
    ConsumeFailed(String),

    /// The peer lacks the permission required for the operation.
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    /// Unknown strategy name or otherwise unusable configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// No registered media node can host the room.
    #[error("No media node available")]
    NoMediaNodeAvailable,

    /// The room is locked and the peer cannot bypass the lock.
    #[error("Room locked: {0}")]
    RoomLocked(String),

    /// The room has been closed.
    #[error("Room closed: {0}")]
    RoomClosed(String),

    /// Underlying WebSocket transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RcError {
    /// Returns the signaling `ErrorCode` value for this error.
    #[must_use]
    pub fn error_code(&self) -> i32 {
        match self {
            RcError::NotAuthorized(_) | RcError::RoomLocked(_) => 3, // FORBIDDEN
            RcError::RoomClosed(_) | RcError::RouterClosed(_) | RcError::TransportClosed(_) => 4, // NOT_FOUND
            RcError::NoMediaNodeAvailable => 7, // CAPACITY_EXCEEDED
            RcError::ConnectionClosed
            | RcError::Timeout { .. }
            | RcError::RequestFailed { .. }
            | RcError::ConnectFailed(_)
            | RcError::ProduceFailed(_)
            | RcError::ConsumeFailed(_)
            | RcError::InvalidConfiguration(_)
            | RcError::Transport(_)
            | RcError::Serialization(_)
            | RcError::Internal(_) => 6, // INTERNAL_ERROR
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RcError::NotAuthorized(_) => "Not authorized".to_string(),
            RcError::RoomLocked(_) => "Room is locked".to_string(),
            RcError::RoomClosed(_) => "Room not found".to_string(),
            RcError::RouterClosed(_) | RcError::TransportClosed(_) => {
                "Media resource no longer exists".to_string()
            }
            RcError::NoMediaNodeAvailable => {
                "No media server available, please try again".to_string()
            }
            RcError::ConnectionClosed | RcError::Timeout { .. } => {
                "Media server unavailable, please try again".to_string()
            }
            RcError::RequestFailed { .. }
            | RcError::ConnectFailed(_)
            | RcError::ProduceFailed(_)
            | RcError::ConsumeFailed(_)
            | RcError::InvalidConfiguration(_)
            | RcError::Transport(_)
            | RcError::Serialization(_)
            | RcError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}

impl From<serde_json::Error> for RcError {
    fn from(err: serde_json::Error) -> Self {
        RcError::Serialization(err.to_string())
    }
}
