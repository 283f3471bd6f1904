//! Context flowing through a room's peer-message pipeline.

use crate::middleware::PipelineContext;
use crate::room::peer::Peer;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A client message addressed to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerMessage {
    pub method: String,
    #[serde(default)]
    pub data: Value,
}

impl PeerMessage {
    #[must_use]
    pub fn new(method: impl Into<String>, data: Value) -> Self {
        Self {
            method: method.into(),
            data,
        }
    }

    /// Target room session, when the message names one.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.data.get("sessionId").and_then(Value::as_str)
    }
}

#[derive(Debug)]
pub struct PeerContext {
    pub peer: Arc<Peer>,
    pub message: PeerMessage,
    /// Reply payload for the sender, if a handler produced one.
    pub response: Option<Value>,
    pub handled: bool,
}

impl PeerContext {
    #[must_use]
    pub fn new(peer: Arc<Peer>, message: PeerMessage) -> Self {
        Self {
            peer,
            message,
            response: None,
            handled: false,
        }
    }
}

impl PipelineContext for PeerContext {
    fn is_handled(&self) -> bool {
        self.handled
    }
}
