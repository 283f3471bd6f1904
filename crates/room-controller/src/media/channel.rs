//! Frame channels between a [`MediaNodeConnection`] and its transport.
//!
//! A connection never touches a socket directly. It is attached to a
//! [`NodeChannel`]: frames it sends go out on `outbound`, frames from the node
//! arrive on `inbound`. When `inbound` ends the transport is gone.
//!
//! [`NodeConnector`] produces channels for a [`NodeEndpoint`]. The production
//! implementation is [`WebSocketConnector`](super::websocket::WebSocketConnector);
//! tests use [`NodeChannel::pair`].
//!
//! [`MediaNodeConnection`]: super::connection::MediaNodeConnection

use crate::errors::RcError;
use crate::media::messages::NodeMessage;

use async_trait::async_trait;
use common::secret::SecretString;
use common::types::MediaNodeId;
use tokio::sync::mpsc;

/// Default frame buffer per direction.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Controller side of a node transport.
#[derive(Debug)]
pub struct NodeChannel {
    /// Frames from the controller to the node.
    pub outbound: mpsc::Sender<NodeMessage>,
    /// Frames from the node to the controller.
    pub inbound: mpsc::Receiver<NodeMessage>,
}

/// Node side of an in-memory [`NodeChannel`].
#[derive(Debug)]
pub struct RemoteChannel {
    /// Frames sent by the controller.
    pub inbound: mpsc::Receiver<NodeMessage>,
    /// Frames delivered to the controller. Dropping this ends the transport.
    pub outbound: mpsc::Sender<NodeMessage>,
}

impl NodeChannel {
    /// Build a connected in-memory pair.
    #[must_use]
    pub fn pair(buffer: usize) -> (NodeChannel, RemoteChannel) {
        let (to_node, from_controller) = mpsc::channel(buffer);
        let (to_controller, from_node) = mpsc::channel(buffer);
        (
            NodeChannel {
                outbound: to_node,
                inbound: from_node,
            },
            RemoteChannel {
                inbound: from_controller,
                outbound: to_controller,
            },
        )
    }
}

/// Where and how to reach a media node.
#[derive(Debug, Clone)]
pub struct NodeEndpoint {
    pub id: MediaNodeId,
    pub hostname: String,
    pub port: u16,
    pub secret: SecretString,
    pub tls: bool,
}

impl NodeEndpoint {
    /// WebSocket URL of the node's control socket.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.hostname, self.port)
    }
}

/// Opens transports to media nodes.
#[async_trait]
pub trait NodeConnector: Send + Sync {
    /// Establish a transport to `endpoint`.
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<NodeChannel, RcError>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_endpoint_url_scheme() {
        let mut endpoint = NodeEndpoint {
            id: MediaNodeId::new("mn-1"),
            hostname: "mn1.example.com".to_string(),
            port: 3000,
            secret: SecretString::from("secret"),
            tls: true,
        };
        assert_eq!(endpoint.url(), "wss://mn1.example.com:3000");

        endpoint.tls = false;
        assert_eq!(endpoint.url(), "ws://mn1.example.com:3000");
    }

    #[test]
    fn test_endpoint_debug_redacts_secret() {
        let endpoint = NodeEndpoint {
            id: MediaNodeId::new("mn-1"),
            hostname: "mn1.example.com".to_string(),
            port: 3000,
            secret: SecretString::from("super-secret"),
            tls: true,
        };
        assert!(!format!("{endpoint:?}").contains("super-secret"));
    }

    #[tokio::test]
    async fn test_pair_delivers_both_directions() {
        let (mut node_channel, mut remote) = NodeChannel::pair(4);

        let frame = NodeMessage::Notification {
            method: "ping".to_string(),
            data: Value::Null,
        };
        node_channel.outbound.send(frame.clone()).await.unwrap();
        assert_eq!(remote.inbound.recv().await, Some(frame.clone()));

        remote.outbound.send(frame.clone()).await.unwrap();
        assert_eq!(node_channel.inbound.recv().await, Some(frame));

        drop(remote);
        assert_eq!(node_channel.inbound.recv().await, None);
    }
}
