//! WebSocket transport to media nodes.
//!
//! Dials the node's control socket, authenticates with the shared secret as a
//! bearer token, and pumps JSON text frames between the socket and a
//! [`NodeChannel`]. Two tasks per connection: a writer draining the
//! controller's outbound queue into the socket sink, and a reader decoding
//! socket frames into the inbound queue. The reader dropping its sender is how
//! the connection learns the transport is gone. Either task exiting stops the
//! other.

use crate::errors::RcError;
use crate::media::channel::{NodeChannel, NodeConnector, NodeEndpoint, RemoteChannel};
use crate::media::messages::NodeMessage;

use async_trait::async_trait;
use common::secret::ExposeSecret;
use common::types::MediaNodeId;
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::fmt::Display;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Production [`NodeConnector`] over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    buffer: usize,
}

impl WebSocketConnector {
    #[must_use]
    pub fn new(buffer: usize) -> Self {
        Self { buffer }
    }
}

impl Default for WebSocketConnector {
    fn default() -> Self {
        Self::new(crate::media::channel::DEFAULT_CHANNEL_BUFFER)
    }
}

#[async_trait]
impl NodeConnector for WebSocketConnector {
    #[instrument(skip_all, name = "rc.media.ws.connect", fields(node_id = %endpoint.id, hostname = %endpoint.hostname))]
    async fn connect(&self, endpoint: &NodeEndpoint) -> Result<NodeChannel, RcError> {
        let mut request = endpoint
            .url()
            .into_client_request()
            .map_err(|e| RcError::Transport(e.to_string()))?;
        let authorization =
            HeaderValue::from_str(&format!("Bearer {}", endpoint.secret.expose_secret()))
                .map_err(|_| {
                    RcError::InvalidConfiguration(format!(
                        "secret for media node {} is not a valid header value",
                        endpoint.id
                    ))
                })?;
        request.headers_mut().insert(AUTHORIZATION, authorization);

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| RcError::Transport(e.to_string()))?;
        let (sink, source) = stream.split();
        let (channel, remote) = NodeChannel::pair(self.buffer);
        spawn_pumps(endpoint.id.clone(), sink, source, remote);

        tracing::info!(target: "rc.media.ws", node_id = %endpoint.id, "Connected to media node");
        Ok(channel)
    }
}

/// Pump frames between a socket and the node side of a [`NodeChannel`].
fn spawn_pumps<W, R, E>(node_id: MediaNodeId, mut sink: W, mut source: R, remote: RemoteChannel)
where
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: Display,
    R: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send,
{
    let RemoteChannel {
        inbound: mut from_controller,
        outbound: to_controller,
    } = remote;
    let cancel_token = CancellationToken::new();

    let writer_token = cancel_token.clone();
    let writer_node_id = node_id.clone();
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                () = writer_token.cancelled() => break,
                frame = from_controller.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(target: "rc.media.ws", node_id = %writer_node_id, error = %e, "Dropping unencodable frame");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                tracing::warn!(target: "rc.media.ws", node_id = %writer_node_id, error = %e, "WebSocket write failed");
                break;
            }
        }
        writer_token.cancel();
        let _ = sink.close().await;
        tracing::debug!(target: "rc.media.ws", node_id = %writer_node_id, "WebSocket writer exiting");
    });

    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                () = cancel_token.cancelled() => break,
                message = source.next() => match message {
                    Some(message) => message,
                    None => break,
                },
            };
            match message {
                Ok(Message::Text(text)) => match serde_json::from_str::<NodeMessage>(&text) {
                    Ok(frame) => {
                        if to_controller.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(target: "rc.media.ws", node_id = %node_id, error = %e, "Ignoring malformed frame");
                    }
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(target: "rc.media.ws", node_id = %node_id, error = %e, "WebSocket read failed");
                    break;
                }
            }
        }
        cancel_token.cancel();
        tracing::debug!(target: "rc.media.ws", node_id = %node_id, "WebSocket reader exiting");
    });
}
