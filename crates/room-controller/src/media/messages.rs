//! Wire frames and typed payloads exchanged with media nodes.
//!
//! Every frame is a JSON text message tagged by `type`:
//!
//! ```json
//! {"type":"request","id":7,"method":"createPipeConsumer","data":{}}
//! {"type":"response","id":7,"data":{}}
//! {"type":"response","id":7,"error":"producer not found"}
//! {"type":"notification","method":"pipeTransportClosed","data":{}}
//! ```
//!
//! Payload field names are camelCase on the wire. RTP parameters and
//! capabilities are opaque to the controller and travel as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method names understood by media nodes.
pub mod methods {
    pub const GET_ROUTER: &str = "getRouter";
    pub const CLOSE_ROUTER: &str = "closeRouter";
    pub const CREATE_PIPE_TRANSPORT: &str = "createPipeTransport";
    pub const CONNECT_PIPE_TRANSPORT: &str = "connectPipeTransport";
    pub const CLOSE_PIPE_TRANSPORT: &str = "closePipeTransport";
    pub const CREATE_PIPE_PRODUCER: &str = "createPipeProducer";
    pub const CLOSE_PIPE_PRODUCER: &str = "closePipeProducer";
    pub const PAUSE_PIPE_PRODUCER: &str = "pausePipeProducer";
    pub const RESUME_PIPE_PRODUCER: &str = "resumePipeProducer";
    pub const CREATE_PIPE_CONSUMER: &str = "createPipeConsumer";
    pub const CLOSE_PIPE_CONSUMER: &str = "closePipeConsumer";

    // Node-initiated notifications.
    pub const ROUTER_CLOSED: &str = "routerClosed";
    pub const PIPE_TRANSPORT_CLOSED: &str = "pipeTransportClosed";
    pub const PIPE_PRODUCER_CLOSED: &str = "pipeProducerClosed";
    pub const PIPE_CONSUMER_CLOSED: &str = "pipeConsumerClosed";
    pub const PIPE_CONSUMER_PAUSED: &str = "pipeConsumerPaused";
    pub const PIPE_CONSUMER_RESUMED: &str = "pipeConsumerResumed";
    pub const LOAD: &str = "load";
}

/// A single frame on a media node connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeMessage {
    Request {
        id: u64,
        method: String,
        #[serde(default)]
        data: Value,
    },
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        data: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Notification {
        method: String,
        #[serde(default)]
        data: Value,
    },
}

impl NodeMessage {
    /// Successful response to request `id`.
    #[must_use]
    pub fn reply(id: u64, data: Value) -> Self {
        NodeMessage::Response {
            id,
            data,
            error: None,
        }
    }

    /// Error response to request `id`.
    #[must_use]
    pub fn reply_error(id: u64, error: impl Into<String>) -> Self {
        NodeMessage::Response {
            id,
            data: Value::Null,
            error: Some(error.into()),
        }
    }
}

/// Media kind of a producer or consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// SRTP keying for an encrypted pipe transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SrtpParameters {
    pub crypto_suite: String,
    pub key_base64: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRouterRequest {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterInfo {
    pub id: String,
    #[serde(default)]
    pub rtp_capabilities: Value,
}

/// Addresses a router (`closeRouter`, `routerClosed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterTarget {
    pub router_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePipeTransportRequest {
    pub router_id: String,
    pub internal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeTransportInfo {
    pub id: String,
    pub ip: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srtp_parameters: Option<SrtpParameters>,
}

/// Addresses a pipe transport (`closePipeTransport`, `pipeTransportClosed`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeTransportTarget {
    pub router_id: String,
    pub pipe_transport_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectPipeTransportRequest {
    pub router_id: String,
    pub pipe_transport_id: String,
    pub ip: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub srtp_parameters: Option<SrtpParameters>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePipeProducerRequest {
    pub router_id: String,
    pub pipe_transport_id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub paused: bool,
    pub rtp_parameters: Value,
}

/// Reply to `createPipeProducer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedPipeProducer {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePipeConsumerRequest {
    pub router_id: String,
    pub pipe_transport_id: String,
    pub producer_id: String,
}

/// Reply to `createPipeConsumer`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeConsumerInfo {
    pub id: String,
    pub kind: MediaKind,
    #[serde(default)]
    pub producer_paused: bool,
    #[serde(default)]
    pub rtp_parameters: Value,
}

/// Addresses a pipe producer (`closePipeProducer`, `pipeProducerClosed`, pause/resume).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeProducerTarget {
    pub router_id: String,
    pub pipe_transport_id: String,
    pub pipe_producer_id: String,
}

/// Addresses a pipe consumer (`closePipeConsumer`, `pipeConsumerClosed`, paused/resumed).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeConsumerTarget {
    pub router_id: String,
    pub pipe_transport_id: String,
    pub pipe_consumer_id: String,
}

/// Periodic load report pushed by a node, in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub load: f64,
}
