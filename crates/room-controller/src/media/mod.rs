//! Media node control: connections, routers, pipe transports and their
//! producers and consumers.
//!
//! # Object graph
//!
//! ```text
//! MediaCluster ─▶ MediaNode ─▶ MediaNodeConnection
//!                     │              ▲
//!                     ▼              │ (inbound pipeline)
//!                  Router ─▶ PipeTransport ─▶ PipeProducer / PipeConsumer
//! ```
//!
//! Children hold weak references to their parents. Remote close events are
//! delivered through the connection's inbound pipeline.

pub mod channel;
pub mod cluster;
pub mod connection;
pub mod messages;
pub mod node;
pub mod pipe_consumer;
pub mod pipe_producer;
pub mod pipe_transport;
pub mod router;
pub mod websocket;

pub use channel::{NodeChannel, NodeConnector, NodeEndpoint, RemoteChannel, DEFAULT_CHANNEL_BUFFER};
pub use cluster::MediaCluster;
pub use connection::{
    ConnectionEvent, ConnectionState, InboundContext, InboundKind, MediaNodeConnection,
    DEFAULT_REQUEST_TIMEOUT,
};
pub use messages::{MediaKind, NodeMessage, SrtpParameters};
pub use node::{MediaNode, MediaNodeOptions, OVERLOAD_THRESHOLD};
pub use pipe_consumer::PipeConsumer;
pub use pipe_producer::PipeProducer;
pub use pipe_transport::{PipeConnectParams, PipeProduceParams, PipeTransport};
pub use router::{PipeToRouterResult, Router, RouterOptions};
pub use websocket::WebSocketConnector;
