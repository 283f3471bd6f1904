//! Room Controller Library
//!
//! Control-plane core of a cascaded SFU cluster. The room controller keeps
//! one control connection per media node and drives routers, pipe transports
//! and pipe producers/consumers on those nodes on behalf of rooms.
//!
//! # Architecture
//!
//! ```text
//! Room ──(peer messages)──▶ Pipeline<PeerContext> ──▶ LockMiddleware
//!   │
//!   └─ routers ◀── MediaCluster ──▶ LoadBalancer (sticky, geo, least-loaded)
//!                     │
//!                     └─ MediaNode ─▶ MediaNodeConnection ─▶ Pipeline<InboundContext>
//! ```
//!
//! # Key Design Decisions
//!
//! - **Middleware pipelines**: inbound node traffic and peer messages are
//!   dispatched through ordered, short-circuiting middleware chains
//! - **Weak parent links**: routers, transports, producers and consumers
//!   refer to their owners weakly; owners hold the strong references
//! - **Bounded RPC**: every media node request is matched by id and bounded
//!   by the configured timeout
//!
//! # Modules
//!
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with appropriate error codes
//! - [`loadbalance`] - Media node placement strategies
//! - [`media`] - Media node connections and media objects
//! - [`middleware`] - Pipeline and room middlewares
//! - [`observability`] - Metrics and health endpoints
//! - [`room`] - Rooms, peers and permissions

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod errors;
pub mod loadbalance;
pub mod media;
pub mod middleware;
pub mod observability;
pub mod room;
