//! Observability for the Room Controller.
//!
//! # Metrics
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `rc_rpc_requests_total` | counter | `method`, `status` |
//! | `rc_rpc_request_duration_seconds` | histogram | `method` |
//! | `rc_media_node_connections_active` | gauge | - |
//! | `rc_media_nodes_registered` | gauge | - |
//! | `rc_pipe_transports_active` | gauge | - |
//! | `rc_peer_messages_total` | counter | `outcome` |
//! | `rc_room_placements_total` | counter | `strategy` |
//!
//! Logging uses `tracing` with one target per subsystem (`rc.media.*`,
//! `rc.room`, `rc.lb`, `rc.cluster`).

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
