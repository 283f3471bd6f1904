//! # RC Test Utilities
//!
//! Shared test utilities for the room controller.
//!
//! ## Modules
//!
//! - `mock_node` - Scripted in-memory media node and connector
//! - `fixtures` - Pre-configured test data (peers, media nodes, RTP parameters)
//! - `wait` - Polling helpers for asynchronous effects
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let (node, mock) = TestMediaNode::new("mn-1").build_mocked();
//!     let router = node.get_router(&RoomId::new("room-1")).await.unwrap();
//!
//!     assert_eq!(mock.requests_for("getRouter").len(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_node;
pub mod wait;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_node::*;
pub use wait::*;
