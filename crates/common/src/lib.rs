//! Common utilities and types shared across the room controller workspace.

#![warn(clippy::pedantic)]

/// Identifiers and geographic types
pub mod types;

/// Environment-driven configuration helpers
pub mod config;

/// Secret types that prevent accidental logging
pub mod secret;
