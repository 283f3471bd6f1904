//! Media node placement.
//!
//! [`LbStrategyFactory`] validates the configured strategy names and builds
//! the strategies; [`LoadBalancer`] applies them in precedence order.

pub mod balancer;
pub mod factory;
pub mod geo;
pub mod sticky;
pub mod strategy;

pub use balancer::{LoadBalancer, Placement, LEAST_LOADED};
pub use factory::LbStrategyFactory;
pub use geo::GeoStrategy;
pub use sticky::StickyStrategy;
pub use strategy::{LbStrategy, LbStrategyKind, PlacementContext};
