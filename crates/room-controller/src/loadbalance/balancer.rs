//! Composes placement strategies with a fixed precedence.
//!
//! 1. Sticky (always): keep the room where it already is.
//! 2. Geo, when configured.
//! 3. Least-loaded viable node, ties broken by id.

use crate::errors::RcError;
use crate::loadbalance::factory::LbStrategyFactory;
use crate::loadbalance::strategy::{LbStrategy, LbStrategyKind, PlacementContext};
use crate::media::MediaNode;
use crate::observability::metrics;

use std::sync::Arc;

/// Label used when no strategy produced a candidate.
pub const LEAST_LOADED: &str = "least_loaded";

/// A placement decision.
#[derive(Debug, Clone)]
pub struct Placement {
    pub node: Arc<MediaNode>,
    /// `sticky`, `geo` or `least_loaded`.
    pub strategy: &'static str,
}

#[derive(Debug)]
pub struct LoadBalancer {
    strategies: Vec<Arc<dyn LbStrategy>>,
}

impl LoadBalancer {
    #[must_use]
    pub fn new(factory: &LbStrategyFactory) -> Self {
        let mut strategies: Vec<Arc<dyn LbStrategy>> =
            vec![Arc::new(factory.create_sticky_strategy())];
        let mut configured = factory.create_strategies();
        if let Some(geo) = configured.remove(&LbStrategyKind::Geo) {
            strategies.push(geo);
        }
        Self { strategies }
    }

    /// Strategy kinds in the order they are tried.
    pub fn precedence(&self) -> Vec<LbStrategyKind> {
        self.strategies.iter().map(|s| s.kind()).collect()
    }

    /// Choose a node for a room.
    ///
    /// # Errors
    ///
    /// `NoMediaNodeAvailable` if no node is viable.
    pub fn select(
        &self,
        nodes: &[Arc<MediaNode>],
        context: &PlacementContext,
    ) -> Result<Placement, RcError> {
        for strategy in &self.strategies {
            if let Some(node) = strategy.select(nodes, context) {
                return Ok(placed(node, strategy.kind().as_str()));
            }
        }

        nodes
            .iter()
            .filter(|node| node.is_viable())
            .min_by(|a, b| a.load().total_cmp(&b.load()).then_with(|| a.id().cmp(b.id())))
            .map(|node| placed(Arc::clone(node), LEAST_LOADED))
            .ok_or_else(|| {
                tracing::warn!(target: "rc.lb", nodes = nodes.len(), "No viable media node");
                RcError::NoMediaNodeAvailable
            })
    }
}

fn placed(node: Arc<MediaNode>, strategy: &'static str) -> Placement {
    tracing::debug!(target: "rc.lb", node_id = %node.id(), strategy, "Media node selected");
    metrics::record_room_placement(strategy);
    Placement { node, strategy }
}
