//! Sticky placement: keep a room on the nodes it already uses.

use crate::loadbalance::strategy::{LbStrategy, LbStrategyKind, PlacementContext};
use crate::media::MediaNode;

use std::sync::Arc;

/// Returns the room's current nodes that are still registered and viable,
/// in assignment order.
#[derive(Debug, Clone, Default)]
pub struct StickyStrategy;

impl LbStrategy for StickyStrategy {
    fn kind(&self) -> LbStrategyKind {
        LbStrategyKind::Sticky
    }

    fn candidates(
        &self,
        nodes: &[Arc<MediaNode>],
        context: &PlacementContext,
    ) -> Vec<Arc<MediaNode>> {
        context
            .current_nodes
            .iter()
            .filter_map(|id| nodes.iter().find(|node| node.id() == id))
            .filter(|node| node.is_viable())
            .cloned()
            .collect()
    }
}
