//! Geographic placement: nearest lightly loaded node.

use crate::loadbalance::strategy::{LbStrategy, LbStrategyKind, PlacementContext};
use crate::media::MediaNode;

use std::sync::Arc;

/// Nodes farther than this from the client are not candidates.
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 2000.0;

/// Orders viable nodes within `max_distance_km` of the client by
/// `distance_km * (1 + load)`, ties broken by node id.
///
/// Nodes without a configured location are never candidates, and nothing is
/// returned when the client position is unknown.
#[derive(Debug, Clone)]
pub struct GeoStrategy {
    max_distance_km: f64,
}

impl Default for GeoStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DISTANCE_KM)
    }
}

impl GeoStrategy {
    #[must_use]
    pub fn new(max_distance_km: f64) -> Self {
        Self { max_distance_km }
    }

    pub fn max_distance_km(&self) -> f64 {
        self.max_distance_km
    }
}

impl LbStrategy for GeoStrategy {
    fn kind(&self) -> LbStrategyKind {
        LbStrategyKind::Geo
    }

    fn candidates(
        &self,
        nodes: &[Arc<MediaNode>],
        context: &PlacementContext,
    ) -> Vec<Arc<MediaNode>> {
        let Some(client) = context.client_location else {
            return Vec::new();
        };

        let mut scored: Vec<(f64, Arc<MediaNode>)> = nodes
            .iter()
            .filter(|node| node.is_viable())
            .filter_map(|node| {
                let distance = node.location()?.distance_km(&client);
                (distance <= self.max_distance_km)
                    .then(|| (distance * (1.0 + node.load()), Arc::clone(node)))
            })
            .collect();

        scored.sort_by(|(cost_a, a), (cost_b, b)| {
            cost_a.total_cmp(cost_b).then_with(|| a.id().cmp(b.id()))
        });
        scored.into_iter().map(|(_, node)| node).collect()
    }
}
