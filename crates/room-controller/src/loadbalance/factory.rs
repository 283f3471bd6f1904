//! Builds the configured placement strategies.

use crate::errors::RcError;
use crate::loadbalance::geo::{GeoStrategy, DEFAULT_MAX_DISTANCE_KM};
use crate::loadbalance::sticky::StickyStrategy;
use crate::loadbalance::strategy::{LbStrategy, LbStrategyKind};

use std::collections::HashMap;
use std::sync::Arc;

/// Validated set of strategy names.
#[derive(Debug, Clone)]
pub struct LbStrategyFactory {
    kinds: Vec<LbStrategyKind>,
    geo_max_distance_km: f64,
}

impl LbStrategyFactory {
    /// Validate `names` (`geo`, `sticky`; case-insensitive). Duplicates collapse.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` naming the first unknown strategy.
    pub fn new<S: AsRef<str>>(names: &[S]) -> Result<Self, RcError> {
        let mut kinds = Vec::with_capacity(names.len());
        for name in names {
            let kind: LbStrategyKind = name.as_ref().parse()?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }

        tracing::debug!(target: "rc.lb", strategies = ?kinds, "Load balancing strategies configured");
        Ok(Self {
            kinds,
            geo_max_distance_km: DEFAULT_MAX_DISTANCE_KM,
        })
    }

    /// Override the Geo distance threshold.
    #[must_use]
    pub fn with_geo_max_distance_km(mut self, km: f64) -> Self {
        self.geo_max_distance_km = km;
        self
    }

    /// Configured strategies, in configuration order.
    pub fn kinds(&self) -> &[LbStrategyKind] {
        &self.kinds
    }

    pub fn is_configured(&self, kind: LbStrategyKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Sticky is available whether or not it was configured.
    #[must_use]
    pub fn create_sticky_strategy(&self) -> StickyStrategy {
        StickyStrategy
    }

    /// Exactly the configured strategies, keyed by kind.
    #[must_use]
    pub fn create_strategies(&self) -> HashMap<LbStrategyKind, Arc<dyn LbStrategy>> {
        self.kinds
            .iter()
            .map(|kind| {
                let strategy: Arc<dyn LbStrategy> = match kind {
                    LbStrategyKind::Geo => Arc::new(GeoStrategy::new(self.geo_max_distance_km)),
                    LbStrategyKind::Sticky => Arc::new(self.create_sticky_strategy()),
                };
                (*kind, strategy)
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unknown_names() {
        let result = LbStrategyFactory::new(&["geo", "random"]);
        assert!(matches!(result, Err(RcError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_empty_configuration_yields_no_strategies() {
        let factory = LbStrategyFactory::new::<&str>(&[]).unwrap();
        assert!(factory.create_strategies().is_empty());
        assert_eq!(factory.create_sticky_strategy().kind(), LbStrategyKind::Sticky);
    }

    #[test]
    fn test_creates_exactly_configured_subset() {
        let factory = LbStrategyFactory::new(&["geo"]).unwrap();
        let strategies = factory.create_strategies();
        assert_eq!(strategies.len(), 1);
        assert_eq!(
            strategies.get(&LbStrategyKind::Geo).map(|s| s.kind()),
            Some(LbStrategyKind::Geo)
        );

        let factory = LbStrategyFactory::new(&["sticky", "GEO", "geo"]).unwrap();
        assert_eq!(
            factory.kinds(),
            &[LbStrategyKind::Sticky, LbStrategyKind::Geo]
        );
        assert_eq!(factory.create_strategies().len(), 2);
    }
}
