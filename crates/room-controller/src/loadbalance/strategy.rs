//! Strategy trait shared by all placement policies.

use crate::errors::RcError;
use crate::media::MediaNode;

use common::types::{GeoPosition, MediaNodeId};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Names accepted in `RC_LB_STRATEGIES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LbStrategyKind {
    Geo,
    Sticky,
}

impl LbStrategyKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LbStrategyKind::Geo => "geo",
            LbStrategyKind::Sticky => "sticky",
        }
    }
}

impl fmt::Display for LbStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LbStrategyKind {
    type Err = RcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "geo" => Ok(LbStrategyKind::Geo),
            "sticky" => Ok(LbStrategyKind::Sticky),
            _ => Err(RcError::InvalidConfiguration(format!(
                "Invalid load balancing strategy: {s}"
            ))),
        }
    }
}

/// What a strategy knows about the room being placed.
#[derive(Debug, Clone, Default)]
pub struct PlacementContext {
    /// Position of the joining client, if known.
    pub client_location: Option<GeoPosition>,
    /// Nodes already hosting the room, in assignment order.
    pub current_nodes: Vec<MediaNodeId>,
}

/// A placement policy.
pub trait LbStrategy: Send + Sync + fmt::Debug {
    fn kind(&self) -> LbStrategyKind;

    /// Nodes suitable for the room, best first. May be empty.
    fn candidates(
        &self,
        nodes: &[Arc<MediaNode>],
        context: &PlacementContext,
    ) -> Vec<Arc<MediaNode>>;

    /// The best candidate.
    fn select(
        &self,
        nodes: &[Arc<MediaNode>],
        context: &PlacementContext,
    ) -> Option<Arc<MediaNode>> {
        self.candidates(nodes, context).into_iter().next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_names() {
        assert_eq!("geo".parse::<LbStrategyKind>().ok(), Some(LbStrategyKind::Geo));
        assert_eq!(
            " Sticky ".parse::<LbStrategyKind>().ok(),
            Some(LbStrategyKind::Sticky)
        );
    }

    #[test]
    fn test_parse_unknown_name_is_invalid_configuration() {
        let err = "round-robin".parse::<LbStrategyKind>();
        assert!(matches!(err, Err(RcError::InvalidConfiguration(msg)) if msg.contains("round-robin")));
    }
}
