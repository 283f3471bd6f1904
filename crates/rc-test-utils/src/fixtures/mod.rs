//! Pre-configured test data fixtures for room controller testing.
//!
//! Provides builders and test data for:
//! - Peers with various roles
//! - Media nodes with locations and timeouts
//! - RTP parameters for pipe producers

use crate::mock_node::{MockConnector, MockMediaNode};

use common::secret::SecretString;
use common::types::{GeoPosition, MediaNodeId, PeerId};
use room_controller::media::{MediaNode, MediaNodeOptions, NodeConnector};
use room_controller::room::{Peer, PeerNotification, Role};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Test peer fixture.
#[derive(Debug, Clone)]
pub struct TestPeer {
    /// Peer ID.
    pub id: String,
    /// Roles granted on creation.
    pub roles: Vec<Role>,
}

impl TestPeer {
    /// Create a test peer with the `Normal` role.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: vec![Role::Normal],
        }
    }

    /// Create a test peer with a random ID.
    #[must_use]
    pub fn random() -> Self {
        Self::new(format!("peer-{}", Uuid::new_v4()))
    }

    /// Add a role.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Replace all roles.
    #[must_use]
    pub fn with_roles(mut self, roles: &[Role]) -> Self {
        self.roles = roles.to_vec();
        self
    }

    /// Build the peer and the receiver for its notifications.
    #[must_use]
    pub fn build(self) -> (Arc<Peer>, mpsc::Receiver<PeerNotification>) {
        Peer::new(PeerId::new(self.id), self.roles)
    }
}

/// Test media node fixture.
#[derive(Debug, Clone)]
pub struct TestMediaNode {
    /// Node ID.
    pub id: String,
    /// Location, if any.
    pub location: Option<GeoPosition>,
    /// RPC timeout.
    pub request_timeout: Duration,
    /// Initial load.
    pub load: f64,
}

impl TestMediaNode {
    /// Create a test node with no location and a 500 ms timeout.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location: None,
            request_timeout: Duration::from_millis(500),
            load: 0.0,
        }
    }

    /// Set the location.
    #[must_use]
    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.location = Some(GeoPosition::new(latitude, longitude));
        self
    }

    /// Set the RPC timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the initial load.
    #[must_use]
    pub fn with_load(mut self, load: f64) -> Self {
        self.load = load;
        self
    }

    /// Node options pointing at a fake endpoint.
    #[must_use]
    pub fn options(&self) -> MediaNodeOptions {
        MediaNodeOptions {
            id: MediaNodeId::new(self.id.clone()),
            hostname: format!("{}.test", self.id),
            port: 4443,
            secret: SecretString::from("test-node-secret"),
            tls: false,
            location: self.location,
            request_timeout: self.request_timeout,
        }
    }

    /// Build the controller-side node with `connector`.
    #[must_use]
    pub fn build(&self, connector: Arc<dyn NodeConnector>) -> Arc<MediaNode> {
        let node = MediaNode::new(self.options(), connector);
        node.set_load(self.load);
        node
    }

    /// Build the controller-side node backed by a default mock node.
    #[must_use]
    pub fn build_mocked(&self) -> (Arc<MediaNode>, Arc<MockMediaNode>) {
        let mock = Arc::new(MockMediaNode::new(self.id.clone()).with_default_handlers());
        let connector = Arc::new(MockConnector::new().with_node(Arc::clone(&mock)));
        (self.build(connector), mock)
    }
}

/// RTP parameters shaped like a media node's.
#[must_use]
pub fn test_rtp_parameters() -> Value {
    json!({
        "codecs": [{
            "mimeType": "video/VP8",
            "payloadType": 101,
            "clockRate": 90000,
            "parameters": {},
            "rtcpFeedback": [{ "type": "nack" }, { "type": "ccm", "parameter": "fir" }]
        }],
        "headerExtensions": [],
        "encodings": [{ "ssrc": 22_222_222 }],
        "rtcp": { "cname": "test-cname", "reducedSize": true }
    })
}
