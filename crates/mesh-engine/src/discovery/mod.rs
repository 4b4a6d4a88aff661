//! Node Discovery (spec §4.C) — broadcasts `DISCOVERY_REQUEST`/
//! `NODE_ADVERTISEMENT` datagrams over the platform port and validates
//! whatever comes back.

use std::time::Duration;

use mesh_common::protocol::{validate_advertisement, DiscoveryMessage, NodeData};
use tracing::{debug, trace};

use crate::config::NodeDiscoveryConfig;
use crate::error::PlatformError;
use crate::net::PlatformPort;

/// How long [`NodeDiscovery::discover_once`] listens for advertisements
/// after broadcasting its request, per spec §4.C.
pub const LISTEN_WINDOW: Duration = Duration::from_secs(3);

fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Broadcasts discovery requests and advertisements, and validates inbound
/// datagrams into admissible peer records.
pub struct NodeDiscovery {
    config: NodeDiscoveryConfig,
}

impl NodeDiscovery {
    pub fn new(config: NodeDiscoveryConfig) -> Self {
        Self { config }
    }

    /// Broadcast a bare discovery request.
    pub async fn broadcast_request(
        &self,
        platform: &dyn PlatformPort,
        local_node_id: &str,
    ) -> Result<(), PlatformError> {
        let msg = DiscoveryMessage::request(local_node_id, unix_timestamp());
        let payload = msg.to_json().expect("DiscoveryMessage always serializes");
        trace!(node_id = local_node_id, "broadcasting discovery request");
        platform.broadcast_send(&payload, self.config.port).await
    }

    /// Broadcast this node's own advertisement, unconditionally (spec §4.C:
    /// advertisements are sent on every discovery tick, not only in
    /// response to a request).
    pub async fn broadcast_advertisement(
        &self,
        platform: &dyn PlatformPort,
        node_data: NodeData,
    ) -> Result<(), PlatformError> {
        let msg = DiscoveryMessage::advertisement(node_data, unix_timestamp());
        let payload = msg.to_json().expect("DiscoveryMessage always serializes");
        platform.broadcast_send(&payload, self.config.port).await
    }

    /// Listen for `window` and return every admissible peer advertisement
    /// received, silently dropping anything malformed, out-of-group, or
    /// that is this node's own broadcast.
    pub async fn listen(
        &self,
        platform: &dyn PlatformPort,
        local_node_id: &str,
        window: Duration,
    ) -> Result<Vec<NodeData>, PlatformError> {
        let raws = platform.broadcast_recv(self.config.port, window).await?;
        let peers: Vec<NodeData> = raws
            .iter()
            .filter_map(|raw| validate_advertisement(raw, local_node_id))
            .collect();
        debug!(received = raws.len(), admitted = peers.len(), "discovery listen window closed");
        Ok(peers)
    }

    /// One full discovery round: broadcast a request, then listen for
    /// [`LISTEN_WINDOW`] for whatever advertisements arrive.
    pub async fn discover_once(
        &self,
        platform: &dyn PlatformPort,
        local_node_id: &str,
    ) -> Result<Vec<NodeData>, PlatformError> {
        self.broadcast_request(platform, local_node_id).await?;
        self.listen(platform, local_node_id, LISTEN_WINDOW).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::MockPlatformPort;
    use mesh_common::models::NodeRecord;
    use uuid::Uuid;

    fn discovery() -> NodeDiscovery {
        NodeDiscovery::new(NodeDiscoveryConfig::default())
    }

    #[tokio::test]
    async fn listens_for_peer_advertisement_on_shared_bus() {
        let local = MockPlatformPort::new(vec![]);
        let peer = MockPlatformPort::new(vec![]).with_bus(local.bus());

        let peer_id = Uuid::new_v4();
        let mut peer_node = NodeRecord::new(peer_id, "10.0.0.9");
        peer_node.interfaces.push("eth0".to_string());
        let node_data = mesh_common::protocol::NodeData::from_node_record(&peer_node, 0.0);

        let nd = discovery();
        nd.broadcast_advertisement(&peer, node_data.clone()).await.unwrap();

        let received = nd
            .listen(&local, "local-node", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].node_id, peer_id.to_string());
    }

    #[tokio::test]
    async fn ignores_own_advertisement_on_shared_bus() {
        let local = MockPlatformPort::new(vec![]);
        let bus = local.bus();
        let same_bus_port = MockPlatformPort::new(vec![]).with_bus(bus);

        let local_id = Uuid::new_v4();
        let mut node = NodeRecord::new(local_id, "10.0.0.1");
        node.interfaces.push("eth0".to_string());
        let node_data = mesh_common::protocol::NodeData::from_node_record(&node, 0.0);

        let nd = discovery();
        nd.broadcast_advertisement(&same_bus_port, node_data).await.unwrap();

        let received = nd
            .listen(&local, &local_id.to_string(), Duration::from_millis(10))
            .await
            .unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn empty_bus_yields_no_peers() {
        let local = MockPlatformPort::new(vec![]);
        let nd = discovery();
        let received = nd
            .listen(&local, "local-node", Duration::from_millis(10))
            .await
            .unwrap();
        assert!(received.is_empty());
    }
}
