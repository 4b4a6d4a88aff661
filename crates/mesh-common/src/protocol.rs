//! The UDP discovery wire format.
//!
//! Every discovery datagram is a UTF-8 JSON object carrying a top-level
//! `type` tag, broadcast to [`DISCOVERY_PORT`]. Datagrams outside
//! [`MESH_GROUP`] are ignored by the receiver (see [`validate_advertisement`]).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::NodeRecord;

/// UDP port used for discovery broadcast.
pub const DISCOVERY_PORT: u16 = 9999;

/// Namespace selector carried in every discovery datagram.
pub const MESH_GROUP: &str = "MESH_NETWORK_GROUP";

/// The five fields a [`NodeData`] payload must carry to be admissible.
const REQUIRED_FIELDS: [&str; 5] = ["node_id", "ip_address", "connections", "bandwidth", "latency"];

/// The node-scoped payload carried inside a [`DiscoveryMessage::NodeAdvertisement`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub node_id: String,
    pub ip_address: String,
    pub connections: Vec<String>,
    pub bandwidth: HashMap<String, f64>,
    pub latency: HashMap<String, f64>,
    #[serde(default)]
    pub data_caps: HashMap<String, f64>,
    pub timestamp: f64,
}

impl NodeData {
    /// Build the advertisement payload for a local node record.
    pub fn from_node_record(node: &NodeRecord, timestamp: f64) -> Self {
        Self {
            node_id: node.node_id.to_string(),
            ip_address: node.address.clone(),
            connections: node.interfaces.clone(),
            bandwidth: node.bandwidth.clone(),
            latency: node.latency.clone(),
            data_caps: node.data_cap_remaining.clone(),
            timestamp,
        }
    }
}

/// A discovery datagram, tagged by its `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DiscoveryMessage {
    #[serde(rename = "DISCOVERY_REQUEST")]
    DiscoveryRequest {
        node_id: String,
        group: String,
        timestamp: f64,
    },
    #[serde(rename = "NODE_ADVERTISEMENT")]
    NodeAdvertisement {
        node_data: NodeData,
        group: String,
        timestamp: f64,
    },
}

impl DiscoveryMessage {
    pub fn request(node_id: &str, timestamp: f64) -> Self {
        DiscoveryMessage::DiscoveryRequest {
            node_id: node_id.to_string(),
            group: MESH_GROUP.to_string(),
            timestamp,
        }
    }

    pub fn advertisement(node_data: NodeData, timestamp: f64) -> Self {
        DiscoveryMessage::NodeAdvertisement {
            node_data,
            group: MESH_GROUP.to_string(),
            timestamp,
        }
    }

    pub fn group(&self) -> &str {
        match self {
            DiscoveryMessage::DiscoveryRequest { group, .. } => group,
            DiscoveryMessage::NodeAdvertisement { group, .. } => group,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Validate a raw received payload and extract an admissible peer
/// advertisement, or `None` if the payload is malformed, out-of-group, or
/// is the local node's own broadcast.
///
/// Admissibility, per spec: decodes as a JSON object carrying a
/// `NODE_ADVERTISEMENT` envelope in [`MESH_GROUP`]; the inner `node_data`
/// has all five [`REQUIRED_FIELDS`] with matching types; and its `node_id`
/// differs from `local_node_id`.
pub fn validate_advertisement(raw: &[u8], local_node_id: &str) -> Option<NodeData> {
    let value: Value = serde_json::from_slice(raw).ok()?;
    if !value.is_object() {
        return None;
    }
    if value.get("type")?.as_str()? != "NODE_ADVERTISEMENT" {
        return None;
    }
    if value.get("group")?.as_str()? != MESH_GROUP {
        return None;
    }

    let node_data = value.get("node_data")?;
    if !node_data.is_object() {
        return None;
    }
    for field in REQUIRED_FIELDS {
        if node_data.get(field).is_none() {
            return None;
        }
    }

    let data: NodeData = serde_json::from_value(node_data.clone()).ok()?;
    if data.node_id == local_node_id {
        return None;
    }

    Some(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_node() -> NodeRecord {
        let mut node = NodeRecord::new(Uuid::nil(), "10.0.0.5");
        node.interfaces = vec!["eth0".into(), "wlan0".into()];
        node.bandwidth.insert("eth0".into(), 100.0);
        node.latency.insert("eth0".into(), 10.0);
        node
    }

    #[test]
    fn round_trip_preserves_required_fields() {
        let node = sample_node();
        let data = NodeData::from_node_record(&node, Utc::now().timestamp() as f64);
        let msg = DiscoveryMessage::advertisement(data.clone(), 0.0);
        let bytes = msg.to_json().unwrap();

        let other_id = Uuid::new_v4().to_string();
        let recovered = validate_advertisement(&bytes, &other_id).unwrap();

        assert_eq!(recovered.node_id, data.node_id);
        assert_eq!(recovered.ip_address, data.ip_address);
        assert_eq!(recovered.connections, data.connections);
        assert_eq!(recovered.bandwidth, data.bandwidth);
        assert_eq!(recovered.latency, data.latency);
    }

    #[test]
    fn rejects_own_advertisement() {
        let node = sample_node();
        let data = NodeData::from_node_record(&node, 0.0);
        let own_id = data.node_id.clone();
        let msg = DiscoveryMessage::advertisement(data, 0.0);
        let bytes = msg.to_json().unwrap();

        assert!(validate_advertisement(&bytes, &own_id).is_none());
    }

    #[test]
    fn rejects_wrong_group() {
        let raw = serde_json::json!({
            "type": "NODE_ADVERTISEMENT",
            "group": "SOMETHING_ELSE",
            "node_data": {
                "node_id": "peer-1",
                "ip_address": "10.0.0.9",
                "connections": [],
                "bandwidth": {},
                "latency": {},
                "timestamp": 0.0,
            },
            "timestamp": 0.0,
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        assert!(validate_advertisement(&bytes, "local").is_none());
    }

    #[test]
    fn rejects_missing_field() {
        let raw = serde_json::json!({
            "type": "NODE_ADVERTISEMENT",
            "group": MESH_GROUP,
            "node_data": {
                "node_id": "peer-1",
                "ip_address": "10.0.0.9",
                "connections": [],
                "bandwidth": {},
                // latency missing
            },
            "timestamp": 0.0,
        });
        let bytes = serde_json::to_vec(&raw).unwrap();
        assert!(validate_advertisement(&bytes, "local").is_none());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(validate_advertisement(b"not json", "local").is_none());
    }

    #[test]
    fn discovery_request_is_not_an_advertisement() {
        let msg = DiscoveryMessage::request("peer-1", 0.0);
        let bytes = msg.to_json().unwrap();
        assert!(validate_advertisement(&bytes, "local").is_none());
    }
}
