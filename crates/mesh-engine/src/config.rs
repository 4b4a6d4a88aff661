//! Engine configuration (spec §6).
//!
//! Deserializes the JSON/TOML configuration schema into a fully-defaulted
//! `MeshConfig`, following the `*ConfigInput` (all-optional) → resolved
//! config split this lineage uses elsewhere for layered configuration.

use serde::{Deserialize, Serialize};

use crate::aggregator::AggregationMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeDiscoveryConfig {
    pub port: u16,
    pub broadcast_interval_secs: u64,
    pub node_timeout_secs: u64,
}

impl Default for NodeDiscoveryConfig {
    fn default() -> Self {
        Self {
            port: mesh_common::protocol::DISCOVERY_PORT,
            broadcast_interval_secs: 5,
            node_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkAggregationConfig {
    pub mode: AggregationMode,
    pub max_queue_size: usize,
    pub rebalance_interval_secs: u64,
}

impl Default for LinkAggregationConfig {
    fn default() -> Self {
        Self {
            mode: AggregationMode::LoadBalance,
            max_queue_size: 1000,
            rebalance_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    pub threshold: u32,
    pub recovery_threshold: u32,
    pub monitoring_interval_secs: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            threshold: 3,
            recovery_threshold: 2,
            monitoring_interval_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterfacesConfig {
    pub primary: Option<String>,
    pub backups: Vec<String>,
}

/// Top-level engine configuration, matching the JSON schema in spec §6.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub node_discovery: NodeDiscoveryConfig,
    pub link_aggregation: LinkAggregationConfig,
    pub failover: FailoverConfig,
    pub interfaces: InterfacesConfig,
}

impl MeshConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_schema() {
        let cfg = MeshConfig::default();
        assert_eq!(cfg.node_discovery.port, 9999);
        assert_eq!(cfg.node_discovery.broadcast_interval_secs, 5);
        assert_eq!(cfg.node_discovery.node_timeout_secs, 60);
        assert_eq!(cfg.link_aggregation.max_queue_size, 1000);
        assert_eq!(cfg.failover.threshold, 3);
        assert_eq!(cfg.failover.recovery_threshold, 2);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = MeshConfig::from_json(r#"{"interfaces": {"primary": "eth0"}}"#).unwrap();
        assert_eq!(cfg.interfaces.primary.as_deref(), Some("eth0"));
        assert_eq!(cfg.failover.threshold, 3);
    }
}
