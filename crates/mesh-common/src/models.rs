//! Data models for the mesh bonding engine.
//!
//! These types are shared between the engine (which owns and mutates them)
//! and any external observer — the operator CLI, an exported metrics report,
//! or a future remote status API — that only ever reads a snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Interface ───────────────────────────────────────────────────────

/// Coarse classification of a network interface, derived from its OS name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Wired,
    Wireless,
    Cellular,
    Unknown,
}

/// Point-in-time throughput/latency reading for one interface.
///
/// `bandwidth_mbps` is a single symmetric scalar — the engine does not
/// distinguish upstream from downstream capacity, even though individual
/// measurement sources could in principle report each direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualitySnapshot {
    pub bandwidth_mbps: f64,
    pub latency_ms: f64,
    pub jitter_ms: f64,
    pub loss_pct: f64,
    pub last_measured_at: DateTime<Utc>,
}

impl Default for QualitySnapshot {
    fn default() -> Self {
        Self {
            bandwidth_mbps: 0.0,
            latency_ms: 0.0,
            jitter_ms: 0.0,
            loss_pct: 0.0,
            last_measured_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Cumulative traffic/usage accounting for one interface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceAccounting {
    pub data_used_mb: f64,
    /// 0 means unlimited.
    pub data_cap_mb: f64,
    pub packets_sent: u64,
    pub bytes_sent: u64,
}

/// Failover-relevant health counters for one interface.
///
/// `consecutive_failures` and `consecutive_successes` are mutually
/// exclusive by construction: every health-check outcome resets the other
/// to zero (see [`Self::record_success`]/[`Self::record_failure`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterfaceHealth {
    pub active: bool,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl InterfaceHealth {
    pub fn record_success(&mut self) {
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }
}

/// A local network interface and everything the engine knows about it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceRecord {
    pub name: String,
    pub kind: InterfaceKind,
    pub up: bool,
    pub address: Option<String>,
    pub hw_address: Option<String>,
    pub signal_strength: Option<i32>,
    pub quality: QualitySnapshot,
    pub accounting: InterfaceAccounting,
    pub health: InterfaceHealth,
}

impl InterfaceRecord {
    pub fn new(name: impl Into<String>, kind: InterfaceKind, up: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            up,
            address: None,
            hw_address: None,
            signal_strength: None,
            quality: QualitySnapshot::default(),
            accounting: InterfaceAccounting::default(),
            health: InterfaceHealth {
                active: up,
                ..Default::default()
            },
        }
    }
}

// ── Node ────────────────────────────────────────────────────────────

/// A host participating in the mesh — the local node, or a discovered peer.
///
/// `last_seen` carries a dual meaning depending on ownership: for the local
/// node it is the timestamp of the last monitoring refresh (`updated_at` in
/// spec terms); for a peer it is the timestamp of the last discovery
/// reception, and drives TTL eviction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    pub node_id: Uuid,
    pub address: String,
    pub interfaces: Vec<String>,
    pub bandwidth: HashMap<String, f64>,
    pub latency: HashMap<String, f64>,
    pub data_cap_remaining: HashMap<String, f64>,
    pub last_seen: DateTime<Utc>,
}

impl NodeRecord {
    pub fn new(node_id: Uuid, address: impl Into<String>) -> Self {
        Self {
            node_id,
            address: address.into(),
            interfaces: Vec::new(),
            bandwidth: HashMap::new(),
            latency: HashMap::new(),
            data_cap_remaining: HashMap::new(),
            last_seen: Utc::now(),
        }
    }

    /// Whether this record's `last_seen` is older than `ttl`, as measured
    /// against `now`. Used by peer-table eviction; never applied to the
    /// local node.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.last_seen) > ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_counters_are_mutually_exclusive() {
        let mut h = InterfaceHealth::default();
        h.record_failure();
        h.record_failure();
        assert_eq!(h.consecutive_failures, 2);
        assert_eq!(h.consecutive_successes, 0);

        h.record_success();
        assert_eq!(h.consecutive_failures, 0);
        assert_eq!(h.consecutive_successes, 1);
    }

    #[test]
    fn staleness_respects_ttl() {
        let node = NodeRecord::new(Uuid::nil(), "10.0.0.1");
        let now = node.last_seen + chrono::Duration::seconds(61);
        assert!(node.is_stale(now, chrono::Duration::seconds(60)));
        let now = node.last_seen + chrono::Duration::seconds(30);
        assert!(!node.is_stale(now, chrono::Duration::seconds(60)));
    }
}
