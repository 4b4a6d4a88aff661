//! Link Aggregator (spec §4.D) — per-interface weights, mode selection,
//! and bounded send queues.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LinkAggregationConfig;
use crate::error::AggregatorError;

/// Aggregation strategy. `Adaptive` is only ever entered via explicit
/// configuration; otherwise the aggregator picks between the other two
/// based on the active-interface count (see [`LinkAggregator::effective_mode`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    LoadBalance,
    Failover,
    Adaptive,
}

/// The live quality snapshot the aggregator reads for one interface, as
/// seen from the local node record.
#[derive(Debug, Clone)]
pub struct InterfaceSnapshot {
    pub name: String,
    pub active: bool,
    pub bandwidth_mbps: f64,
    pub latency_ms: f64,
}

/// Per-interface traffic counters updated on successful enqueue.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterfaceTraffic {
    pub packets_sent: u64,
    pub bytes_sent: u64,
}

/// Distributes outbound packets across interfaces per the configured or
/// auto-selected aggregation mode.
pub struct LinkAggregator {
    config: LinkAggregationConfig,
    snapshots: Vec<InterfaceSnapshot>,
    weights: HashMap<String, f64>,
    mode: AggregationMode,
    queues: HashMap<String, VecDeque<Bytes>>,
    traffic: HashMap<String, InterfaceTraffic>,
}

impl LinkAggregator {
    /// Initialize against the local node's interface set (spec §4.F
    /// startup sequence: "initialize the Aggregator against it").
    pub fn new(config: LinkAggregationConfig, snapshots: Vec<InterfaceSnapshot>) -> Self {
        let queues = snapshots
            .iter()
            .map(|s| (s.name.clone(), VecDeque::new()))
            .collect();
        let weights = Self::compute_weights(&snapshots);
        let mut aggregator = Self {
            config,
            snapshots,
            weights,
            mode: AggregationMode::LoadBalance,
            queues,
            traffic: HashMap::new(),
        };
        aggregator.mode = aggregator.effective_mode();
        aggregator
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    pub fn weights(&self) -> &HashMap<String, f64> {
        &self.weights
    }

    pub fn traffic(&self, name: &str) -> InterfaceTraffic {
        self.traffic.get(name).copied().unwrap_or_default()
    }

    fn effective_mode(&self) -> AggregationMode {
        if self.config.mode == AggregationMode::Adaptive {
            return AggregationMode::Adaptive;
        }
        let active = self.snapshots.iter().filter(|s| s.active).count();
        if active <= 1 {
            AggregationMode::Failover
        } else {
            AggregationMode::LoadBalance
        }
    }

    fn compute_weights(snapshots: &[InterfaceSnapshot]) -> HashMap<String, f64> {
        let raw: Vec<(String, f64)> = snapshots
            .iter()
            .filter(|s| s.active && s.bandwidth_mbps > 0.0 && s.latency_ms < 1000.0)
            .map(|s| {
                let factor = (100.0 / s.latency_ms).max(0.1);
                (s.name.clone(), (s.bandwidth_mbps / 100.0) * factor)
            })
            .collect();
        if raw.is_empty() {
            return HashMap::new();
        }
        let total: f64 = raw.iter().map(|(_, r)| r).sum();
        raw.into_iter().map(|(name, r)| (name, r / total)).collect()
    }

    /// Select an interface for a packet of `packet_size` bytes, per the
    /// current mode. `None` if no interface is available.
    pub fn select(&self, packet_size: usize) -> Option<String> {
        match self.mode {
            AggregationMode::Failover => self.select_failover(),
            AggregationMode::LoadBalance => self.select_load_balance(),
            AggregationMode::Adaptive => self.select_adaptive(packet_size),
        }
    }

    fn select_failover(&self) -> Option<String> {
        self.snapshots.iter().find(|s| s.active).map(|s| s.name.clone())
    }

    fn select_load_balance(&self) -> Option<String> {
        if self.weights.is_empty() {
            return None;
        }
        let total: f64 = self.weights.values().sum();
        let first_qualified = || {
            self.snapshots
                .iter()
                .find(|s| self.weights.contains_key(&s.name))
                .map(|s| s.name.clone())
        };
        if total <= 0.0 {
            return first_qualified();
        }
        let mut roll = rand::thread_rng().gen::<f64>() * total;
        for s in &self.snapshots {
            if let Some(w) = self.weights.get(&s.name) {
                if roll < *w {
                    return Some(s.name.clone());
                }
                roll -= w;
            }
        }
        first_qualified()
    }

    fn select_adaptive(&self, packet_size: usize) -> Option<String> {
        if packet_size == 0 {
            return self.select_load_balance();
        }
        let active = self.snapshots.iter().filter(|s| s.active);
        if packet_size > 1000 {
            active
                .max_by(|a, b| a.bandwidth_mbps.total_cmp(&b.bandwidth_mbps))
                .map(|s| s.name.clone())
        } else {
            active
                .min_by(|a, b| a.latency_ms.total_cmp(&b.latency_ms))
                .map(|s| s.name.clone())
        }
    }

    /// Enqueue a payload, selecting an interface automatically when `None`
    /// is given. Returns the interface the payload was queued on.
    pub fn enqueue(
        &mut self,
        payload: Bytes,
        interface: Option<&str>,
    ) -> Result<String, AggregatorError> {
        let target = match interface {
            Some(name) => name.to_string(),
            None => self.select(payload.len()).ok_or(AggregatorError::NoRoute)?,
        };

        let queue = self.queues.entry(target.clone()).or_default();
        if queue.len() >= self.config.max_queue_size {
            return Err(AggregatorError::QueueFull);
        }
        let len = payload.len() as u64;
        queue.push_back(payload);

        let traffic = self.traffic.entry(target.clone()).or_default();
        traffic.packets_sent += 1;
        traffic.bytes_sent += len;

        Ok(target)
    }

    pub fn dequeue(&mut self, interface: &str) -> Option<Bytes> {
        self.queues.get_mut(interface)?.pop_front()
    }

    pub fn queue_len(&self, interface: &str) -> usize {
        self.queues.get(interface).map(VecDeque::len).unwrap_or(0)
    }

    /// Refresh the live snapshot, recompute weights, and re-evaluate mode.
    /// Idempotent; never blocks selection (spec §4.D optimization tick).
    pub fn optimize(&mut self, snapshots: Vec<InterfaceSnapshot>) {
        for s in &snapshots {
            self.queues.entry(s.name.clone()).or_default();
        }
        self.snapshots = snapshots;
        self.weights = Self::compute_weights(&self.snapshots);
        self.mode = self.effective_mode();
        debug!(mode = ?self.mode, interfaces = self.snapshots.len(), "aggregator optimized");
    }
}
