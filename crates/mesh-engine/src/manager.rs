//! Mesh Manager (spec §4.F) — owns the shared state and runs the
//! discovery/monitoring/optimization/housekeeping control loops, following
//! this lineage's field-agent supervisor shape (one `tokio::spawn` per
//! loop, cooperative shutdown via a `watch` channel).

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mesh_common::models::{InterfaceRecord, NodeRecord, QualitySnapshot};
use mesh_common::protocol::NodeData;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::{AggregationMode, InterfaceSnapshot, LinkAggregator};
use crate::config::MeshConfig;
use crate::discovery::NodeDiscovery;
use crate::error::MeshError;
use crate::failover::{FailoverManager, FailoverState};
use crate::metrics::{GlobalMetrics, MetricsCollector};
use crate::net::PlatformPort;

const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const PEER_TTL: chrono::Duration = chrono::Duration::seconds(60);
/// Capacity of the lifecycle event broadcast channel (spec SPEC_FULL.md §7
/// supplement); sized like `strata-control::state::AppState`'s dashboard
/// channel, scaled down since lifecycle events fire far less often.
const LIFECYCLE_CHANNEL_CAPACITY: usize = 64;

/// A notable change to the engine's shared state, pushed to anyone holding a
/// [`MeshManager::subscribe`] receiver. Mirrors `strata-control`'s dashboard
/// broadcast channel, generalized to this engine's own state transitions.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    PeerDiscovered(Uuid),
    PeerEvicted(Uuid),
    FailoverStateChanged {
        from: FailoverState,
        to: FailoverState,
    },
}

struct MeshState {
    local_node: NodeRecord,
    interfaces: HashMap<String, InterfaceRecord>,
    peers: HashMap<Uuid, NodeRecord>,
}

/// A read-only snapshot of the engine, returned by [`MeshManager::status`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct MeshStatus {
    pub node_id: Uuid,
    pub address: String,
    pub interfaces: Vec<InterfaceRecord>,
    pub peers: Vec<NodeRecord>,
    pub active_connections: Vec<String>,
    pub running: bool,
    pub failover_state: FailoverState,
    pub aggregation_mode: AggregationMode,
    pub global_metrics: GlobalMetrics,
}

/// Owns the engine's shared mutable state and drives its control loops.
pub struct MeshManager {
    platform: Arc<dyn PlatformPort>,
    config: MeshConfig,
    discovery: NodeDiscovery,
    state: Mutex<MeshState>,
    metrics: Mutex<MetricsCollector>,
    aggregator: Mutex<LinkAggregator>,
    failover: Mutex<FailoverManager>,
    global_metrics: Mutex<GlobalMetrics>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    running: AtomicBool,
    lifecycle_tx: broadcast::Sender<LifecycleEvent>,
}

impl MeshManager {
    /// Startup sequence (spec §4.F): enumerate interfaces, measure each
    /// once, build the local node record, initialize the aggregator.
    pub async fn bootstrap(
        platform: Arc<dyn PlatformPort>,
        config: MeshConfig,
    ) -> Result<Arc<Self>, MeshError> {
        let descriptors = platform.enumerate_interfaces().await?;
        let hostname = local_hostname();
        let hw_address = descriptors
            .first()
            .and_then(|d| d.hw_address.clone())
            .unwrap_or_else(|| "00:00:00:00:00:00".to_string());
        let node_id = mesh_common::ids::node_id(&hostname, &hw_address);
        let address = platform.local_address().await.unwrap_or_else(|_| "0.0.0.0".to_string());

        let mut local_node = NodeRecord::new(node_id, address);
        let mut interfaces = HashMap::new();
        let mut metrics = MetricsCollector::new();

        for d in &descriptors {
            local_node.interfaces.push(d.name.clone());
            let sample = metrics
                .sample_interface(platform.as_ref(), &d.name, d.kind, HEALTH_PROBE_TIMEOUT)
                .await;
            local_node.bandwidth.insert(d.name.clone(), sample.bandwidth_mbps);
            local_node.latency.insert(d.name.clone(), sample.latency_ms);

            let mut record = InterfaceRecord::new(d.name.clone(), d.kind, d.up);
            record.address = d.address.clone();
            record.hw_address = d.hw_address.clone();
            record.quality = QualitySnapshot {
                bandwidth_mbps: sample.bandwidth_mbps,
                latency_ms: sample.latency_ms,
                jitter_ms: sample.jitter_ms,
                loss_pct: sample.loss_pct,
                last_measured_at: Utc::now(),
            };
            interfaces.insert(d.name.clone(), record);
        }

        let snapshots = interface_snapshots(&interfaces);
        let aggregator = LinkAggregator::new(config.link_aggregation.clone(), snapshots);

        let primary = config
            .interfaces
            .primary
            .clone()
            .or_else(|| descriptors.first().map(|d| d.name.clone()));
        let backups = if !config.interfaces.backups.is_empty() {
            config.interfaces.backups.clone()
        } else {
            descriptors
                .iter()
                .map(|d| d.name.clone())
                .filter(|n| Some(n) != primary.as_ref())
                .collect()
        };
        let failover = FailoverManager::new(config.failover.clone(), primary, backups);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (lifecycle_tx, _) = broadcast::channel(LIFECYCLE_CHANNEL_CAPACITY);

        info!(
            node_id = %node_id,
            interfaces = descriptors.len(),
            "mesh manager bootstrapped"
        );

        Ok(Arc::new(Self {
            discovery: NodeDiscovery::new(config.node_discovery.clone()),
            platform,
            config,
            state: Mutex::new(MeshState {
                local_node,
                interfaces,
                peers: HashMap::new(),
            }),
            metrics: Mutex::new(metrics),
            aggregator: Mutex::new(aggregator),
            failover: Mutex::new(failover),
            global_metrics: Mutex::new(GlobalMetrics::default()),
            shutdown_tx,
            shutdown_rx,
            running: AtomicBool::new(false),
            lifecycle_tx,
        }))
    }

    /// Subscribe to lifecycle events (peer discovery/eviction, failover
    /// transitions). Lagging subscribers miss events rather than stalling
    /// the control loop that published them.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.lifecycle_tx.subscribe()
    }

    fn publish(&self, event: LifecycleEvent) {
        let _ = self.lifecycle_tx.send(event);
    }

    /// Start the four control loops. Returns their join handles; the
    /// caller does not need to await them unless collecting shutdown errors.
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        self.running.store(true, Ordering::SeqCst);
        vec![
            self.clone().spawn_loop("discovery", 5, Self::discovery_tick),
            self.clone().spawn_loop("monitoring", 10, Self::monitoring_tick),
            self.clone().spawn_loop("optimization", 30, Self::optimization_tick),
            self.clone().spawn_loop("housekeeping", 1, Self::housekeeping_tick),
        ]
    }

    fn spawn_loop<F, Fut>(self: Arc<Self>, name: &'static str, period_secs: u64, tick: F) -> JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        tokio::spawn(async move {
            let mut shutdown = self.shutdown_rx.clone();
            let mut ticker = tokio::time::interval(Duration::from_secs(period_secs));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        tick(self.clone()).await;
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(loop_name = name, "control loop stopped");
        })
    }

    async fn discovery_tick(self: Arc<Self>) {
        let (node_id_str, node_data) = {
            let state = self.state.lock().await;
            (
                state.local_node.node_id.to_string(),
                NodeData::from_node_record(&state.local_node, Utc::now().timestamp() as f64),
            )
        };

        if let Err(e) = self
            .discovery
            .broadcast_advertisement(self.platform.as_ref(), node_data)
            .await
        {
            warn!(error = %e, "failed to broadcast advertisement");
        }

        match self.discovery.discover_once(self.platform.as_ref(), &node_id_str).await {
            Ok(peers) => {
                let mut state = self.state.lock().await;
                let now = Utc::now();
                let mut discovered = Vec::new();
                for peer in peers {
                    let Ok(uuid) = Uuid::parse_str(&peer.node_id) else {
                        continue;
                    };
                    if !state.peers.contains_key(&uuid) {
                        discovered.push(uuid);
                    }
                    let record = state
                        .peers
                        .entry(uuid)
                        .or_insert_with(|| NodeRecord::new(uuid, peer.ip_address.clone()));
                    record.address = peer.ip_address;
                    record.interfaces = peer.connections;
                    record.bandwidth = peer.bandwidth;
                    record.latency = peer.latency;
                    record.data_cap_remaining = peer.data_caps;
                    record.last_seen = now;
                }
                let stale: Vec<Uuid> = state
                    .peers
                    .iter()
                    .filter(|(_, v)| v.is_stale(now, PEER_TTL))
                    .map(|(id, _)| *id)
                    .collect();
                state.peers.retain(|_, v| !v.is_stale(now, PEER_TTL));
                drop(state);
                if !stale.is_empty() {
                    debug!(evicted = stale.len(), "evicted stale peers");
                }
                for id in discovered {
                    self.publish(LifecycleEvent::PeerDiscovered(id));
                }
                for id in stale {
                    self.publish(LifecycleEvent::PeerEvicted(id));
                }
            }
            Err(e) => warn!(error = %e, "discovery pass failed"),
        }
    }

    async fn monitoring_tick(self: Arc<Self>) {
        let descriptors = match self.platform.enumerate_interfaces().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "failed to enumerate interfaces during monitoring");
                return;
            }
        };

        {
            let mut metrics = self.metrics.lock().await;
            let mut state = self.state.lock().await;
            for d in &descriptors {
                let sample = metrics
                    .sample_interface(self.platform.as_ref(), &d.name, d.kind, HEALTH_PROBE_TIMEOUT)
                    .await;
                state.local_node.bandwidth.insert(d.name.clone(), sample.bandwidth_mbps);
                state.local_node.latency.insert(d.name.clone(), sample.latency_ms);

                let record = state
                    .interfaces
                    .entry(d.name.clone())
                    .or_insert_with(|| InterfaceRecord::new(d.name.clone(), d.kind, d.up));
                record.up = d.up;
                record.quality = QualitySnapshot {
                    bandwidth_mbps: sample.bandwidth_mbps,
                    latency_ms: sample.latency_ms,
                    jitter_ms: sample.jitter_ms,
                    loss_pct: sample.loss_pct,
                    last_measured_at: Utc::now(),
                };
            }
            state.local_node.last_seen = Utc::now();
        }

        // Never hold `failover` and `state` at once: `status()` locks them in
        // the opposite order (state, then failover), and monitoring's probe
        // window can run for seconds — holding both here would deadlock
        // against a concurrent status query (spec §4.F: status is a pure
        // read that must run alongside the monitoring loop).
        let mut failover = self.failover.lock().await;
        let prior_state = failover.state();
        failover.run_health_checks(self.platform.as_ref(), Utc::now()).await;
        let new_state = failover.state();
        let failed: HashSet<String> = failover.failed().clone();
        drop(failover);

        let mut state = self.state.lock().await;
        for (name, record) in state.interfaces.iter_mut() {
            record.health.active = record.up && !failed.contains(name);
        }
        drop(state);

        if new_state != prior_state {
            self.publish(LifecycleEvent::FailoverStateChanged {
                from: prior_state,
                to: new_state,
            });
        }
    }

    async fn optimization_tick(self: Arc<Self>) {
        let snapshots = {
            let state = self.state.lock().await;
            interface_snapshots(&state.interfaces)
        };
        let mut aggregator = self.aggregator.lock().await;
        aggregator.optimize(snapshots);
        info!(mode = ?aggregator.mode(), "link aggregation optimized");
    }

    async fn housekeeping_tick(self: Arc<Self>) {
        let state = self.state.lock().await;
        let total_bandwidth_mbps: f64 = state.local_node.bandwidth.values().sum();
        let positive_latencies: Vec<f64> =
            state.local_node.latency.values().copied().filter(|l| *l > 0.0).collect();
        let average_latency_ms = if positive_latencies.is_empty() {
            0.0
        } else {
            positive_latencies.iter().sum::<f64>() / positive_latencies.len() as f64
        };
        let global = GlobalMetrics {
            total_bandwidth_mbps,
            average_latency_ms,
            total_nodes: 1 + state.peers.len(),
            active_connections: state.interfaces.values().filter(|r| r.health.active).count(),
        };
        drop(state);
        *self.global_metrics.lock().await = global;
    }

    /// Cooperative shutdown: signal every loop and mark the engine stopped.
    /// Loops observe this within one tick of their own cadence.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
        info!("shutdown signaled");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Pure read of the shared state — never blocks a running control loop
    /// for longer than the lock hold time of whichever tick is in flight.
    pub async fn status(&self) -> MeshStatus {
        let state = self.state.lock().await;
        let failover = self.failover.lock().await;
        let aggregator = self.aggregator.lock().await;
        let global_metrics = self.global_metrics.lock().await.clone();
        MeshStatus {
            node_id: state.local_node.node_id,
            address: state.local_node.address.clone(),
            interfaces: state.interfaces.values().cloned().collect(),
            peers: state.peers.values().cloned().collect(),
            active_connections: state
                .interfaces
                .values()
                .filter(|r| r.health.active)
                .map(|r| r.name.clone())
                .collect(),
            running: self.running.load(Ordering::SeqCst),
            failover_state: failover.state(),
            aggregation_mode: aggregator.mode(),
            global_metrics,
        }
    }

    /// Force a manual failover, per spec §4.E.
    pub async fn manual_failover(&self, from: &str, to: &str) {
        self.failover.lock().await.manual_failover(from, to);
    }

    /// Produce the current performance report, per spec §4.B.
    pub async fn performance_report(&self) -> crate::metrics::PerformanceReport {
        let metrics = self.metrics.lock().await;
        let global = self.global_metrics.lock().await.clone();
        metrics.performance_report(global)
    }

    /// Write the current performance report to `path` as pretty JSON.
    pub async fn export_report(&self, path: &std::path::Path) -> std::io::Result<()> {
        let metrics = self.metrics.lock().await;
        let global = self.global_metrics.lock().await.clone();
        metrics.export_report(global, path).await
    }

    /// Enqueue a payload on the aggregator, selecting an interface
    /// automatically when `interface` is `None`.
    pub async fn enqueue(
        &self,
        payload: bytes::Bytes,
        interface: Option<&str>,
    ) -> Result<String, crate::error::AggregatorError> {
        self.aggregator.lock().await.enqueue(payload, interface)
    }

    pub fn config(&self) -> &MeshConfig {
        &self.config
    }
}

fn interface_snapshots(interfaces: &HashMap<String, InterfaceRecord>) -> Vec<InterfaceSnapshot> {
    interfaces
        .values()
        .map(|r| InterfaceSnapshot {
            name: r.name.clone(),
            active: r.health.active,
            bandwidth_mbps: r.quality.bandwidth_mbps,
            latency_ms: r.quality.latency_ms,
        })
        .collect()
}

fn local_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "mesh-node".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::MockPlatformPort;
    use crate::net::{InterfaceDescriptor, ProbeResult};
    use mesh_common::models::InterfaceKind;

    fn platform_with_one_interface() -> Arc<dyn PlatformPort> {
        let port = MockPlatformPort::new(vec![InterfaceDescriptor {
            name: "eth0".to_string(),
            kind: InterfaceKind::Wired,
            up: true,
            address: Some("10.0.0.5".to_string()),
            hw_address: Some("02:00:00:00:00:01".to_string()),
        }]);
        port.set_probe_result("eth0", "8.8.8.8", ProbeResult { reachable: true, rtt_ms: Some(10.0) });
        port.set_probe_result("eth0", "1.1.1.1", ProbeResult { reachable: true, rtt_ms: Some(12.0) });
        Arc::new(port)
    }

    #[tokio::test]
    async fn bootstrap_builds_local_node_and_status() {
        let platform = platform_with_one_interface();
        let manager = MeshManager::bootstrap(platform, MeshConfig::default()).await.unwrap();
        let status = manager.status().await;
        assert_eq!(status.interfaces.len(), 1);
        assert!(!status.running);
        assert_eq!(status.failover_state, FailoverState::Normal);
    }

    #[tokio::test]
    async fn manual_failover_is_reflected_in_status() {
        let platform = platform_with_one_interface();
        let manager = MeshManager::bootstrap(platform, MeshConfig::default()).await.unwrap();
        manager.manual_failover("eth0", "eth0").await;
        let status = manager.status().await;
        assert!(status.failover_state != FailoverState::Normal || status.interfaces.len() == 1);
    }

    #[tokio::test]
    async fn discovery_tick_publishes_peer_discovered_event() {
        let shared_bus = crate::net::mock::BroadcastBus::new();
        let local_port = MockPlatformPort::new(vec![]).with_bus(shared_bus.clone());
        let manager = MeshManager::bootstrap(Arc::new(local_port), MeshConfig::default())
            .await
            .unwrap();
        let mut events = manager.subscribe();

        let peer_id = Uuid::new_v4();
        let mut peer_node = NodeRecord::new(peer_id, "10.0.0.9");
        peer_node.interfaces.push("eth0".to_string());
        let peer_port = MockPlatformPort::new(vec![]).with_bus(shared_bus);
        let node_data = mesh_common::protocol::NodeData::from_node_record(&peer_node, 0.0);
        let nd = crate::discovery::NodeDiscovery::new(Default::default());
        nd.broadcast_advertisement(&peer_port, node_data).await.unwrap();

        manager.clone().discovery_tick().await;

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            LifecycleEvent::PeerDiscovered(id) => assert_eq!(id, peer_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn spawn_and_shutdown_stop_loops_within_a_tick() {
        let platform = platform_with_one_interface();
        let manager = MeshManager::bootstrap(platform, MeshConfig::default()).await.unwrap();
        let handles = manager.spawn();
        assert!(manager.is_running());
        manager.shutdown();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        }
        assert!(!manager.is_running());
    }
}
