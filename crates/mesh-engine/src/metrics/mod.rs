//! Metrics Collector (spec §4.B) — per-interface bandwidth/latency/jitter/
//! loss sampling, rolling history, and the derived performance report.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::net::PlatformPort;

/// Targets used for latency/jitter/loss probing, per spec §4.B.
pub const LATENCY_TARGETS: [&str; 2] = ["8.8.8.8", "1.1.1.1"];
/// Reported when no latency probe succeeds — the "unreachable sentinel".
pub const UNREACHABLE_SENTINEL_MS: f64 = 1000.0;
const JITTER_PROBE_COUNT: usize = 5;
const JITTER_PROBE_SPACING: Duration = Duration::from_millis(100);
const LOSS_PROBE_COUNT: usize = 10;
/// Capacity of the rolling per-interface sample history.
pub const HISTORY_CAPACITY: usize = 100;

/// A single point-in-time performance reading.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerformanceSample {
    pub bandwidth_mbps: f64,
    pub latency_ms: f64,
    pub jitter_ms: f64,
    pub loss_pct: f64,
}

/// Derives a bandwidth estimate for an interface. The default
/// implementation is the class-based estimate from spec §4.B; production
/// deployments may plug in a true throughput test.
pub trait BandwidthEstimator: Send + Sync {
    fn estimate(&self, kind: mesh_common::models::InterfaceKind) -> f64;
}

/// Class-based bandwidth estimate keyed on interface kind (spec §4.B).
#[derive(Debug, Default)]
pub struct ClassBandwidthEstimator;

impl BandwidthEstimator for ClassBandwidthEstimator {
    fn estimate(&self, kind: mesh_common::models::InterfaceKind) -> f64 {
        use mesh_common::models::InterfaceKind::*;
        match kind {
            Wired => 100.0,
            Wireless => 50.0,
            Cellular => 15.0,
            Unknown => 10.0,
        }
    }
}

/// Rolling history and derived statistics for one interface.
#[derive(Debug, Clone, Default)]
pub struct InterfaceMetrics {
    pub current: PerformanceSample,
    pub history: VecDeque<PerformanceSample>,
    pub average: PerformanceSample,
    pub peak: PerformanceSample,
}

impl InterfaceMetrics {
    fn push(&mut self, sample: PerformanceSample) {
        if self.history.len() >= HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(sample);
        self.current = sample;
        self.recompute();
    }

    fn recompute(&mut self) {
        let n = self.history.len() as f64;
        let mut sum = PerformanceSample::default();
        let mut peak = PerformanceSample::default();
        for s in &self.history {
            sum.bandwidth_mbps += s.bandwidth_mbps;
            sum.latency_ms += s.latency_ms;
            sum.jitter_ms += s.jitter_ms;
            sum.loss_pct += s.loss_pct;
            peak.bandwidth_mbps = peak.bandwidth_mbps.max(s.bandwidth_mbps);
            peak.latency_ms = peak.latency_ms.max(s.latency_ms);
            peak.jitter_ms = peak.jitter_ms.max(s.jitter_ms);
            peak.loss_pct = peak.loss_pct.max(s.loss_pct);
        }
        self.average = PerformanceSample {
            bandwidth_mbps: sum.bandwidth_mbps / n,
            latency_ms: sum.latency_ms / n,
            jitter_ms: sum.jitter_ms / n,
            loss_pct: sum.loss_pct / n,
        };
        self.peak = peak;
    }
}

/// Global, mesh-wide metrics (spec §4.B report generation).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_bandwidth_mbps: f64,
    pub average_latency_ms: f64,
    pub total_nodes: usize,
    pub active_connections: usize,
}

/// The full performance report produced on demand by the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub timestamp: DateTime<Utc>,
    pub global: GlobalMetrics,
    pub interfaces: HashMap<String, InterfaceReportBlock>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceReportBlock {
    pub current: PerformanceSample,
    pub average: PerformanceSample,
    pub peak: PerformanceSample,
}

/// Collects and analyzes per-interface performance metrics.
pub struct MetricsCollector {
    histories: HashMap<String, InterfaceMetrics>,
    estimator: Box<dyn BandwidthEstimator>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            histories: HashMap::new(),
            estimator: Box::new(ClassBandwidthEstimator),
        }
    }

    /// Install a pluggable bandwidth estimator (e.g. a real throughput test).
    pub fn with_estimator(estimator: Box<dyn BandwidthEstimator>) -> Self {
        Self {
            histories: HashMap::new(),
            estimator,
        }
    }

    /// Sample one interface's bandwidth/latency/jitter/loss and push the
    /// result into its rolling history.
    pub async fn sample_interface(
        &mut self,
        platform: &dyn PlatformPort,
        name: &str,
        kind: mesh_common::models::InterfaceKind,
        probe_timeout: Duration,
    ) -> PerformanceSample {
        let bandwidth_mbps = self.estimator.estimate(kind);
        let latency_ms = Self::measure_latency(platform, name, probe_timeout).await;
        let jitter_ms = Self::measure_jitter(platform, name, probe_timeout).await;
        let loss_pct = Self::measure_loss(platform, name, probe_timeout).await;

        let sample = PerformanceSample {
            bandwidth_mbps,
            latency_ms,
            jitter_ms,
            loss_pct,
        };
        self.histories.entry(name.to_string()).or_default().push(sample);
        sample
    }

    async fn measure_latency(platform: &dyn PlatformPort, name: &str, timeout: Duration) -> f64 {
        let mut rtts = Vec::new();
        for target in LATENCY_TARGETS {
            if let Ok(result) = platform.probe(name, target, timeout).await {
                if let Some(rtt) = result.rtt_ms.filter(|_| result.reachable) {
                    rtts.push(rtt);
                }
            }
        }
        if rtts.is_empty() {
            UNREACHABLE_SENTINEL_MS
        } else {
            rtts.iter().sum::<f64>() / rtts.len() as f64
        }
    }

    async fn measure_jitter(platform: &dyn PlatformPort, name: &str, timeout: Duration) -> f64 {
        let mut rtts = Vec::new();
        for i in 0..JITTER_PROBE_COUNT {
            if let Ok(result) = platform.probe(name, LATENCY_TARGETS[0], timeout).await {
                if let Some(rtt) = result.rtt_ms.filter(|_| result.reachable) {
                    rtts.push(rtt);
                }
            }
            if i + 1 < JITTER_PROBE_COUNT {
                tokio::time::sleep(JITTER_PROBE_SPACING).await;
            }
        }
        if rtts.len() < 2 {
            return 0.0;
        }
        let mean = rtts.iter().sum::<f64>() / rtts.len() as f64;
        let variance =
            rtts.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (rtts.len() - 1) as f64;
        variance.sqrt()
    }

    async fn measure_loss(platform: &dyn PlatformPort, name: &str, timeout: Duration) -> f64 {
        let mut successes = 0u32;
        for _ in 0..LOSS_PROBE_COUNT {
            if let Ok(result) = platform.probe(name, LATENCY_TARGETS[0], timeout).await {
                if result.reachable {
                    successes += 1;
                }
            }
        }
        (LOSS_PROBE_COUNT as f64 - successes as f64) / LOSS_PROBE_COUNT as f64 * 100.0
    }

    pub fn interface_metrics(&self, name: &str) -> Option<&InterfaceMetrics> {
        self.histories.get(name)
    }

    pub fn all_interface_metrics(&self) -> &HashMap<String, InterfaceMetrics> {
        &self.histories
    }

    /// Produce the full performance report, including recommendations.
    pub fn performance_report(&self, global: GlobalMetrics) -> PerformanceReport {
        let mut interfaces = HashMap::new();
        let mut recommendations = Vec::new();

        for (name, metrics) in &self.histories {
            if metrics.current.latency_ms > 100.0 {
                recommendations.push(format!(
                    "interface {name} has high latency ({:.1}ms) — consider failing over",
                    metrics.current.latency_ms
                ));
            }
            if metrics.current.loss_pct > 5.0 {
                recommendations.push(format!(
                    "interface {name} has high packet loss ({:.1}%) — investigate connection quality",
                    metrics.current.loss_pct
                ));
            }
            interfaces.insert(
                name.clone(),
                InterfaceReportBlock {
                    current: metrics.current,
                    average: metrics.average,
                    peak: metrics.peak,
                },
            );
        }

        if global.total_nodes < 2 {
            recommendations.push("low mesh redundancy — fewer than two nodes visible".to_string());
        }
        if global.average_latency_ms > 50.0 {
            recommendations.push(format!(
                "average latency is high ({:.1}ms) — optimize routing",
                global.average_latency_ms
            ));
        }

        debug!(recommendations = recommendations.len(), "performance report generated");

        PerformanceReport {
            timestamp: Utc::now(),
            global,
            interfaces,
            recommendations,
        }
    }

    /// Serialize the performance report to a JSON file.
    pub async fn export_report(
        &self,
        global: GlobalMetrics,
        path: &std::path::Path,
    ) -> std::io::Result<()> {
        let report = self.performance_report(global);
        let json = serde_json::to_string_pretty(&report)
            .expect("PerformanceReport always serializes");
        tokio::fs::write(path, json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::MockPlatformPort;
    use crate::net::{InterfaceDescriptor, ProbeResult};
    use mesh_common::models::InterfaceKind;

    fn port_with(name: &str, rtt: Option<f64>, reachable: bool) -> MockPlatformPort {
        let port = MockPlatformPort::new(vec![InterfaceDescriptor {
            name: name.to_string(),
            kind: InterfaceKind::Wired,
            up: true,
            address: None,
            hw_address: None,
        }]);
        for target in LATENCY_TARGETS {
            port.set_probe_result(name, target, ProbeResult { reachable, rtt_ms: rtt });
        }
        port
    }

    #[tokio::test]
    async fn latency_uses_mean_of_successful_probes() {
        let port = port_with("eth0", Some(20.0), true);
        let latency =
            MetricsCollector::measure_latency(&port, "eth0", Duration::from_secs(1)).await;
        assert_eq!(latency, 20.0);
    }

    #[tokio::test]
    async fn latency_sentinel_when_all_probes_fail() {
        let port = port_with("eth0", None, false);
        let latency =
            MetricsCollector::measure_latency(&port, "eth0", Duration::from_secs(1)).await;
        assert_eq!(latency, UNREACHABLE_SENTINEL_MS);
    }

    #[tokio::test]
    async fn loss_is_zero_when_fully_reachable() {
        let port = port_with("eth0", Some(5.0), true);
        let loss = MetricsCollector::measure_loss(&port, "eth0", Duration::from_secs(1)).await;
        assert_eq!(loss, 0.0);
    }

    #[tokio::test]
    async fn loss_is_hundred_when_fully_unreachable() {
        let port = port_with("eth0", None, false);
        let loss = MetricsCollector::measure_loss(&port, "eth0", Duration::from_secs(1)).await;
        assert_eq!(loss, 100.0);
    }

    #[test]
    fn history_caps_at_capacity_and_tracks_peak() {
        let mut metrics = InterfaceMetrics::default();
        for i in 0..(HISTORY_CAPACITY + 10) {
            metrics.push(PerformanceSample {
                bandwidth_mbps: i as f64,
                latency_ms: 1.0,
                jitter_ms: 0.0,
                loss_pct: 0.0,
            });
        }
        assert_eq!(metrics.history.len(), HISTORY_CAPACITY);
        assert_eq!(metrics.peak.bandwidth_mbps, (HISTORY_CAPACITY + 9) as f64);
    }

    #[test]
    fn recommendations_fire_on_thresholds() {
        let mut collector = MetricsCollector::new();
        collector.histories.insert(
            "ppp0".to_string(),
            {
                let mut m = InterfaceMetrics::default();
                m.push(PerformanceSample {
                    bandwidth_mbps: 10.0,
                    latency_ms: 150.0,
                    jitter_ms: 2.0,
                    loss_pct: 8.0,
                });
                m
            },
        );
        let report = collector.performance_report(GlobalMetrics {
            total_bandwidth_mbps: 10.0,
            average_latency_ms: 150.0,
            total_nodes: 1,
            active_connections: 1,
        });
        assert!(report.recommendations.iter().any(|r| r.contains("high latency")));
        assert!(report.recommendations.iter().any(|r| r.contains("packet loss")));
        assert!(report.recommendations.iter().any(|r| r.contains("redundancy")));
        assert!(report.recommendations.iter().any(|r| r.contains("optimize routing")));
    }
}
