//! Failover Manager (spec §4.E) — per-interface health counters, the
//! state machine, and primary/backup bookkeeping.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mesh_common::models::InterfaceHealth;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::FailoverConfig;
use crate::net::PlatformPort;

/// Targets probed on every health check (spec §4.E).
const HEALTH_CHECK_TARGETS: [&str; 2] = ["8.8.8.8", "1.1.1.1"];
/// Bounded failover event log length (spec §3).
const EVENT_LOG_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverState {
    Normal,
    Monitoring,
    FailingOver,
    Recovering,
    Degraded,
}

/// A single failover-relevant occurrence, retained in a bounded log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverEvent {
    pub kind: FailoverEventKind,
    pub interface: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverEventKind {
    ConnectionLost,
    ConnectionRestored,
    ManualFailover,
}

struct TrackedInterface {
    health: InterfaceHealth,
    last_checked: Option<DateTime<Utc>>,
}

/// Drives per-interface health checks and the failover state machine.
pub struct FailoverManager {
    config: FailoverConfig,
    interfaces: std::collections::HashMap<String, TrackedInterface>,
    failed: std::collections::HashSet<String>,
    primary: Option<String>,
    backups: Vec<String>,
    state: FailoverState,
    events: VecDeque<FailoverEvent>,
}

impl FailoverManager {
    pub fn new(config: FailoverConfig, primary: Option<String>, backups: Vec<String>) -> Self {
        let mut interfaces = std::collections::HashMap::new();
        for name in primary.iter().chain(backups.iter()) {
            interfaces.entry(name.clone()).or_insert_with(|| TrackedInterface {
                health: InterfaceHealth::default(),
                last_checked: None,
            });
        }
        Self {
            config,
            interfaces,
            failed: std::collections::HashSet::new(),
            primary,
            backups,
            state: FailoverState::Normal,
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> FailoverState {
        self.state
    }

    pub fn primary(&self) -> Option<&str> {
        self.primary.as_deref()
    }

    pub fn failed(&self) -> &std::collections::HashSet<String> {
        &self.failed
    }

    pub fn events(&self) -> impl Iterator<Item = &FailoverEvent> {
        self.events.iter()
    }

    pub fn register_interface(&mut self, name: &str) {
        self.interfaces.entry(name.to_string()).or_insert_with(|| TrackedInterface {
            health: InterfaceHealth::default(),
            last_checked: None,
        });
    }

    fn record_event(&mut self, kind: FailoverEventKind, interface: &str) {
        if self.events.len() >= EVENT_LOG_CAPACITY {
            self.events.pop_front();
        }
        self.events.push_back(FailoverEvent {
            kind,
            interface: interface.to_string(),
            at: Utc::now(),
        });
    }

    /// Run health checks on every interface whose last check is at least
    /// `monitoring_interval_secs` old, apply the hysteresis rules, and
    /// re-derive the aggregate state.
    pub async fn run_health_checks(&mut self, platform: &dyn PlatformPort, now: DateTime<Utc>) {
        let interval = chrono::Duration::seconds(self.config.monitoring_interval_secs as i64);
        let due: Vec<String> = self
            .interfaces
            .iter()
            .filter(|(_, tracked)| {
                tracked
                    .last_checked
                    .map(|last| now.signed_duration_since(last) >= interval)
                    .unwrap_or(true)
            })
            .map(|(name, _)| name.clone())
            .collect();

        for name in due {
            let healthy = self.probe_interface(platform, &name).await;
            self.apply_health_outcome(&name, healthy, now);
        }

        self.state = self.infer_state();
        if self.state == FailoverState::Degraded {
            error!(interface = ?self.primary, "mesh is degraded: no active interface remains");
        }
    }

    async fn probe_interface(&self, platform: &dyn PlatformPort, name: &str) -> bool {
        let mut successes = 0u32;
        for target in HEALTH_CHECK_TARGETS {
            if let Ok(result) = platform.probe(name, target, Duration::from_secs(2)).await {
                if result.reachable {
                    successes += 1;
                }
            }
        }
        successes as usize * 2 > HEALTH_CHECK_TARGETS.len()
    }

    fn apply_health_outcome(&mut self, name: &str, healthy: bool, now: DateTime<Utc>) {
        let Some(tracked) = self.interfaces.get_mut(name) else {
            return;
        };
        tracked.last_checked = Some(now);
        if healthy {
            tracked.health.record_success();
        } else {
            tracked.health.record_failure();
        }
        let consecutive_failures = tracked.health.consecutive_failures;
        let consecutive_successes = tracked.health.consecutive_successes;

        if consecutive_failures >= self.config.threshold && !self.failed.contains(name) {
            self.mark_failed(name);
        } else if consecutive_successes >= self.config.recovery_threshold
            && self.failed.contains(name)
        {
            self.mark_recovered(name);
        }
    }

    fn mark_failed(&mut self, name: &str) {
        self.failed.insert(name.to_string());
        info!(interface = name, "interface marked failed");
        self.record_event(FailoverEventKind::ConnectionLost, name);
        if self.primary.as_deref() == Some(name) {
            let replacement = self
                .backups
                .iter()
                .find(|b| !self.failed.contains(*b))
                .cloned();
            if let Some(new_primary) = replacement {
                info!(from = name, to = %new_primary, "promoting backup to primary");
                self.primary = Some(new_primary);
            } else {
                self.primary = None;
            }
        }
    }

    fn mark_recovered(&mut self, name: &str) {
        self.failed.remove(name);
        info!(interface = name, "interface recovered");
        self.record_event(FailoverEventKind::ConnectionRestored, name);
        if self.primary.is_none() {
            self.primary = Some(name.to_string());
        }
    }

    fn infer_state(&self) -> FailoverState {
        let total = self.interfaces.len();
        let active = self.interfaces.keys().filter(|n| !self.failed.contains(*n)).count();
        if active == 0 {
            FailoverState::Degraded
        } else if active == total {
            FailoverState::Normal
        } else if active == 1 {
            FailoverState::Monitoring
        } else {
            FailoverState::Normal
        }
    }

    /// Force a manual failover from one interface to another.
    pub fn manual_failover(&mut self, from: &str, to: &str) {
        self.failed.insert(from.to_string());
        self.failed.remove(to);
        self.primary = Some(to.to_string());
        self.record_event(FailoverEventKind::ManualFailover, to);
        self.state = self.infer_state();
        debug!(from, to, "manual failover applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::MockPlatformPort;
    use crate::net::{InterfaceDescriptor, ProbeResult};
    use mesh_common::models::InterfaceKind;

    fn healthy_port(name: &str) -> MockPlatformPort {
        let port = MockPlatformPort::new(vec![InterfaceDescriptor {
            name: name.to_string(),
            kind: InterfaceKind::Wired,
            up: true,
            address: None,
            hw_address: None,
        }]);
        for target in HEALTH_CHECK_TARGETS {
            port.set_probe_result(name, target, ProbeResult { reachable: true, rtt_ms: Some(5.0) });
        }
        port
    }

    fn unhealthy_port(name: &str) -> MockPlatformPort {
        let port = healthy_port(name);
        for target in HEALTH_CHECK_TARGETS {
            port.set_probe_result(name, target, ProbeResult { reachable: false, rtt_ms: None });
        }
        port
    }

    #[tokio::test]
    async fn failure_threshold_marks_interface_failed_and_promotes_backup() {
        let port = unhealthy_port("eth0");
        let mut mgr = FailoverManager::new(
            FailoverConfig::default(),
            Some("eth0".to_string()),
            vec!["wlan0".to_string()],
        );
        mgr.register_interface("wlan0");

        let mut now = Utc::now();
        for _ in 0..3 {
            mgr.run_health_checks(&port, now).await;
            now += chrono::Duration::seconds(mgr_interval(&mgr));
        }

        assert!(mgr.failed().contains("eth0"));
        assert_eq!(mgr.primary(), Some("wlan0"));
        assert!(mgr.events().any(|e| e.kind == FailoverEventKind::ConnectionLost));
    }

    fn mgr_interval(mgr: &FailoverManager) -> i64 {
        mgr.config.monitoring_interval_secs as i64
    }

    #[tokio::test]
    async fn recovery_threshold_clears_failed_and_logs_event() {
        let mut cfg = FailoverConfig::default();
        cfg.threshold = 1;
        cfg.recovery_threshold = 1;
        let mut mgr = FailoverManager::new(cfg, Some("eth0".to_string()), vec![]);

        let down = unhealthy_port("eth0");
        let mut now = Utc::now();
        mgr.run_health_checks(&down, now).await;
        assert!(mgr.failed().contains("eth0"));

        let up = healthy_port("eth0");
        now += chrono::Duration::seconds(mgr_interval(&mgr));
        mgr.run_health_checks(&up, now).await;

        assert!(!mgr.failed().contains("eth0"));
        assert!(mgr.events().any(|e| e.kind == FailoverEventKind::ConnectionRestored));
    }

    #[test]
    fn state_inference_matches_active_ratio() {
        let mgr = FailoverManager::new(FailoverConfig::default(), Some("eth0".to_string()), vec![]);
        assert_eq!(mgr.infer_state(), FailoverState::Normal);
    }

    #[test]
    fn manual_failover_swaps_primary_and_logs() {
        let mut mgr = FailoverManager::new(
            FailoverConfig::default(),
            Some("eth0".to_string()),
            vec!["wlan0".to_string()],
        );
        mgr.register_interface("wlan0");
        mgr.manual_failover("eth0", "wlan0");
        assert!(mgr.failed().contains("eth0"));
        assert!(!mgr.failed().contains("wlan0"));
        assert_eq!(mgr.primary(), Some("wlan0"));
        assert!(mgr.events().any(|e| e.kind == FailoverEventKind::ManualFailover));
    }
}
