//! An in-memory [`PlatformPort`] for unit tests.
//!
//! Lets every component above the platform port (metrics, discovery,
//! failover) be tested deterministically, without touching real sockets,
//! `/sys`, or a `ping` binary. Multiple [`MockPlatformPort`]s can share a
//! [`BroadcastBus`] to simulate a local segment during discovery tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use mesh_common::models::InterfaceKind;

use crate::error::PlatformError;
use crate::net::{classify_by_name, InterfaceDescriptor, PlatformPort, ProbeResult};

/// A shared in-memory broadcast medium. Cloning is cheap; clones observe
/// the same queue of datagrams.
#[derive(Clone, Default)]
pub struct BroadcastBus {
    inner: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, payload: Vec<u8>) {
        self.inner.lock().unwrap().push_back(payload);
    }

    fn drain(&self) -> Vec<Vec<u8>> {
        self.inner.lock().unwrap().drain(..).collect()
    }
}

/// A deterministic, in-memory platform port for tests.
pub struct MockPlatformPort {
    interfaces: Mutex<Vec<InterfaceDescriptor>>,
    /// (interface, target) -> scripted probe outcome.
    probes: Mutex<HashMap<(String, String), ProbeResult>>,
    local_address: String,
    bus: BroadcastBus,
}

impl MockPlatformPort {
    pub fn new(interfaces: Vec<InterfaceDescriptor>) -> Self {
        Self {
            interfaces: Mutex::new(interfaces),
            probes: Mutex::new(HashMap::new()),
            local_address: "127.0.0.1".to_string(),
            bus: BroadcastBus::new(),
        }
    }

    /// Attach this port to an existing broadcast bus, so multiple mock
    /// nodes observe each other's discovery traffic.
    pub fn with_bus(mut self, bus: BroadcastBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn bus(&self) -> BroadcastBus {
        self.bus.clone()
    }

    /// Script the outcome of a future `probe(interface, target, _)` call.
    pub fn set_probe_result(&self, interface: &str, target: &str, result: ProbeResult) {
        self.probes
            .lock()
            .unwrap()
            .insert((interface.to_string(), target.to_string()), result);
    }

    pub fn set_interface_up(&self, name: &str, up: bool) {
        let mut ifaces = self.interfaces.lock().unwrap();
        if let Some(iface) = ifaces.iter_mut().find(|i| i.name == name) {
            iface.up = up;
        }
    }

    pub fn remove_interface(&self, name: &str) {
        self.interfaces.lock().unwrap().retain(|i| i.name != name);
    }
}

#[async_trait]
impl PlatformPort for MockPlatformPort {
    async fn enumerate_interfaces(&self) -> Result<Vec<InterfaceDescriptor>, PlatformError> {
        Ok(self.interfaces.lock().unwrap().clone())
    }

    fn classify(&self, name: &str) -> InterfaceKind {
        classify_by_name(name)
    }

    async fn is_up(&self, name: &str) -> Result<bool, PlatformError> {
        self.interfaces
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.name == name)
            .map(|i| i.up)
            .ok_or_else(|| PlatformError::UnavailableInterface(name.to_string()))
    }

    async fn admin_up(&self, name: &str) -> Result<(), PlatformError> {
        self.set_interface_up(name, true);
        Ok(())
    }

    async fn admin_down(&self, name: &str) -> Result<(), PlatformError> {
        self.set_interface_up(name, false);
        Ok(())
    }

    async fn broadcast_send(&self, payload: &[u8], _port: u16) -> Result<(), PlatformError> {
        self.bus.push(payload.to_vec());
        Ok(())
    }

    async fn broadcast_recv(
        &self,
        _port: u16,
        _timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, PlatformError> {
        Ok(self.bus.drain())
    }

    async fn probe(
        &self,
        interface: &str,
        target: &str,
        _timeout: Duration,
    ) -> Result<ProbeResult, PlatformError> {
        Ok(self
            .probes
            .lock()
            .unwrap()
            .get(&(interface.to_string(), target.to_string()))
            .copied()
            .unwrap_or(ProbeResult {
                reachable: true,
                rtt_ms: Some(10.0),
            }))
    }

    async fn local_address(&self) -> Result<String, PlatformError> {
        Ok(self.local_address.clone())
    }

    async fn hw_address(&self, name: &str) -> Result<String, PlatformError> {
        Ok(format!("02:00:00:00:00:{:02x}", name.len()))
    }
}
