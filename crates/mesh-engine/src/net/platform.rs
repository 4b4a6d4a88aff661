use std::time::Duration;

use async_trait::async_trait;
use mesh_common::models::InterfaceKind;

use crate::error::PlatformError;

/// A network interface as reported by [`PlatformPort::enumerate_interfaces`].
#[derive(Debug, Clone)]
pub struct InterfaceDescriptor {
    pub name: String,
    pub kind: InterfaceKind,
    pub up: bool,
    pub address: Option<String>,
    pub hw_address: Option<String>,
}

/// The outcome of a single reachability probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeResult {
    pub reachable: bool,
    pub rtt_ms: Option<f64>,
}

/// Abstract capability set the engine needs from the host OS and the wire.
///
/// The surrounding program supplies an implementation; the engine itself
/// never touches `/sys`, raw sockets, or a ping binary directly — every
/// such access goes through this trait. See spec §4.A.
#[async_trait]
pub trait PlatformPort: Send + Sync {
    /// Enumerate live interfaces, skipping loopback.
    async fn enumerate_interfaces(&self) -> Result<Vec<InterfaceDescriptor>, PlatformError>;

    /// Classify an interface name into a [`InterfaceKind`].
    fn classify(&self, name: &str) -> InterfaceKind;

    /// Whether the named interface is currently up.
    async fn is_up(&self, name: &str) -> Result<bool, PlatformError>;

    /// Administratively bring an interface up.
    async fn admin_up(&self, name: &str) -> Result<(), PlatformError>;

    /// Administratively bring an interface down.
    async fn admin_down(&self, name: &str) -> Result<(), PlatformError>;

    /// Broadcast a discovery payload on `port`.
    async fn broadcast_send(&self, payload: &[u8], port: u16) -> Result<(), PlatformError>;

    /// Listen for broadcast payloads on `port` for up to `timeout`.
    async fn broadcast_recv(
        &self,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, PlatformError>;

    /// Run a single reachability/latency probe against `target`, bound to
    /// `interface`, honoring `timeout` as a hard deadline.
    async fn probe(
        &self,
        interface: &str,
        target: &str,
        timeout: Duration,
    ) -> Result<ProbeResult, PlatformError>;

    /// The host's local address (best-effort).
    async fn local_address(&self) -> Result<String, PlatformError>;

    /// The hardware (MAC) address of the named interface.
    async fn hw_address(&self, name: &str) -> Result<String, PlatformError>;
}
