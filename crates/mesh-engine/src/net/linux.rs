//! Linux implementation of [`PlatformPort`], reading `/sys/class/net` for
//! interface state (the approach this lineage already uses in its field
//! agent's hardware scanner) and shelling out to `ip`/`ping` for mutation
//! and reachability checks.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use mesh_common::models::InterfaceKind;
use regex::Regex;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::PlatformError;
use crate::net::{classify_by_name, InterfaceDescriptor, PlatformPort, ProbeResult};

/// Production [`PlatformPort`] for Linux hosts.
#[derive(Debug, Default)]
pub struct LinuxPlatformPort;

impl LinuxPlatformPort {
    pub fn new() -> Self {
        Self
    }

    fn read_operstate(name: &str) -> bool {
        std::fs::read_to_string(format!("/sys/class/net/{name}/operstate"))
            .map(|s| s.trim() == "up")
            .unwrap_or(false)
    }

    fn read_hw_address(name: &str) -> Option<String> {
        std::fs::read_to_string(format!("/sys/class/net/{name}/address"))
            .ok()
            .map(|s| s.trim().to_string())
    }
}

#[async_trait]
impl PlatformPort for LinuxPlatformPort {
    async fn enumerate_interfaces(&self) -> Result<Vec<InterfaceDescriptor>, PlatformError> {
        let entries = std::fs::read_dir("/sys/class/net")
            .map_err(PlatformError::Io)?
            .flatten();

        let mut interfaces = Vec::new();
        for entry in entries {
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "lo" {
                continue;
            }
            let kind = classify_by_name(&name);
            let up = Self::read_operstate(&name);
            let hw_address = Self::read_hw_address(&name);
            interfaces.push(InterfaceDescriptor {
                name,
                kind,
                up,
                address: None,
                hw_address,
            });
        }
        Ok(interfaces)
    }

    fn classify(&self, name: &str) -> InterfaceKind {
        classify_by_name(name)
    }

    async fn is_up(&self, name: &str) -> Result<bool, PlatformError> {
        if !std::path::Path::new(&format!("/sys/class/net/{name}")).exists() {
            return Err(PlatformError::UnavailableInterface(name.to_string()));
        }
        Ok(Self::read_operstate(name))
    }

    async fn admin_up(&self, name: &str) -> Result<(), PlatformError> {
        run_ip_link(name, "up").await
    }

    async fn admin_down(&self, name: &str) -> Result<(), PlatformError> {
        run_ip_link(name, "down").await
    }

    async fn broadcast_send(&self, payload: &[u8], port: u16) -> Result<(), PlatformError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_broadcast(true)?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        let local: SocketAddr = "0.0.0.0:0".parse().unwrap();
        socket.bind(&local.into())?;
        let sock = UdpSocket::from_std(socket.into())?;
        let dest: SocketAddr = format!("255.255.255.255:{port}").parse().unwrap();
        sock.send_to(payload, dest).await?;
        Ok(())
    }

    async fn broadcast_recv(
        &self,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<Vec<u8>>, PlatformError> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        let addr: SocketAddr = format!("0.0.0.0:{port}").parse().unwrap();
        socket.bind(&addr.into())?;
        let sock = UdpSocket::from_std(socket.into())?;

        let mut received = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = [0u8; 65535];
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, sock.recv_from(&mut buf)).await {
                Ok(Ok((n, _))) => received.push(buf[..n].to_vec()),
                Ok(Err(e)) => {
                    warn!(error = %e, "broadcast_recv failed");
                    break;
                }
                Err(_) => break, // overall deadline elapsed
            }
        }
        Ok(received)
    }

    async fn probe(
        &self,
        interface: &str,
        target: &str,
        timeout: Duration,
    ) -> Result<ProbeResult, PlatformError> {
        let timeout_secs = timeout.as_secs().max(1).to_string();
        let fut = Command::new("ping")
            .args(["-c", "1", "-W", &timeout_secs, "-I", interface, target])
            .output();

        let output = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result.map_err(PlatformError::Io)?,
            Err(_) => {
                return Err(PlatformError::ProbeTimeout {
                    interface: interface.to_string(),
                    target: target.to_string(),
                })
            }
        };

        if !output.status.success() {
            return Ok(ProbeResult {
                reachable: false,
                rtt_ms: None,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let rtt_ms = parse_ping_avg_rtt(&stdout);
        Ok(ProbeResult {
            reachable: true,
            rtt_ms,
        })
    }

    async fn local_address(&self) -> Result<String, PlatformError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect("8.8.8.8:80").await?;
        let addr = socket.local_addr()?;
        Ok(addr.ip().to_string())
    }

    async fn hw_address(&self, name: &str) -> Result<String, PlatformError> {
        Self::read_hw_address(name)
            .ok_or_else(|| PlatformError::UnavailableInterface(name.to_string()))
    }
}

async fn run_ip_link(name: &str, action: &str) -> Result<(), PlatformError> {
    let status = Command::new("ip")
        .args(["link", "set", name, action])
        .status()
        .await
        .map_err(PlatformError::Io)?;
    if !status.success() {
        return Err(PlatformError::CommandFailed(format!(
            "ip link set {name} {action} exited with {status}"
        )));
    }
    Ok(())
}

/// Parse the average RTT out of `ping`'s summary line:
/// `rtt min/avg/max/mdev = 10.123/12.456/15.789/2.345 ms`.
fn parse_ping_avg_rtt(output: &str) -> Option<f64> {
    let re = Regex::new(r"=\s*[\d.]+/([\d.]+)/[\d.]+/[\d.]+").ok()?;
    for line in output.lines() {
        if line.contains("rtt") || line.contains("round-trip") {
            if let Some(caps) = re.captures(line) {
                if let Ok(avg) = caps[1].parse::<f64>() {
                    debug!(avg_ms = avg, "parsed ping rtt");
                    return Some(avg);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ping_summary_line() {
        let output = "rtt min/avg/max/mdev = 10.123/12.456/15.789/2.345 ms";
        assert_eq!(parse_ping_avg_rtt(output), Some(12.456));
    }

    #[test]
    fn returns_none_for_unparseable_output() {
        assert_eq!(parse_ping_avg_rtt("no ping summary here"), None);
    }
}
