//! The platform port (spec §4.A) — the abstract capability set the engine
//! consumes for everything that touches the OS or the wire: interface
//! enumeration/classification, broadcast I/O, and reachability probing.

pub mod linux;
pub mod mock;
pub mod platform;

pub use platform::{InterfaceDescriptor, PlatformPort, ProbeResult};

use mesh_common::models::InterfaceKind;

/// Classify an interface name using the prefix heuristics from spec §4.A.
///
/// Shared by every [`PlatformPort`] implementation so classification never
/// drifts between production and test ports.
pub fn classify_by_name(name: &str) -> InterfaceKind {
    let lower = name.to_ascii_lowercase();
    if lower.starts_with("wl") || lower.starts_with("wifi") || lower.starts_with("wlan") {
        InterfaceKind::Wireless
    } else if lower.starts_with("ppp")
        || lower.starts_with("wwan")
        || lower.starts_with("rmnet")
        || lower.starts_with("cdc")
    {
        InterfaceKind::Cellular
    } else if lower.starts_with("eth") || lower.starts_with("en") {
        InterfaceKind::Wired
    } else {
        InterfaceKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_prefix() {
        assert_eq!(classify_by_name("wlan0"), InterfaceKind::Wireless);
        assert_eq!(classify_by_name("wifi0"), InterfaceKind::Wireless);
        assert_eq!(classify_by_name("wl0"), InterfaceKind::Wireless);
        assert_eq!(classify_by_name("ppp0"), InterfaceKind::Cellular);
        assert_eq!(classify_by_name("wwan0"), InterfaceKind::Cellular);
        assert_eq!(classify_by_name("rmnet0"), InterfaceKind::Cellular);
        assert_eq!(classify_by_name("cdc-wdm0"), InterfaceKind::Cellular);
        assert_eq!(classify_by_name("eth0"), InterfaceKind::Wired);
        assert_eq!(classify_by_name("enp3s0"), InterfaceKind::Wired);
        assert_eq!(classify_by_name("docker0"), InterfaceKind::Unknown);
    }
}
