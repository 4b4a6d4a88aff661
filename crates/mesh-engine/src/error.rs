//! Error taxonomy for the mesh bonding engine (spec §7).
//!
//! Errors that a control loop can absorb and continue past are logged and
//! swallowed at the loop boundary (see `manager.rs`). Errors surfaced to
//! callers of the aggregator (`QueueFull`, `NoRoute`) are typed so callers
//! can act on them directly.

use thiserror::Error;

/// Errors from the platform port (spec §4.A).
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("interface {0} is no longer available")]
    UnavailableInterface(String),

    #[error("probe against {target} via {interface} timed out")]
    ProbeTimeout { interface: String, target: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("command failed: {0}")]
    CommandFailed(String),
}

/// Errors from the link aggregator (spec §4.D).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("no interface available to route this packet")]
    NoRoute,

    #[error("send queue for this interface is full")]
    QueueFull,
}

/// Top-level engine error, used where a supervisor-level failure should
/// abort startup rather than being absorbed by a loop (spec §7).
#[derive(Debug, Error)]
pub enum MeshError {
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("failed to bind discovery socket: {0}")]
    DiscoveryBind(std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),
}
