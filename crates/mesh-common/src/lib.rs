//! Shared types for the mesh bonding engine.
//!
//! This crate contains:
//! - **Data models** — interface, node, and peer records
//! - **Protocol messages** — the UDP discovery wire format
//! - **ID generation** — stable node identity derivation

pub mod ids;
pub mod models;
pub mod protocol;
