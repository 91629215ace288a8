//! Core types for Interframe.
//!
//! This crate provides the protocol primitives: envelopes, window handles,
//! domain matching and bridge naming. Delivery and tunnelling live in
//! `interframe-tunnel`.

mod config;
mod domain;
mod envelope;
mod window;

pub use config::{
    ConfigError, DEFAULT_BRIDGE_NAME_PREFIX, DEFAULT_BRIDGE_TIMEOUT_MS, DEFAULT_POLL_INTERVAL_MS,
    TunnelConfig,
};
pub use domain::{DomainMatcher, WILDCARD, bridge_name};
pub use envelope::{
    Envelope, EnvelopeError, Message, MessageId, MessageKind, PROTOCOL_KEY, WireMessage,
};
pub use window::WindowId;

/// Lifecycle of a tunnel to a remote window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    /// Registered, handshake not finished yet.
    Pending,
    /// Handshake verified, remote sender installed.
    Live,
    /// Handshake failed; sends fail fast.
    Rejected,
}
