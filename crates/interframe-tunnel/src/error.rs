//! Error types.

use interframe_core::{EnvelopeError, WindowId};

/// Failure reported by the host environment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct EnvError(pub String);

impl EnvError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Failure reported by the inbound message receiver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ReceiveError(pub String);

impl ReceiveError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Why a single delivery strategy did not deliver a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrategyError {
    /// The strategy does not apply to this target.
    #[error("{strategy} unavailable: {reason}")]
    Unavailable {
        strategy: &'static str,
        reason: String,
    },
    /// The strategy applied but dispatch failed.
    #[error("{strategy} dispatch failed: {source}")]
    Dispatch {
        strategy: &'static str,
        source: EnvError,
    },
    /// Routing through a registered remote window failed.
    #[error("{strategy} routing failed: {source}")]
    Remote {
        strategy: &'static str,
        source: RemoteError,
    },
}

/// One strategy's failure, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub error: StrategyError,
}

/// Error sending a message to a window.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("window {0} is closed")]
    WindowClosed(WindowId),
    #[error(transparent)]
    Encode(#[from] EnvelopeError),
    #[error("no send strategies configured")]
    NoStrategies,
    /// Every strategy failed. Reports the first failure in declared order.
    #[error("all send strategies failed: {first}")]
    AllStrategiesFailed {
        #[source]
        first: StrategyError,
        failures: Vec<StrategyFailure>,
    },
}

impl SendError {
    /// Every per-strategy failure, in declared order.
    pub fn failures(&self) -> &[StrategyFailure] {
        match self {
            SendError::AllStrategiesFailed { failures, .. } => failures,
            _ => &[],
        }
    }
}

/// Error negotiating a tunnel through a bridge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TunnelError {
    #[error("bridge not found for domain: {domain}")]
    BridgeNotFound { domain: String },
    #[error("can not register with opener: window does not have a name")]
    MissingWindowName,
    #[error("source does not match opener: expected {expected}, got {actual}")]
    SourceMismatch { expected: WindowId, actual: WindowId },
    #[error("remote window {0} is not registered")]
    NotRegistered(WindowId),
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Error routing a message through a registered remote window.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote window {0} is not registered")]
    NotRegistered(WindowId),
    #[error("tunnel to {window} was rejected: {source}")]
    Rejected {
        window: WindowId,
        source: TunnelError,
    },
    #[error("remote window {actual} does not match window {expected}")]
    WindowMismatch { expected: WindowId, actual: WindowId },
    #[error("remote domain {origin} does not match domain {domain}")]
    DomainMismatch { origin: String, domain: String },
    #[error("remote send failed: {0}")]
    Send(String),
}

/// Error settling a pending request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("window {0} cleaned up before response")]
    WindowCleanedUp(WindowId),
    #[error("request abandoned before response")]
    Abandoned,
    #[error("request failed: {0}")]
    Failed(String),
}
