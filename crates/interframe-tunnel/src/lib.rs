//! Cross-window delivery for Interframe.
//!
//! Three pieces sit on top of the host environment ([`WindowEnv`]):
//!
//! - [`MessageSender`] encodes a message and tries every delivery strategy.
//! - [`TunnelNegotiator`] opens a bridge tunnel to a cross-domain opener.
//! - [`RequestLedger`] tracks in-flight requests and rejects them on teardown.
//!
//! Shared per-window state lives in a [`Registry`] that callers create once
//! and pass around. Everything is single-threaded and futures are `!Send`.
//! Nothing is spawned: sends to a pending tunnel are queued on its
//! registration, and relayed messages wait in a [`RelayInbox`] until its
//! owner drains or runs it.

mod bridge;
mod env;
mod error;
mod ledger;
pub mod memory;
mod remote;
pub mod retry;
mod send;
mod store;
mod strategy;

pub use bridge::{BridgeAwaiters, RelayInbox, TunnelNegotiator, TunnelOutcome};
pub use env::{
    EntryPoint, MessageReceiver, MessageRelay, RawMessageEvent, RelayContext, RemoteSender,
    TunnelRequest, TunnelResponse, WindowEnv,
};
pub use error::{
    EnvError, ReceiveError, RemoteError, RequestError, SendError, StrategyError, StrategyFailure,
    TunnelError,
};
pub use ledger::{PendingResponse, RequestLedger};
pub use remote::RemoteWindows;
pub use send::{JsonSerializer, MessageSender, WireSerializer};
pub use store::{Registry, WindowStore};
pub use strategy::{
    BridgeStrategy, GlobalStrategy, PostMessageStrategy, SendStrategy, default_strategies,
};
