//! Host environment seams.
//!
//! The tunnel never touches browsing contexts directly. Everything it needs
//! from the host goes through [`WindowEnv`], and everything it exchanges with
//! a bridge goes through [`EntryPoint`].

use crate::error::{EnvError, ReceiveError, RemoteError, TunnelError};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use interframe_core::WindowId;
use std::future::Future;
use std::rc::Rc;

/// Capabilities of the host environment, seen from the current window.
pub trait WindowEnv {
    /// The window this code runs in.
    fn current_window(&self) -> WindowId;

    fn is_window_closed(&self, win: WindowId) -> bool;

    fn get_opener(&self, win: WindowId) -> Option<WindowId>;

    /// Find a direct child frame of `win` by name.
    fn get_frame_by_name(&self, win: WindowId, name: &str) -> Option<WindowId>;

    /// Whether `win` is same-domain with the current window (and therefore accessible).
    fn is_same_domain(&self, win: WindowId) -> bool;

    /// Origin of the current document.
    fn get_domain(&self) -> String;

    /// The `name` of a window, if it has one.
    fn window_name(&self, win: WindowId) -> Option<String>;

    /// Whether `win` can only be reached through a bridge.
    fn needs_bridge(&self, win: WindowId) -> bool;

    /// Whether two windows share a top-level window. `None` when unknowable.
    fn is_same_top_window(&self, a: WindowId, b: WindowId) -> Option<bool>;

    /// The protocol entry point installed on `win`, if initialized and accessible.
    fn entry_point(&self, win: WindowId) -> Option<Rc<dyn EntryPoint>>;

    /// The host's low-level dispatch primitive.
    fn post_message(&self, win: WindowId, data: &str, target_origin: &str) -> Result<(), EnvError>;
}

/// A message as seen by the receiving side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessageEvent {
    pub data: String,
    pub origin: String,
    pub source: WindowId,
}

/// The protocol's global entry point on a window.
pub trait EntryPoint {
    /// Hand a serialized message straight to this window's receive loop.
    fn receive_message(&self, event: RawMessageEvent) -> Result<(), EnvError>;

    /// Open a tunnel on behalf of a child window. Only bridges implement this.
    fn open_tunnel_to_parent(
        &self,
        _request: TunnelRequest,
    ) -> LocalBoxFuture<'static, Result<TunnelResponse, TunnelError>> {
        async { Err(TunnelError::Handshake("window is not a bridge".into())) }.boxed_local()
    }
}

/// Handles inbound messages for the caller's RPC layer.
///
/// Implementations own whatever listener/sender handles the RPC layer needs.
/// Completion may be asynchronous.
pub trait MessageReceiver {
    fn receive_message(
        &self,
        event: RawMessageEvent,
    ) -> LocalBoxFuture<'static, Result<(), ReceiveError>>;
}

impl<F, Fut> MessageReceiver for F
where
    F: Fn(RawMessageEvent) -> Fut,
    Fut: Future<Output = Result<(), ReceiveError>> + 'static,
{
    fn receive_message(
        &self,
        event: RawMessageEvent,
    ) -> LocalBoxFuture<'static, Result<(), ReceiveError>> {
        self(event).boxed_local()
    }
}

/// Calling context the bridge supplies when it relays a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayContext {
    pub origin: String,
    pub source: WindowId,
}

/// Relay a bridge calls to deliver a message to the window that opened the tunnel.
///
/// Never fails towards the bridge: closed windows drop the message and
/// handler failures are reported, not returned.
pub trait MessageRelay {
    fn send_message(&self, message: String, context: RelayContext);
}

/// Fire-and-forget sender the bridge hands back for reaching the opener.
pub trait RemoteSender {
    fn send(&self, message: String) -> Result<(), RemoteError>;
}

/// What the child passes to the bridge when opening a tunnel.
pub struct TunnelRequest {
    pub name: String,
    pub source: WindowId,
    /// Liveness probe; the bridge may call it before trusting the channel.
    pub canary: Box<dyn Fn()>,
    pub relay: Rc<dyn MessageRelay>,
}

/// What the bridge returns once the tunnel is open.
pub struct TunnelResponse {
    pub source: WindowId,
    pub origin: String,
    pub send_message: Rc<dyn RemoteSender>,
}
