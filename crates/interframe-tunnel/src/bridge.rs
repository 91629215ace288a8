//! Bridge tunnels to a cross-domain opener.
//!
//! A popup cannot address a cross-domain opener directly. Instead it looks
//! for a bridge frame its own domain publishes inside the opener, waits for
//! the bridge to initialize, and asks it to open a tunnel. The bridge then
//! relays the opener's messages down to the popup and hands back a sender
//! for the other direction.
//!
//! ```text
//! open_tunnel_to_opener
//!   no opener ............................ NoOpener
//!   opener reachable directly ............ BridgeNotNeeded
//!   register opener (pending)
//!   await bridge frame (poll 100, give up at 2000)
//!   window has no name ................... MissingName (registration rejected)
//!   handshake, verify source == opener
//!   install opener's sender .............. Established
//! ```
//!
//! Messages the bridge relays back land in the negotiator's [`RelayInbox`].
//! The relay only enqueues; the inbox owner runs the receiver.

use crate::env::{
    MessageReceiver, MessageRelay, RawMessageEvent, RelayContext, TunnelRequest, WindowEnv,
};
use crate::error::TunnelError;
use crate::retry;
use crate::store::{Registry, WindowStore};
use futures_util::FutureExt;
use futures_util::future::{LocalBoxFuture, Shared};
use interframe_core::{TunnelConfig, WindowId};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::mpsc;

type BridgeProbe = Shared<LocalBoxFuture<'static, Result<WindowId, TunnelError>>>;

/// One bridge probe per opener, shared by everyone negotiating with it.
///
/// A probe that fails is forgotten once it settles, so a later negotiation
/// looks for the bridge again.
#[derive(Default)]
pub struct BridgeAwaiters {
    probes: WindowStore<BridgeProbe>,
}

impl BridgeAwaiters {
    /// Wait for the bridge frame inside `win`, starting a probe if none is running.
    pub async fn await_bridge(
        &self,
        env: Rc<dyn WindowEnv>,
        win: WindowId,
        config: &TunnelConfig,
    ) -> Result<WindowId, TunnelError> {
        let probe = self.probes.get_or_insert_with(win, || {
            probe_bridge(env, win, config.clone()).boxed_local().shared()
        });

        let result = probe.clone().await;
        if result.is_err() {
            self.probes.remove_if(win, |stored| stored.ptr_eq(&probe));
        }
        result
    }

    pub fn is_probing(&self, win: WindowId) -> bool {
        self.probes.contains(win)
    }

    pub(crate) fn forget(&self, win: WindowId) {
        self.probes.remove(win);
    }

    pub(crate) fn clear(&self) {
        self.probes.clear();
    }
}

async fn probe_bridge(
    env: Rc<dyn WindowEnv>,
    win: WindowId,
    config: TunnelConfig,
) -> Result<WindowId, TunnelError> {
    let domain = env.get_domain();
    let name = config.bridge_name(&domain);

    let Some(frame) = env.get_frame_by_name(win, &name) else {
        tracing::debug!(%win, %name, "no bridge frame");
        return Err(TunnelError::BridgeNotFound { domain });
    };

    let ready = || env.is_same_domain(frame) && env.entry_point(frame).is_some();
    if ready() {
        return Ok(frame);
    }

    tracing::debug!(%win, %frame, "waiting for bridge to initialize");
    retry::poll_until(config.poll_interval(), config.bridge_timeout(), || {
        ready().then_some(frame)
    })
    .await
    .map_err(|_| TunnelError::BridgeNotFound { domain })
}

/// How a negotiation ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TunnelOutcome {
    /// This window has no opener.
    NoOpener,
    /// The opener is reachable without a bridge.
    BridgeNotNeeded,
    /// This window has no name; the opener's registration was rejected.
    MissingName,
    /// The tunnel is open and the opener's sender is installed.
    Established { opener: WindowId, origin: String },
}

/// Opens a tunnel from the current window to its opener.
pub struct TunnelNegotiator {
    env: Rc<dyn WindowEnv>,
    registry: Rc<Registry>,
    config: TunnelConfig,
    relayed: mpsc::UnboundedSender<RawMessageEvent>,
    inbox: RefCell<Option<RelayInbox>>,
}

impl TunnelNegotiator {
    pub fn new(
        env: Rc<dyn WindowEnv>,
        registry: Rc<Registry>,
        receiver: Rc<dyn MessageReceiver>,
    ) -> Self {
        let (relayed, events) = mpsc::unbounded_channel();
        Self {
            env,
            registry,
            config: TunnelConfig::default(),
            relayed,
            inbox: RefCell::new(Some(RelayInbox { events, receiver })),
        }
    }

    pub fn with_config(mut self, config: TunnelConfig) -> Self {
        self.config = config;
        self
    }

    /// Where messages relayed through this negotiator's tunnels are buffered.
    /// Can only be taken once.
    pub fn take_inbox(&self) -> Option<RelayInbox> {
        self.inbox.borrow_mut().take()
    }

    /// Negotiate a tunnel to the opener, if one is needed.
    ///
    /// Every failure after the opener is registered is also recorded on the
    /// registration, so sends waiting on it fail instead of hanging.
    pub async fn open_tunnel_to_opener(&self) -> Result<TunnelOutcome, TunnelError> {
        let current = self.env.current_window();
        let Some(opener) = self.env.get_opener(current) else {
            return Ok(TunnelOutcome::NoOpener);
        };

        if !self.env.needs_bridge(opener) {
            tracing::debug!(%opener, "opener reachable without bridge");
            return Ok(TunnelOutcome::BridgeNotNeeded);
        }

        let remotes = self.registry.remote_windows();
        remotes.register(opener);

        let bridge = match self
            .registry
            .bridge_awaiters()
            .await_bridge(self.env.clone(), opener, &self.config)
            .await
        {
            Ok(bridge) => bridge,
            Err(err) => {
                remotes.reject(opener, err.clone());
                return Err(err);
            }
        };

        let Some(name) = self.env.window_name(current).filter(|name| !name.is_empty()) else {
            remotes.reject(opener, TunnelError::MissingWindowName);
            return Ok(TunnelOutcome::MissingName);
        };

        match self.handshake(current, opener, bridge, name).await {
            Ok(origin) => {
                tracing::debug!(%opener, %origin, "tunnel to opener established");
                Ok(TunnelOutcome::Established { opener, origin })
            }
            Err(err) => {
                tracing::warn!(%opener, error = %err, "tunnel handshake failed");
                remotes.reject(opener, err.clone());
                Err(err)
            }
        }
    }

    async fn handshake(
        &self,
        current: WindowId,
        opener: WindowId,
        bridge: WindowId,
        name: String,
    ) -> Result<String, TunnelError> {
        let entry = self.env.entry_point(bridge).ok_or_else(|| {
            TunnelError::Handshake(format!("bridge {bridge} lost its entry point"))
        })?;

        let request = TunnelRequest {
            name,
            source: current,
            canary: Box::new(|| {}),
            relay: Rc::new(TunnelRelay {
                env: self.env.clone(),
                window: current,
                relayed: self.relayed.clone(),
            }),
        };

        let response = entry.open_tunnel_to_parent(request).await?;
        if response.source != opener {
            return Err(TunnelError::SourceMismatch {
                expected: opener,
                actual: response.source,
            });
        }

        self.registry.remote_windows().register_sender(
            response.source,
            response.origin.clone(),
            response.send_message,
        )?;
        Ok(response.origin)
    }
}

/// Relayed messages waiting for the receiver.
pub struct RelayInbox {
    events: mpsc::UnboundedReceiver<RawMessageEvent>,
    receiver: Rc<dyn MessageReceiver>,
}

impl RelayInbox {
    /// Hand relayed messages to the receiver in arrival order, until the
    /// negotiator and every relay it handed out are dropped.
    pub async fn run(mut self) {
        while let Some(event) = self.events.recv().await {
            self.deliver(event).await;
        }
    }

    /// Hand over the messages relayed so far. Returns how many there were.
    pub async fn drain(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(event) = self.events.try_recv() {
            self.deliver(event).await;
            delivered += 1;
        }
        delivered
    }

    async fn deliver(&self, event: RawMessageEvent) {
        let source = event.source;
        if let Err(err) = self.receiver.receive_message(event).await {
            tracing::warn!(%source, error = %err, "relayed message handler failed");
        }
    }
}

/// Relay the bridge calls to deliver messages to this window.
struct TunnelRelay {
    env: Rc<dyn WindowEnv>,
    window: WindowId,
    relayed: mpsc::UnboundedSender<RawMessageEvent>,
}

impl MessageRelay for TunnelRelay {
    fn send_message(&self, message: String, context: RelayContext) {
        if self.env.is_window_closed(self.window) {
            tracing::trace!(window = %self.window, "window closed, relayed message dropped");
            return;
        }

        let event = RawMessageEvent {
            data: message,
            origin: context.origin,
            source: context.source,
        };
        if self.relayed.send(event).is_err() {
            tracing::debug!(window = %self.window, "relay inbox gone, message dropped");
        }
    }
}
