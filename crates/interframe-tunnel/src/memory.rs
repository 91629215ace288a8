//! In-memory browsing contexts.
//!
//! [`MemoryEnv`] models a set of windows, frames and popups with origins,
//! names and openers. [`MemoryBridge`] is a scripted bridge entry point.
//! Both exist for tests and demos; nothing here talks to a real browser.

use crate::env::{
    EntryPoint, MessageRelay, RawMessageEvent, RelayContext, RemoteSender, TunnelRequest,
    TunnelResponse, WindowEnv,
};
use crate::error::{EnvError, RemoteError, TunnelError};
use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use interframe_core::{WILDCARD, WindowId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

/// A message the host primitive accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub data: String,
    pub target_origin: String,
    pub source: WindowId,
}

struct MemoryWindow {
    origin: String,
    name: Option<String>,
    opener: Option<WindowId>,
    parent: Option<WindowId>,
    closed: bool,
    refuse_posts: bool,
    entry: Option<Rc<dyn EntryPoint>>,
    inbox: Vec<PostedMessage>,
}

impl MemoryWindow {
    fn new(origin: String, parent: Option<WindowId>, name: Option<String>) -> Self {
        Self {
            origin,
            name,
            opener: None,
            parent,
            closed: false,
            refuse_posts: false,
            entry: None,
            inbox: Vec::new(),
        }
    }
}

/// In-memory window environment, seen from one current window.
pub struct MemoryEnv {
    current: WindowId,
    next_id: Cell<u64>,
    windows: RefCell<HashMap<WindowId, MemoryWindow>>,
}

impl MemoryEnv {
    /// Environment whose current window is a top-level window at `origin`.
    pub fn new(origin: impl Into<String>) -> Rc<Self> {
        let current = WindowId::new(1);
        let mut windows = HashMap::new();
        windows.insert(current, MemoryWindow::new(origin.into(), None, None));
        Rc::new(Self {
            current,
            next_id: Cell::new(2),
            windows: RefCell::new(windows),
        })
    }

    fn allocate(&self, window: MemoryWindow) -> WindowId {
        let id = WindowId::new(self.next_id.get());
        self.next_id.set(id.raw() + 1);
        self.windows.borrow_mut().insert(id, window);
        id
    }

    fn update(&self, win: WindowId, f: impl FnOnce(&mut MemoryWindow)) {
        if let Some(window) = self.windows.borrow_mut().get_mut(&win) {
            f(window);
        }
    }

    fn origin_of(&self, win: WindowId) -> Option<String> {
        self.windows.borrow().get(&win).map(|w| w.origin.clone())
    }

    fn top(&self, win: WindowId) -> Option<WindowId> {
        let windows = self.windows.borrow();
        let mut current = win;
        loop {
            match windows.get(&current)?.parent {
                Some(parent) => current = parent,
                None => return Some(current),
            }
        }
    }

    /// Add a top-level window at `origin`.
    pub fn add_window(&self, origin: impl Into<String>) -> WindowId {
        self.allocate(MemoryWindow::new(origin.into(), None, None))
    }

    /// Add a named frame inside `parent`.
    pub fn add_frame(
        &self,
        parent: WindowId,
        origin: impl Into<String>,
        name: impl Into<String>,
    ) -> WindowId {
        self.allocate(MemoryWindow::new(origin.into(), Some(parent), Some(name.into())))
    }

    pub fn set_opener(&self, win: WindowId, opener: WindowId) {
        self.update(win, |w| w.opener = Some(opener));
    }

    pub fn set_name(&self, win: WindowId, name: impl Into<String>) {
        let name = name.into();
        self.update(win, |w| w.name = Some(name));
    }

    /// Mark the protocol as initialized on `win`.
    pub fn install_entry_point(&self, win: WindowId, entry: Rc<dyn EntryPoint>) {
        self.update(win, |w| w.entry = Some(entry));
    }

    pub fn close(&self, win: WindowId) {
        self.update(win, |w| w.closed = true);
    }

    /// Make the host primitive fail for `win`.
    pub fn refuse_posts(&self, win: WindowId) {
        self.update(win, |w| w.refuse_posts = true);
    }

    /// Messages the host primitive delivered to `win`.
    pub fn posted(&self, win: WindowId) -> Vec<PostedMessage> {
        self.windows
            .borrow()
            .get(&win)
            .map(|w| w.inbox.clone())
            .unwrap_or_default()
    }
}

impl WindowEnv for MemoryEnv {
    fn current_window(&self) -> WindowId {
        self.current
    }

    fn is_window_closed(&self, win: WindowId) -> bool {
        self.windows.borrow().get(&win).is_none_or(|w| w.closed)
    }

    fn get_opener(&self, win: WindowId) -> Option<WindowId> {
        self.windows.borrow().get(&win)?.opener
    }

    fn get_frame_by_name(&self, win: WindowId, name: &str) -> Option<WindowId> {
        self.windows
            .borrow()
            .iter()
            .filter(|(_, w)| w.parent == Some(win) && !w.closed)
            .find(|(_, w)| w.name.as_deref() == Some(name))
            .map(|(id, _)| *id)
    }

    fn is_same_domain(&self, win: WindowId) -> bool {
        match (self.origin_of(win), self.origin_of(self.current)) {
            (Some(theirs), Some(ours)) => theirs == ours,
            _ => false,
        }
    }

    fn get_domain(&self) -> String {
        self.origin_of(self.current).unwrap_or_default()
    }

    fn window_name(&self, win: WindowId) -> Option<String> {
        self.windows.borrow().get(&win)?.name.clone()
    }

    fn needs_bridge(&self, win: WindowId) -> bool {
        !self.is_same_domain(win) && self.is_same_top_window(self.current, win) == Some(false)
    }

    fn is_same_top_window(&self, a: WindowId, b: WindowId) -> Option<bool> {
        Some(self.top(a)? == self.top(b)?)
    }

    fn entry_point(&self, win: WindowId) -> Option<Rc<dyn EntryPoint>> {
        // Cross-domain globals are not readable.
        if !self.is_same_domain(win) {
            return None;
        }
        self.windows.borrow().get(&win)?.entry.clone()
    }

    fn post_message(&self, win: WindowId, data: &str, target_origin: &str) -> Result<(), EnvError> {
        let source = self.current;
        let mut windows = self.windows.borrow_mut();
        let window = windows
            .get_mut(&win)
            .ok_or_else(|| EnvError::new(format!("unknown window {win}")))?;

        if window.closed {
            return Err(EnvError::new(format!("window {win} is closed")));
        }
        if window.refuse_posts {
            return Err(EnvError::new(format!("window {win} refused the message")));
        }
        if target_origin != WILDCARD && target_origin != window.origin {
            tracing::trace!(%win, target_origin, "origin mismatch, message dropped");
            return Ok(());
        }

        window.inbox.push(PostedMessage {
            data: data.to_string(),
            target_origin: target_origin.to_string(),
            source,
        });
        Ok(())
    }
}

struct OpenTunnel {
    name: String,
    source: WindowId,
    relay: Rc<dyn MessageRelay>,
}

struct ForwardingSender {
    forwarded: Rc<RefCell<Vec<String>>>,
}

impl RemoteSender for ForwardingSender {
    fn send(&self, message: String) -> Result<(), RemoteError> {
        self.forwarded.borrow_mut().push(message);
        Ok(())
    }
}

/// Scripted bridge living in a frame of `parent`.
pub struct MemoryBridge {
    parent: WindowId,
    origin: String,
    respond_as: Cell<Option<WindowId>>,
    failure: RefCell<Option<String>>,
    canary_calls: Cell<usize>,
    tunnels: RefCell<Vec<OpenTunnel>>,
    forwarded: Rc<RefCell<Vec<String>>>,
    received: RefCell<Vec<RawMessageEvent>>,
}

impl MemoryBridge {
    /// Bridge that answers handshakes as `parent`, reachable at `origin`.
    pub fn new(parent: WindowId, origin: impl Into<String>) -> Rc<Self> {
        Rc::new(Self {
            parent,
            origin: origin.into(),
            respond_as: Cell::new(None),
            failure: RefCell::new(None),
            canary_calls: Cell::new(0),
            tunnels: RefCell::new(Vec::new()),
            forwarded: Rc::new(RefCell::new(Vec::new())),
            received: RefCell::new(Vec::new()),
        })
    }

    /// Answer handshakes claiming to be `source` instead of the parent.
    pub fn respond_as(&self, source: WindowId) {
        self.respond_as.set(Some(source));
    }

    /// Fail every handshake with `reason`.
    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.borrow_mut() = Some(reason.into());
    }

    pub fn canary_calls(&self) -> usize {
        self.canary_calls.get()
    }

    /// Name and source of every tunnel opened so far.
    pub fn tunnels(&self) -> Vec<(String, WindowId)> {
        self.tunnels
            .borrow()
            .iter()
            .map(|t| (t.name.clone(), t.source))
            .collect()
    }

    /// Push `message` down every open tunnel, as if it came from the parent.
    pub fn relay(&self, message: &str) -> usize {
        let relays: Vec<_> = self.tunnels.borrow().iter().map(|t| t.relay.clone()).collect();
        for relay in &relays {
            relay.send_message(
                message.to_string(),
                RelayContext {
                    origin: self.origin.clone(),
                    source: self.parent,
                },
            );
        }
        relays.len()
    }

    /// Messages the child sent to the parent through this bridge.
    pub fn forwarded(&self) -> Vec<String> {
        self.forwarded.borrow().clone()
    }

    /// Messages handed to this bridge's own entry point.
    pub fn received(&self) -> Vec<RawMessageEvent> {
        self.received.borrow().clone()
    }
}

impl EntryPoint for MemoryBridge {
    fn receive_message(&self, event: RawMessageEvent) -> Result<(), EnvError> {
        self.received.borrow_mut().push(event);
        Ok(())
    }

    fn open_tunnel_to_parent(
        &self,
        request: TunnelRequest,
    ) -> LocalBoxFuture<'static, Result<TunnelResponse, TunnelError>> {
        (request.canary)();
        self.canary_calls.set(self.canary_calls.get() + 1);

        if let Some(reason) = self.failure.borrow().clone() {
            return async move { Err(TunnelError::Handshake(reason)) }.boxed_local();
        }

        self.tunnels.borrow_mut().push(OpenTunnel {
            name: request.name,
            source: request.source,
            relay: request.relay,
        });

        let response = TunnelResponse {
            source: self.respond_as.get().unwrap_or(self.parent),
            origin: self.origin.clone(),
            send_message: Rc::new(ForwardingSender {
                forwarded: self.forwarded.clone(),
            }),
        };
        async move { Ok(response) }.boxed_local()
    }
}
