//! Per-window state.
//!
//! [`WindowStore`] is a map keyed by window handle. [`Registry`] groups the
//! stores the tunnel shares between call sites; create one per process and
//! pass it (as `Rc<Registry>`) to every component.

use crate::bridge::BridgeAwaiters;
use crate::ledger::RequestLedger;
use crate::remote::RemoteWindows;
use interframe_core::WindowId;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Values memoized per window.
///
/// Closures passed in run while the store is borrowed and must not touch
/// the same store.
pub struct WindowStore<V> {
    entries: RefCell<HashMap<WindowId, V>>,
}

impl<V> Default for WindowStore<V> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
        }
    }
}

impl<V: Clone> WindowStore<V> {
    pub fn get(&self, win: WindowId) -> Option<V> {
        self.entries.borrow().get(&win).cloned()
    }

    /// Return the stored value, creating it with `init` on first use.
    pub fn get_or_insert_with(&self, win: WindowId, init: impl FnOnce() -> V) -> V {
        self.entries.borrow_mut().entry(win).or_insert_with(init).clone()
    }
}

impl<V> WindowStore<V> {
    pub fn remove(&self, win: WindowId) -> Option<V> {
        self.entries.borrow_mut().remove(&win)
    }

    /// Remove the entry for `win` only if `pred` holds for it.
    pub fn remove_if(&self, win: WindowId, pred: impl FnOnce(&V) -> bool) -> Option<V> {
        let mut entries = self.entries.borrow_mut();
        if entries.get(&win).is_some_and(pred) {
            entries.remove(&win)
        } else {
            None
        }
    }

    pub fn contains(&self, win: WindowId) -> bool {
        self.entries.borrow().contains_key(&win)
    }

    /// Run `f` on the entry for `win`, if there is one.
    pub fn with<R>(&self, win: WindowId, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.entries.borrow().get(&win).map(f)
    }

    /// Run `f` on the entry for `win` mutably, if there is one.
    pub fn with_mut<R>(&self, win: WindowId, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.entries.borrow_mut().get_mut(&win).map(f)
    }

    pub fn keys(&self) -> Vec<WindowId> {
        self.entries.borrow().keys().copied().collect()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl<V: Default> WindowStore<V> {
    /// Run `f` on the entry for `win`, creating a default entry first.
    pub fn update<R>(&self, win: WindowId, f: impl FnOnce(&mut V) -> R) -> R {
        f(self.entries.borrow_mut().entry(win).or_default())
    }
}

/// Process-wide tunnel state.
#[derive(Default)]
pub struct Registry {
    bridge_awaiters: BridgeAwaiters,
    remote_windows: RemoteWindows,
    requests: RequestLedger,
}

impl Registry {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn bridge_awaiters(&self) -> &BridgeAwaiters {
        &self.bridge_awaiters
    }

    pub fn remote_windows(&self) -> &RemoteWindows {
        &self.remote_windows
    }

    pub fn requests(&self) -> &RequestLedger {
        &self.requests
    }

    /// Tear down everything known about `win`.
    ///
    /// Pending requests are rejected, then the remote registration and any
    /// bridge awaiter are dropped.
    pub fn clean_up_window(&self, win: WindowId) {
        self.requests.clean_up_window(win);
        self.remote_windows.remove(win);
        self.bridge_awaiters.forget(win);
    }

    /// Forget every window. Pending requests are rejected first.
    pub fn clear(&self) {
        for win in self.requests.windows() {
            self.requests.clean_up_window(win);
        }
        self.remote_windows.clear();
        self.bridge_awaiters.clear();
    }
}
