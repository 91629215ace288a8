//! Remote windows reachable through a bridge.
//!
//! A window is registered as soon as a tunnel to it is attempted. Messages
//! sent to a pending registration are queued on it and flushed when the
//! handshake either installs a sender or rejects the registration; after a
//! rejection every send fails immediately.

use crate::env::RemoteSender;
use crate::error::{RemoteError, TunnelError};
use crate::store::WindowStore;
use interframe_core::{DomainMatcher, TunnelState, WindowId};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::sync::watch;

/// Sender installed by a verified handshake.
#[derive(Clone)]
struct RemoteRoute {
    window: WindowId,
    origin: String,
    sender: Rc<dyn RemoteSender>,
}

impl RemoteRoute {
    fn deliver(
        &self,
        target: WindowId,
        domain: &DomainMatcher,
        message: String,
    ) -> Result<(), RemoteError> {
        if target != self.window {
            return Err(RemoteError::WindowMismatch {
                expected: self.window,
                actual: target,
            });
        }
        if !domain.matches(&self.origin) {
            return Err(RemoteError::DomainMismatch {
                origin: self.origin.clone(),
                domain: domain.to_string(),
            });
        }
        self.sender.send(message)
    }
}

#[derive(Clone)]
enum RemoteState {
    Pending,
    Live(RemoteRoute),
    Rejected(TunnelError),
}

impl RemoteState {
    fn tunnel_state(&self) -> TunnelState {
        match self {
            RemoteState::Pending => TunnelState::Pending,
            RemoteState::Live(_) => TunnelState::Live,
            RemoteState::Rejected(_) => TunnelState::Rejected,
        }
    }

    /// The route of a settled registration. `None` while pending.
    fn route(&self, win: WindowId) -> Option<Result<RemoteRoute, RemoteError>> {
        match self {
            RemoteState::Pending => None,
            RemoteState::Live(route) => Some(Ok(route.clone())),
            RemoteState::Rejected(source) => Some(Err(RemoteError::Rejected {
                window: win,
                source: source.clone(),
            })),
        }
    }
}

struct QueuedMessage {
    domain: DomainMatcher,
    message: String,
}

struct RemoteWindow {
    state: watch::Sender<RemoteState>,
    queued: RefCell<Vec<QueuedMessage>>,
}

impl RemoteWindow {
    fn new() -> Rc<Self> {
        let (state, _) = watch::channel(RemoteState::Pending);
        Rc::new(Self {
            state,
            queued: RefCell::new(Vec::new()),
        })
    }

    fn take_queued(&self) -> Vec<QueuedMessage> {
        std::mem::take(&mut *self.queued.borrow_mut())
    }
}

/// Registered remote windows.
#[derive(Default)]
pub struct RemoteWindows {
    windows: WindowStore<Rc<RemoteWindow>>,
}

impl RemoteWindows {
    /// Register `win` as a remote window candidate.
    ///
    /// A rejected registration goes back to pending so a new negotiation can
    /// settle it. A live one is left as it is.
    pub fn register(&self, win: WindowId) {
        let remote = self.windows.get_or_insert_with(win, RemoteWindow::new);
        remote.state.send_if_modified(|state| {
            if matches!(state, RemoteState::Rejected(_)) {
                *state = RemoteState::Pending;
                true
            } else {
                false
            }
        });
    }

    pub fn is_registered(&self, win: WindowId) -> bool {
        self.windows.contains(win)
    }

    pub fn state(&self, win: WindowId) -> Option<TunnelState> {
        self.windows
            .with(win, |remote| remote.state.borrow().tunnel_state())
    }

    /// Messages waiting for `win`'s handshake to settle.
    pub fn queued_count(&self, win: WindowId) -> usize {
        self.windows
            .with(win, |remote| remote.queued.borrow().len())
            .unwrap_or(0)
    }

    /// Reject the registration for `win`.
    ///
    /// Queued messages are dropped, and pending and future sends fail with `err`.
    pub fn reject(&self, win: WindowId, err: TunnelError) {
        tracing::debug!(%win, error = %err, "rejecting remote window");
        let remote = self.windows.get_or_insert_with(win, RemoteWindow::new);
        remote.state.send_replace(RemoteState::Rejected(err.clone()));

        let dropped = remote.take_queued().len();
        if dropped > 0 {
            tracing::warn!(%win, dropped, error = %err, "queued bridge messages dropped");
        }
    }

    /// Install the sender a bridge returned for `win`, reachable at `origin`,
    /// and flush whatever was queued for it.
    pub fn register_sender(
        &self,
        win: WindowId,
        origin: impl Into<String>,
        sender: Rc<dyn RemoteSender>,
    ) -> Result<(), TunnelError> {
        let remote = self.windows.get(win).ok_or(TunnelError::NotRegistered(win))?;
        let origin = origin.into();
        tracing::debug!(%win, %origin, "remote sender registered");
        let route = RemoteRoute {
            window: win,
            origin,
            sender,
        };
        remote.state.send_replace(RemoteState::Live(route.clone()));

        for queued in remote.take_queued() {
            if let Err(err) = route.deliver(win, &queued.domain, queued.message) {
                tracing::warn!(%win, error = %err, "queued bridge delivery failed");
            }
        }
        Ok(())
    }

    /// Deliver `message` to `win` now, or queue it while the handshake is pending.
    pub fn send_or_queue(
        &self,
        win: WindowId,
        domain: &DomainMatcher,
        message: String,
    ) -> Result<(), RemoteError> {
        let remote = self.windows.get(win).ok_or(RemoteError::NotRegistered(win))?;
        let route = remote.state.borrow().route(win);
        match route {
            Some(route) => route?.deliver(win, domain, message),
            None => {
                tracing::trace!(%win, "tunnel pending, message queued");
                remote.queued.borrow_mut().push(QueuedMessage {
                    domain: domain.clone(),
                    message,
                });
                Ok(())
            }
        }
    }

    /// Deliver `message` to `win`, waiting for a pending handshake to settle.
    pub async fn send(
        &self,
        win: WindowId,
        domain: &DomainMatcher,
        message: String,
    ) -> Result<(), RemoteError> {
        let remote = self.windows.get(win).ok_or(RemoteError::NotRegistered(win))?;
        let mut updates = remote.state.subscribe();
        drop(remote);

        let route = updates
            .wait_for(|state| !matches!(state, RemoteState::Pending))
            .await
            .map_err(|_| RemoteError::NotRegistered(win))?
            .route(win);
        route.ok_or(RemoteError::NotRegistered(win))??.deliver(win, domain, message)
    }

    /// Forget `win`. Sends still waiting on it fail with `NotRegistered`.
    pub fn remove(&self, win: WindowId) {
        if let Some(remote) = self.windows.remove(win) {
            let dropped = remote.take_queued().len();
            if dropped > 0 {
                tracing::warn!(%win, dropped, "queued bridge messages dropped on removal");
            }
        }
    }

    pub fn clear(&self) {
        self.windows.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WIN: WindowId = WindowId::new(7);
    const ORIGIN: &str = "https://parent.example";

    #[derive(Default)]
    struct Recorder(RefCell<Vec<String>>);

    impl RemoteSender for Recorder {
        fn send(&self, message: String) -> Result<(), RemoteError> {
            self.0.borrow_mut().push(message);
            Ok(())
        }
    }

    fn queue(remotes: &RemoteWindows, message: &str) -> Result<(), RemoteError> {
        remotes.send_or_queue(WIN, &DomainMatcher::Any, message.into())
    }

    #[tokio::test]
    async fn send_waits_for_sender() {
        let remotes = RemoteWindows::default();
        remotes.register(WIN);
        assert_eq!(remotes.state(WIN), Some(TunnelState::Pending));

        let recorder = Rc::new(Recorder::default());
        let install = async {
            tokio::task::yield_now().await;
            remotes.register_sender(WIN, ORIGIN, recorder.clone()).unwrap();
        };
        let (sent, ()) = tokio::join!(
            remotes.send(WIN, &DomainMatcher::Any, "hello".into()),
            install
        );

        sent.unwrap();
        assert_eq!(remotes.state(WIN), Some(TunnelState::Live));
        assert_eq!(*recorder.0.borrow(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn rejected_registration_fails_fast() {
        let remotes = RemoteWindows::default();
        remotes.register(WIN);
        remotes.reject(WIN, TunnelError::MissingWindowName);

        let err = remotes
            .send(WIN, &DomainMatcher::Any, "x".into())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RemoteError::Rejected {
                window: WIN,
                source: TunnelError::MissingWindowName
            }
        );
        assert!(queue(&remotes, "x").is_err());
    }

    #[test]
    fn register_reopens_rejected_registration() {
        let remotes = RemoteWindows::default();
        remotes.register(WIN);
        remotes.reject(WIN, TunnelError::BridgeNotFound {
            domain: ORIGIN.into(),
        });
        assert_eq!(remotes.state(WIN), Some(TunnelState::Rejected));

        remotes.register(WIN);
        assert_eq!(remotes.state(WIN), Some(TunnelState::Pending));
        queue(&remotes, "again").unwrap();
        assert_eq!(remotes.queued_count(WIN), 1);
    }

    #[test]
    fn register_keeps_live_registration() {
        let remotes = RemoteWindows::default();
        remotes.register(WIN);
        remotes
            .register_sender(WIN, ORIGIN, Rc::new(Recorder::default()))
            .unwrap();

        remotes.register(WIN);
        assert_eq!(remotes.state(WIN), Some(TunnelState::Live));
    }

    #[test]
    fn register_sender_requires_registration() {
        let remotes = RemoteWindows::default();
        let err = remotes
            .register_sender(WIN, ORIGIN, Rc::new(Recorder::default()))
            .unwrap_err();
        assert_eq!(err, TunnelError::NotRegistered(WIN));
    }

    #[test]
    fn route_checks_domain() {
        let remotes = RemoteWindows::default();
        remotes.register(WIN);
        remotes
            .register_sender(WIN, ORIGIN, Rc::new(Recorder::default()))
            .unwrap();

        let evil = DomainMatcher::from("https://evil.example");
        let result = remotes.send_or_queue(WIN, &evil, "x".into());
        assert!(matches!(result, Err(RemoteError::DomainMismatch { .. })));

        let result = remotes.send_or_queue(WIN, &DomainMatcher::from(ORIGIN), "x".into());
        assert_eq!(result, Ok(()));
    }

    #[test]
    fn pending_messages_flush_in_order_on_sender() {
        let remotes = RemoteWindows::default();
        remotes.register(WIN);
        queue(&remotes, "one").unwrap();
        queue(&remotes, "two").unwrap();
        assert_eq!(remotes.queued_count(WIN), 2);

        let recorder = Rc::new(Recorder::default());
        remotes.register_sender(WIN, ORIGIN, recorder.clone()).unwrap();

        assert_eq!(*recorder.0.borrow(), vec!["one", "two"]);
        assert_eq!(remotes.queued_count(WIN), 0);
    }

    #[test]
    fn reject_drops_queued_messages() {
        let remotes = RemoteWindows::default();
        remotes.register(WIN);
        queue(&remotes, "lost").unwrap();

        remotes.reject(WIN, TunnelError::MissingWindowName);

        assert_eq!(remotes.queued_count(WIN), 0);
    }

    #[test]
    fn unregistered_window_is_an_error() {
        let remotes = RemoteWindows::default();
        assert_eq!(queue(&remotes, "x"), Err(RemoteError::NotRegistered(WIN)));
    }
}
