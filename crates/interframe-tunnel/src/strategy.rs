//! Delivery strategies.
//!
//! Each strategy is one concrete way of getting an encoded message into a
//! target window. [`default_strategies`] lists them in the order the send
//! chain tries them.

use crate::env::{RawMessageEvent, WindowEnv};
use crate::error::StrategyError;
use crate::store::Registry;
use interframe_core::{DomainMatcher, WindowId};
use std::rc::Rc;

/// One mechanism for delivering an encoded message.
pub trait SendStrategy {
    fn name(&self) -> &'static str;

    fn attempt(
        &self,
        win: WindowId,
        message: &str,
        domain: &DomainMatcher,
    ) -> Result<(), StrategyError>;
}

/// Built-in strategies: post message, bridge, global.
pub fn default_strategies(
    env: Rc<dyn WindowEnv>,
    registry: Rc<Registry>,
) -> Vec<Box<dyn SendStrategy>> {
    vec![
        Box::new(PostMessageStrategy::new(env.clone())),
        Box::new(BridgeStrategy::new(env.clone(), registry)),
        Box::new(GlobalStrategy::new(env)),
    ]
}

/// Dispatch through the host primitive, once per target origin.
pub struct PostMessageStrategy {
    env: Rc<dyn WindowEnv>,
}

impl PostMessageStrategy {
    pub const NAME: &'static str = "post_message";

    pub fn new(env: Rc<dyn WindowEnv>) -> Self {
        Self { env }
    }
}

impl SendStrategy for PostMessageStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn attempt(
        &self,
        win: WindowId,
        message: &str,
        domain: &DomainMatcher,
    ) -> Result<(), StrategyError> {
        for origin in domain.target_origins() {
            self.env
                .post_message(win, message, &origin)
                .map_err(|source| StrategyError::Dispatch {
                    strategy: Self::NAME,
                    source,
                })?;
        }
        Ok(())
    }
}

/// Route through the tunnel registered for a cross-domain popup.
pub struct BridgeStrategy {
    env: Rc<dyn WindowEnv>,
    registry: Rc<Registry>,
}

impl BridgeStrategy {
    pub const NAME: &'static str = "bridge";

    pub fn new(env: Rc<dyn WindowEnv>, registry: Rc<Registry>) -> Self {
        Self { env, registry }
    }

    fn unavailable(reason: &str) -> StrategyError {
        StrategyError::Unavailable {
            strategy: Self::NAME,
            reason: reason.to_string(),
        }
    }
}

impl SendStrategy for BridgeStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    /// Delivers immediately once the tunnel is live. While the handshake is
    /// still pending the message is queued on the registration and flushed
    /// when it settles.
    fn attempt(
        &self,
        win: WindowId,
        message: &str,
        domain: &DomainMatcher,
    ) -> Result<(), StrategyError> {
        if self.env.is_same_domain(win) {
            return Err(Self::unavailable("disabled between same domain windows"));
        }
        if self.env.is_same_top_window(self.env.current_window(), win) != Some(false) {
            return Err(Self::unavailable(
                "can only bridge between two different windows, not between frames",
            ));
        }

        self.registry
            .remote_windows()
            .send_or_queue(win, domain, message.to_string())
            .map_err(|source| StrategyError::Remote {
                strategy: Self::NAME,
                source,
            })
    }
}

/// Hand the message straight to a same-domain window's entry point.
pub struct GlobalStrategy {
    env: Rc<dyn WindowEnv>,
}

impl GlobalStrategy {
    pub const NAME: &'static str = "global";

    pub fn new(env: Rc<dyn WindowEnv>) -> Self {
        Self { env }
    }

    fn unavailable(reason: &str) -> StrategyError {
        StrategyError::Unavailable {
            strategy: Self::NAME,
            reason: reason.to_string(),
        }
    }
}

impl SendStrategy for GlobalStrategy {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn attempt(
        &self,
        win: WindowId,
        message: &str,
        _domain: &DomainMatcher,
    ) -> Result<(), StrategyError> {
        if !self.env.is_same_domain(win) {
            return Err(Self::unavailable("disabled between different domain windows"));
        }
        let current = self.env.current_window();
        if self.env.is_same_top_window(current, win) != Some(false) {
            return Err(Self::unavailable(
                "can only use global between two different windows, not between frames",
            ));
        }
        let entry = self
            .env
            .entry_point(win)
            .ok_or_else(|| Self::unavailable("no protocol entry point on foreign window"))?;

        entry
            .receive_message(RawMessageEvent {
                data: message.to_string(),
                origin: self.env.get_domain(),
                source: current,
            })
            .map_err(|source| StrategyError::Dispatch {
                strategy: Self::NAME,
                source,
            })
    }
}
