//! The send-strategy chain.

use crate::env::WindowEnv;
use crate::error::{SendError, StrategyFailure};
use crate::store::Registry;
use crate::strategy::{SendStrategy, default_strategies};
use interframe_core::{DomainMatcher, EnvelopeError, Message, MessageId, WindowId, WireMessage};
use std::rc::Rc;

/// Turns a wire message into what the transport carries.
///
/// Gets the target and domain because some transports need origin-aware
/// encoding.
pub trait WireSerializer {
    fn serialize(
        &self,
        win: WindowId,
        domain: &DomainMatcher,
        message: &WireMessage,
    ) -> Result<String, EnvelopeError>;
}

/// Plain JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl WireSerializer for JsonSerializer {
    fn serialize(
        &self,
        _win: WindowId,
        _domain: &DomainMatcher,
        message: &WireMessage,
    ) -> Result<String, EnvelopeError> {
        message.to_json()
    }
}

/// Sends envelopes to windows by trying every strategy in order.
///
/// Every strategy runs on every send, even after one has succeeded. The
/// send succeeds if at least one strategy did.
pub struct MessageSender {
    env: Rc<dyn WindowEnv>,
    serializer: Box<dyn WireSerializer>,
    strategies: Vec<Box<dyn SendStrategy>>,
}

impl MessageSender {
    /// Sender with the built-in strategies and JSON serialization.
    pub fn new(env: Rc<dyn WindowEnv>, registry: Rc<Registry>) -> Self {
        let strategies = default_strategies(env.clone(), registry);
        Self::with_strategies(env, strategies)
    }

    pub fn with_strategies(env: Rc<dyn WindowEnv>, strategies: Vec<Box<dyn SendStrategy>>) -> Self {
        Self {
            env,
            serializer: Box::new(JsonSerializer),
            strategies,
        }
    }

    pub fn with_serializer(mut self, serializer: impl WireSerializer + 'static) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|strategy| strategy.name()).collect()
    }

    /// Encode `message` and deliver it to `win`. Returns the envelope id.
    pub fn send_message(
        &self,
        win: WindowId,
        domain: &DomainMatcher,
        message: Message,
    ) -> Result<MessageId, SendError> {
        if self.env.is_window_closed(win) {
            return Err(SendError::WindowClosed(win));
        }

        let wire = WireMessage::encode(message);
        let serialized = self.serializer.serialize(win, domain, &wire)?;

        let mut delivered = false;
        let mut failures = Vec::new();
        for strategy in &self.strategies {
            match strategy.attempt(win, &serialized, domain) {
                Ok(()) => delivered = true,
                Err(error) => failures.push(StrategyFailure {
                    strategy: strategy.name(),
                    error,
                }),
            }
        }

        if delivered {
            if !failures.is_empty() {
                tracing::trace!(
                    %win,
                    id = %wire.id(),
                    failed = failures.len(),
                    "some strategies failed"
                );
            }
            return Ok(wire.id().clone());
        }

        match failures.first() {
            Some(first) => Err(SendError::AllStrategiesFailed {
                first: first.error.clone(),
                failures,
            }),
            None => Err(SendError::NoStrategies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EnvError, StrategyError};
    use crate::memory::{MemoryBridge, MemoryEnv};
    use crate::strategy::{BridgeStrategy, GlobalStrategy, PostMessageStrategy};
    use interframe_core::{MessageKind, PROTOCOL_KEY};
    use serde_json::json;
    use std::cell::Cell;

    const CHILD: &str = "https://child.example";
    const PARENT: &str = "https://parent.example";

    struct Scripted {
        name: &'static str,
        fails: bool,
        calls: Rc<Cell<usize>>,
    }

    impl Scripted {
        fn boxed(name: &'static str, fails: bool) -> (Box<dyn SendStrategy>, Rc<Cell<usize>>) {
            let calls = Rc::new(Cell::new(0));
            let strategy = Scripted {
                name,
                fails,
                calls: calls.clone(),
            };
            (Box::new(strategy), calls)
        }
    }

    impl SendStrategy for Scripted {
        fn name(&self) -> &'static str {
            self.name
        }

        fn attempt(
            &self,
            _win: WindowId,
            _message: &str,
            _domain: &DomainMatcher,
        ) -> Result<(), StrategyError> {
            self.calls.set(self.calls.get() + 1);
            if self.fails {
                Err(StrategyError::Dispatch {
                    strategy: self.name,
                    source: EnvError::new(format!("{} broke", self.name)),
                })
            } else {
                Ok(())
            }
        }
    }

    fn scripted_sender(
        env: Rc<MemoryEnv>,
        plan: &[(&'static str, bool)],
    ) -> (MessageSender, Vec<Rc<Cell<usize>>>) {
        let (strategies, calls): (Vec<_>, Vec<_>) = plan
            .iter()
            .map(|&(name, fails)| Scripted::boxed(name, fails))
            .unzip();
        (MessageSender::with_strategies(env, strategies), calls)
    }

    fn ping() -> Message {
        Message::request("ping", json!({ "n": 1 }))
    }

    #[test]
    fn runs_every_strategy_even_after_success() {
        let env = MemoryEnv::new(CHILD);
        let target = env.add_window(PARENT);
        let (sender, calls) = scripted_sender(env, &[("a", false), ("b", true), ("c", false)]);

        sender.send_message(target, &DomainMatcher::Any, ping()).unwrap();

        assert!(calls.iter().all(|c| c.get() == 1));
    }

    #[test]
    fn reports_first_failure_when_all_fail() {
        let env = MemoryEnv::new(CHILD);
        let target = env.add_window(PARENT);
        let (sender, calls) = scripted_sender(env, &[("a", true), ("b", true)]);

        let err = sender.send_message(target, &DomainMatcher::Any, ping()).unwrap_err();

        let SendError::AllStrategiesFailed { first, failures } = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(first.to_string().contains("a broke"));
        let names: Vec<_> = failures.iter().map(|f| f.strategy).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(err.failures().len(), 2);
        assert!(calls.iter().all(|c| c.get() == 1));
    }

    #[test]
    fn closed_window_fails_without_attempts() {
        let env = MemoryEnv::new(CHILD);
        let target = env.add_window(PARENT);
        env.close(target);
        let (sender, calls) = scripted_sender(env, &[("a", false)]);

        let err = sender.send_message(target, &DomainMatcher::Any, ping()).unwrap_err();

        assert!(matches!(err, SendError::WindowClosed(win) if win == target));
        assert_eq!(calls[0].get(), 0);
    }

    #[test]
    fn empty_chain_is_an_error() {
        let env = MemoryEnv::new(CHILD);
        let target = env.add_window(PARENT);
        let sender = MessageSender::with_strategies(env, Vec::new());

        let err = sender.send_message(target, &DomainMatcher::Any, ping()).unwrap_err();
        assert!(matches!(err, SendError::NoStrategies));
    }

    #[test]
    fn serializer_failure_skips_strategies() {
        struct Refuse;
        impl WireSerializer for Refuse {
            fn serialize(
                &self,
                win: WindowId,
                _: &DomainMatcher,
                _: &WireMessage,
            ) -> Result<String, EnvelopeError> {
                Err(EnvelopeError::Unserializable {
                    target: win.to_string(),
                    reason: "no functions across origins".into(),
                })
            }
        }

        let env = MemoryEnv::new(CHILD);
        let target = env.add_window(PARENT);
        let (sender, calls) = scripted_sender(env, &[("a", false)]);
        let sender = sender.with_serializer(Refuse);

        let err = sender.send_message(target, &DomainMatcher::Any, ping()).unwrap_err();
        assert!(matches!(err, SendError::Encode(_)));
        assert_eq!(calls[0].get(), 0);
    }

    #[test]
    fn default_chain_posts_envelope() {
        let env = MemoryEnv::new(CHILD);
        let target = env.add_window(PARENT);
        let sender = MessageSender::new(env.clone(), Registry::new());
        assert_eq!(
            sender.strategy_names(),
            vec![PostMessageStrategy::NAME, BridgeStrategy::NAME, GlobalStrategy::NAME]
        );

        let id = sender
            .send_message(target, &DomainMatcher::from(PARENT), ping())
            .unwrap();

        let posted = env.posted(target);
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].target_origin, PARENT);
        let decoded = WireMessage::decode_str(&posted[0].data).unwrap().unwrap();
        assert_eq!(decoded.id(), &id);
        assert_eq!(decoded.kind(), MessageKind::Request);
        assert!(posted[0].data.contains(PROTOCOL_KEY));
    }

    #[test]
    fn default_chain_fails_when_nothing_delivers() {
        let env = MemoryEnv::new(CHILD);
        let target = env.add_window(PARENT);
        env.refuse_posts(target);
        let sender = MessageSender::new(env.clone(), Registry::new());

        let err = sender.send_message(target, &DomainMatcher::Any, ping()).unwrap_err();

        let names: Vec<_> = err.failures().iter().map(|f| f.strategy).collect();
        assert_eq!(names, vec!["post_message", "bridge", "global"]);
        assert!(matches!(
            err,
            SendError::AllStrategiesFailed {
                first: StrategyError::Dispatch { strategy: "post_message", .. },
                ..
            }
        ));
    }

    #[test]
    fn bridge_strategy_uses_live_tunnel() {
        let env = MemoryEnv::new(CHILD);
        let opener = env.add_window(PARENT);
        env.refuse_posts(opener);
        let registry = Registry::new();
        let bridge = MemoryBridge::new(opener, PARENT);
        registry.remote_windows().register(opener);
        registry
            .remote_windows()
            .register_sender(opener, PARENT, Rc::new(ForwardTo(bridge.clone())))
            .unwrap();
        let sender = MessageSender::new(env.clone(), registry);

        sender.send_message(opener, &DomainMatcher::from(PARENT), ping()).unwrap();

        assert_eq!(bridge.received().len(), 1);
    }

    #[test]
    fn bridge_strategy_queues_while_pending() {
        let env = MemoryEnv::new(CHILD);
        let opener = env.add_window(PARENT);
        let registry = Registry::new();
        registry.remote_windows().register(opener);
        let bridge = MemoryBridge::new(opener, PARENT);
        let sender = MessageSender::new(env.clone(), registry.clone());

        sender
            .send_message(opener, &DomainMatcher::Any, ping())
            .unwrap();
        assert_eq!(env.posted(opener).len(), 1);
        assert_eq!(registry.remote_windows().queued_count(opener), 1);
        assert!(bridge.received().is_empty());

        registry
            .remote_windows()
            .register_sender(opener, PARENT, Rc::new(ForwardTo(bridge.clone())))
            .unwrap();

        assert_eq!(bridge.received().len(), 1);
        assert_eq!(registry.remote_windows().queued_count(opener), 0);
    }

    #[test]
    fn global_strategy_reaches_same_domain_window() {
        let env = MemoryEnv::new(CHILD);
        let sibling = env.add_window(CHILD);
        env.refuse_posts(sibling);
        let entry = MemoryBridge::new(sibling, CHILD);
        env.install_entry_point(sibling, entry.clone());
        let sender = MessageSender::new(env.clone(), Registry::new());

        sender.send_message(sibling, &DomainMatcher::Any, ping()).unwrap();

        let received = entry.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].origin, CHILD);
        assert_eq!(received[0].source, env.current_window());
    }

    /// Remote sender that hands messages to a bridge's entry point.
    struct ForwardTo(Rc<MemoryBridge>);

    impl crate::env::RemoteSender for ForwardTo {
        fn send(&self, message: String) -> Result<(), crate::error::RemoteError> {
            use crate::env::{EntryPoint, RawMessageEvent};
            self.0
                .receive_message(RawMessageEvent {
                    data: message,
                    origin: CHILD.into(),
                    source: WindowId::new(1),
                })
                .map_err(|err| crate::error::RemoteError::Send(err.to_string()))
        }
    }
}
