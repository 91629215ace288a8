//! The simulated popup/opener/bridge setup.

use interframe_core::{DomainMatcher, Message, MessageKind, TunnelConfig, WireMessage};
use interframe_tunnel::memory::{MemoryBridge, MemoryEnv};
use interframe_tunnel::{
    MessageSender, RawMessageEvent, ReceiveError, Registry, TunnelNegotiator, TunnelOutcome,
    WindowEnv,
};
use serde_json::json;
use std::rc::Rc;
use std::time::Duration;

const POPUP_ORIGIN: &str = "https://popup.example";
const OPENER_ORIGIN: &str = "https://opener.example";

pub async fn run(config: TunnelConfig, bridge_delay: Duration) -> anyhow::Result<()> {
    let env = MemoryEnv::new(POPUP_ORIGIN);
    let popup = env.current_window();
    let opener = env.add_window(OPENER_ORIGIN);
    env.set_opener(popup, opener);
    env.set_name(popup, "demo-popup");

    let bridge_frame = env.add_frame(opener, POPUP_ORIGIN, config.bridge_name(POPUP_ORIGIN));
    let bridge = MemoryBridge::new(opener, OPENER_ORIGIN);

    // The bridge frame finishes loading later.
    {
        let env = env.clone();
        let bridge = bridge.clone();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(bridge_delay).await;
            env.install_entry_point(bridge_frame, bridge);
            tracing::info!("Bridge frame initialized");
        });
    }

    let registry = Registry::new();
    let receiver = |event: RawMessageEvent| async move {
        match WireMessage::decode_str(&event.data) {
            Ok(Some(wire)) => {
                tracing::info!(
                    "Popup received {:?} {} from {}",
                    wire.kind(),
                    wire.id(),
                    event.origin
                );
                Ok(())
            }
            Ok(None) => {
                tracing::debug!("Ignoring foreign message from {}", event.origin);
                Ok(())
            }
            Err(e) => Err(ReceiveError::new(e.to_string())),
        }
    };

    let negotiator = TunnelNegotiator::new(env.clone(), registry.clone(), Rc::new(receiver))
        .with_config(config);
    let Some(mut inbox) = negotiator.take_inbox() else {
        anyhow::bail!("relay inbox already taken");
    };

    match negotiator.open_tunnel_to_opener().await {
        Ok(TunnelOutcome::Established { opener, origin }) => {
            tracing::info!("Tunnel to {} established at {}", opener, origin);
        }
        Ok(other) => {
            tracing::info!("No tunnel needed: {:?}", other);
            return Ok(());
        }
        Err(e) => {
            tracing::warn!("Tunnel failed: {}", e);
            return Err(e.into());
        }
    }

    let sender = MessageSender::new(env.clone(), registry.clone());
    let request = Message::request("greet", json!({ "from": "popup" }));
    let id = sender.send_message(opener, &DomainMatcher::from(OPENER_ORIGIN), request)?;
    let pending = registry.requests().track(opener, id.clone());
    tracing::info!("Sent request {}", id);

    for forwarded in bridge.forwarded() {
        tracing::info!("Bridge forwarded to opener: {}", forwarded);
    }

    // The opener answers through the bridge.
    let reply = WireMessage::encode(
        Message::new(MessageKind::Response)
            .with_field("hash", json!(id.as_str()))
            .with_field("data", json!({ "greeting": "hello popup" })),
    );
    bridge.relay(&reply.to_json()?);
    bridge.relay("{\"unrelated\":true}");
    let relayed = inbox.drain().await;
    tracing::info!("Delivered {} relayed messages", relayed);
    registry
        .requests()
        .resolve(opener, &id, Ok(json!({ "greeting": "hello popup" })));

    let response = pending.wait().await?;
    tracing::info!("Request {} resolved with {}", id, response);

    registry.clean_up_window(opener);
    tracing::info!("Opener cleaned up");

    Ok(())
}
