//! Bridge relay demo.
//!
//! Simulates a named popup on one origin whose opener lives on another
//! origin. The opener hosts a bridge frame from the popup's origin that
//! only initializes after a delay. The popup negotiates a tunnel through
//! the bridge, sends a request to the opener, and receives a relayed reply.
//!
//! Run:
//!   cargo run -p interframe-demo-relay -- --bridge-delay 350
//!   cargo run -p interframe-demo-relay -- --config tunnel.toml --bridge-delay 5000

mod scenario;

use interframe_core::TunnelConfig;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relay_demo=info".parse()?)
                .add_directive("interframe_tunnel=debug".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let delay = Duration::from_millis(parse_arg(&args, "--bridge-delay").unwrap_or(350));
    let config = match parse_arg_string(&args, "--config") {
        Some(path) => TunnelConfig::from_toml_str(&std::fs::read_to_string(&path)?)?,
        None => TunnelConfig::default(),
    };

    tracing::info!(
        "Polling every {:?}, giving up after {:?}, bridge ready after {:?}",
        config.poll_interval(),
        config.bridge_timeout(),
        delay
    );

    let local = tokio::task::LocalSet::new();
    local.run_until(scenario::run(config, delay)).await
}

fn parse_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_arg_string(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
