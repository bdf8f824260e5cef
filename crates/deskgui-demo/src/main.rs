//! deskgui-demo: counter/timestamp demo driving both halves of the bridge.
//!
//! The host registers `counter_value`, `counter_reset` and `get_timestamp`;
//! a scripted "page" presses the counter, fetches the timestamp, receives a
//! pushed message and resets the counter, all over an in-memory channel.

mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use deskgui_bridge::{BridgeConfig, InMemoryBridge};
use serde_json::{json, Value};

use crate::handlers::Counter;

#[derive(Parser)]
#[command(name = "deskgui-demo", about = "Host <-> page bridge demo")]
struct Args {
    /// Path to a bridge config TOML file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulated counter presses.
    #[arg(long, default_value_t = 3)]
    presses: u64,

    /// Log every frame crossing the bridge.
    #[arg(long)]
    log_frames: bool,

    /// Print the page bootstrap script and exit.
    #[arg(long)]
    print_shim: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskgui_demo=info,deskgui_bridge=info".into()),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => match BridgeConfig::load_from_path(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "failed to load config");
                std::process::exit(1);
            }
        },
        None => BridgeConfig::default(),
    };
    config.log_frames |= args.log_frames;

    let bridge = InMemoryBridge::spawn(config);
    let counter = Arc::new(Counter::default());
    handlers::install(&bridge.host, Arc::clone(&counter));

    if args.print_shim {
        println!("{}", bridge.host.bootstrap_script());
        return;
    }

    bridge.page.on_event(|event| {
        tracing::info!(name = %event.name, payload = %event.payload, "message from host side");
    });

    for hit in 1..=args.presses {
        if let Err(e) = bridge.page.invoke("counter_value", json!(hit)) {
            tracing::warn!(error = %e, "counter_value failed");
        }
    }

    match bridge.page.invoke_async("get_timestamp", Value::Null).await {
        Ok(ts) => tracing::info!(timestamp = %ts, "timestamp fetched"),
        Err(e) => tracing::error!(error = %e, "error getting timestamp"),
    }

    if let Err(e) = bridge.host.emit("onMessage", json!("hi")) {
        tracing::warn!(error = %e, "emit failed");
    }

    match bridge.page.invoke_async("counter_reset", json!(0)).await {
        Ok(_) => tracing::info!(hits = counter.get(), "counter after reset"),
        Err(e) => tracing::error!(error = %e, "counter_reset failed"),
    }

    match bridge.page.invoke_async("missing_function", Value::Null).await {
        Ok(_) => tracing::warn!("missing_function unexpectedly resolved"),
        Err(e) => tracing::info!(error = %e, "unknown function rejected as expected"),
    }

    bridge.page.close();
    if let Err(e) = bridge.host_task.await {
        tracing::warn!(error = %e, "host task failed");
    }
}
