//! Smart Shelf daemon
//!
//! Wires the engine to its collaborators:
//! - WebSocket observers and commands (`server`)
//! - Gateway startup sync, completion reports and state write-back
//! - the button poller thread and its consumer
//!
//! Usage: `shelf-daemon --config shelf.toml [--bind 0.0.0.0:8765] [--no-gateway]`

mod commands;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shelf_core::Layout;
use shelf_core::layout::FALLBACK_LEVELS;
use shelf_engine::{ButtonOutcome, ButtonPoller, ShelfConfig, ShelfEngine, SimulatedButtons};
use shelf_gateway::{GatewaySync, HttpGateway};
use shelf_led::{LedController, NullDriver};
use tokio::net::TcpListener;

use crate::server::ServerContext;

#[derive(Debug, Parser)]
#[command(name = "shelf-daemon", about = "Smart Shelf inventory and job engine")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket bind address
    #[arg(long)]
    bind: Option<String>,

    /// Gateway base URL
    #[arg(long)]
    gateway_url: Option<String>,

    /// Fixed shelf identity (skips Gateway detection)
    #[arg(long)]
    shelf_id: Option<String>,

    /// Address reported to the Gateway when requesting the identity
    #[arg(long)]
    shelf_ip: Option<String>,

    /// Run on the local fallback layout without a Gateway
    #[arg(long)]
    no_gateway: bool,

    /// Start the button poller
    #[arg(long)]
    buttons: bool,
}

fn load_config(args: &Args) -> anyhow::Result<ShelfConfig> {
    let mut config = match &args.config {
        Some(path) => ShelfConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ShelfConfig::default(),
    };
    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(url) = &args.gateway_url {
        config.gateway.base_url = url.clone();
    }
    if let Some(shelf_id) = &args.shelf_id {
        config.shelf.shelf_id = Some(shelf_id.clone());
    }
    if let Some(shelf_ip) = &args.shelf_ip {
        config.gateway.shelf_ip = Some(shelf_ip.clone());
    }
    if args.no_gateway {
        config.gateway.enabled = false;
    }
    if args.buttons {
        config.buttons.enabled = true;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let layout = Layout::uniform(&FALLBACK_LEVELS, config.shelf.fallback_capacity);
    // No strip binding in this build; frames go to the log
    let leds = LedController::new(&layout, config.shelf.wiring, Box::new(NullDriver));
    let engine = Arc::new(ShelfEngine::new(layout, leds));
    if let Some(shelf_id) = &config.shelf.shelf_id {
        engine.set_shelf_id(shelf_id.clone());
    }

    let gateway = if config.gateway.enabled {
        let transport = HttpGateway::new(config.gateway.clone())?;
        let sync = Arc::new(GatewaySync::new(
            transport,
            Arc::clone(&engine),
            config.gateway.timeout(),
        ));
        sync.startup(config.gateway.shelf_ip.as_deref()).await;
        Some(sync)
    } else {
        log::info!("[Daemon] Gateway disabled, running on the fallback layout");
        None
    };

    let context = ServerContext {
        engine: Arc::clone(&engine),
        gateway,
    };

    // Buttons: poller thread → channel → consumer thread
    let _poller = if config.buttons.enabled {
        let (tx, rx) = crossbeam_channel::unbounded();
        let source = SimulatedButtons::new();
        let poller = ButtonPoller::spawn(
            Box::new(source),
            config.buttons.mapping.clone(),
            config.buttons.timing(),
            tx,
        )
        .context("starting button poller")?;

        let consumer = context.clone();
        let runtime = tokio::runtime::Handle::current();
        std::thread::Builder::new()
            .name("shelf-button-consumer".into())
            .spawn(move || {
                let _guard = runtime.enter();
                let engine = Arc::clone(&consumer.engine);
                engine.run_button_loop(rx, |outcome| {
                    if let ButtonOutcome::Completed(completion) = outcome {
                        consumer.publish_completion(completion.job);
                    }
                });
            })
            .context("starting button consumer")?;
        Some(poller)
    } else {
        None
    };

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("binding {}", config.server.bind))?;

    tokio::select! {
        result = server::serve(listener, context) => {
            result.context("WebSocket server")?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("[Daemon] Shutting down");
        }
    }

    if let Err(e) = engine.leds().clear_all() {
        log::warn!("[Daemon] Could not clear LEDs: {}", e);
    }
    Ok(())
}
