//! Slotnet Server - Entry Point
//!
//! Runs the pooled listener engine as an echo server: every received chunk
//! is sent straight back to its session.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info};

use slotnet_server::engine::{ChannelObserver, EngineEvent};
use slotnet_server::{Config, Engine, Session, SessionCore, VERSION};

/// Plain session carrying only engine state
struct EchoSession {
    core: SessionCore,
}

impl Session for EchoSession {
    fn core(&self) -> &SessionCore {
        &self.core
    }

    fn on_terminated(&self) {
        debug!(
            session_id = %self.core.id(),
            bytes_rx = self.core.bytes_rx(),
            bytes_tx = self.core.bytes_tx(),
            "Echo session ended"
        );
    }
}

/// Application entry point
fn main() -> Result<()> {
    // Parse command line arguments
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    // Load configuration
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Initialize tracing/logging
    slotnet_server::util::init_tracing(&config.logging)?;

    info!(
        version = VERSION,
        config_path = ?config_path,
        "Starting Slotnet Server"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.effective_workers())
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    // Initialize metrics if enabled
    if config.metrics.enabled {
        slotnet_server::metrics::init_metrics(&config.metrics)?;
        info!(
            bind_addr = %config.metrics.bind_addr,
            "Metrics endpoint started"
        );
    }

    let (observer, mut events) = ChannelObserver::new();
    let engine = Engine::<EchoSession>::builder(config.engine_config())
        .factory(|core: SessionCore| EchoSession { core })
        .observer(observer)
        .start()
        .context("Failed to start engine")?;

    info!(
        local_addr = %engine.local_addr(),
        capacity = engine.capacity(),
        workers = config.server.effective_workers(),
        "Server listening"
    );

    tokio::select! {
        _ = echo(&engine, &mut events) => {}
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            engine.shutdown();
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Send every received chunk back to its session
async fn echo(engine: &Engine<EchoSession>, events: &mut UnboundedReceiver<EngineEvent<EchoSession>>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::Accepted(session) => {
                debug!(
                    session_id = %session.core().id(),
                    peer_addr = %session.core().peer_addr(),
                    "Echo session started"
                );
            }
            EngineEvent::Received { session, data, .. } => engine.send(&session, data),
            EngineEvent::Sent { .. } => {}
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
