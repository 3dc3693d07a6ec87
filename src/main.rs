//! Motion Relay - streams orientation samples to local WebSocket clients.
//!
//! Runs the broadcast server on a small fixed worker pool and feeds it from
//! the simulated motion source until Ctrl+C.

use motion_relay::motion::{MotionSource, SimulatedConfig, SimulatedSource};
use motion_relay::{BroadcastServer, Config, MotionRelay};
use std::sync::Arc;
use tokio::sync::Notify;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::resolve()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    tracing::debug!(path = ?Config::default_path(), ?config, "Configuration resolved");
    config.validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("motion-relay-io")
        .enable_all()
        .build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("╔════════════════════════════════════════════════════════════╗");
    println!("║              Motion Relay - Orientation Stream             ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    println!();

    println!("🔧 Starting WebSocket server...");
    let server = Arc::new(BroadcastServer::new());
    let addr = match server.start(config.socket_addr()).await {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start broadcast server");
            println!("   ⚠ Could not start server: {}", e);
            return Err(e.into());
        }
    };
    println!("   ✓ Listening on ws://{}", addr);

    // Report connection count changes
    let mut counts = server.subscribe_count();
    let count_task = tokio::spawn(async move {
        while counts.changed().await.is_ok() {
            let clients = *counts.borrow_and_update();
            tracing::info!(clients, "Connected clients changed");
        }
    });

    println!("🔧 Starting motion source...");
    let relay = Arc::new(MotionRelay::new(Arc::clone(&server)));
    let mut source = SimulatedSource::new(SimulatedConfig {
        sample_rate_hz: config.sample_rate_hz,
        ..SimulatedConfig::default()
    });
    relay.attach(&mut source)?;
    println!("   ✓ Emitting at {} Hz", config.sample_rate_hz);

    // Shutdown signal
    let shutdown = Arc::new(Notify::new());
    let shutdown_ctrlc = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        println!("\n🛑 Shutdown signal received...");
        shutdown_ctrlc.notify_one();
    })?;

    println!();
    println!("════════════════════════════════════════════════════════════════");
    println!("🎯 Motion Relay is running!");
    println!("   • WS  ws://{}/      - Orientation stream", addr);
    println!("   • GET http://{}/health - Health check", addr);
    println!("   • Press Ctrl+C to quit");
    println!("════════════════════════════════════════════════════════════════");
    println!();

    shutdown.notified().await;

    // Cleanup
    println!("⏳ Shutting down...");
    source.stop();
    server.stop().await;
    count_task.abort();

    println!("👋 Motion Relay has exited. Goodbye!");
    Ok(())
}
