//! CampusTrade Feed Engine
//!
//! Real-time market data distribution service: maintains one upstream feed
//! connection, decodes its binary frames into normalized ticks, and fans them
//! out to downstream WebSocket consumers.

use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use campustrade_feed::credentials;
use campustrade_feed::engine::FeedEngine;
use campustrade_feed::server;
use campustrade_feed::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting CampusTrade feed engine");

    // Load configuration
    let config = Config::load()?;
    let listen_addr = config.listen_addr.clone();
    info!(listen_addr = %listen_addr, "Configuration loaded");

    let credentials = credentials::from_config(&config);
    let (engine, manager) = FeedEngine::new(config, credentials);

    // One shutdown signal fans out to the feed task and the server
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut server_shutdown = shutdown_tx.subscribe();

    let feed_handle = tokio::spawn(manager.run(shutdown_tx.subscribe()));

    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = signal_tx.send(());
    });

    // Start the downstream serving surface
    let app = server::router(engine);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    info!(addr = %listen_addr, "Serving downstream WebSocket and health endpoints");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.recv().await;
        })
        .await?;

    let _ = feed_handle.await;
    info!("CampusTrade feed engine stopped");

    Ok(())
}

/// Listen for SIGTERM (container termination) or ctrl-c.
#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to listen for SIGTERM");
    let ctrl_c = tokio::signal::ctrl_c();

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = ctrl_c => info!("ctrl-c received"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl-c");
}
