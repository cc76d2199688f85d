//! U7Relay Web Server - U7BUY webhook receiver.
//!
//! This binary provides a thin, fast web server that:
//! - Receives webhooks from U7BUY
//! - Verifies the HMAC signature (if a secret is configured)
//! - Returns 200 OK before doing any forwarding work
//! - Forwards a formatted summary to Discord, best-effort

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};

use u7relay::{logging, router, AppState, Config, DiscordNotifier};

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration decides where logs go, so it is loaded first
    let config = Config::from_env();

    logging::init(config.log_file.as_deref())?;

    info!("web_server_starting");
    info!(
        port = config.port,
        signature_header = %config.signature_header,
        verification_enabled = config.verification_enabled(),
        forwarding_enabled = config.forwarding_enabled(),
        forward_timeout_ms = config.forward_timeout.as_millis() as u64,
        log_file = ?config.log_file,
        "config_loaded"
    );

    config.validate()?;

    if !config.verification_enabled() {
        warn!("u7buy_signature_verification_disabled");
    }

    let client = Client::builder()
        .timeout(config.forward_timeout)
        .build()
        .context("Failed to create HTTP client")?;

    let notifier = DiscordNotifier::new(
        client,
        config.discord_webhook_url.clone(),
        config.forward_timeout,
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config, Arc::new(notifier));
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "ctrl_c_handler_unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "sigterm_handler_unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
