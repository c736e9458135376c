//! Main Entrypoint for the Relay Gateway Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing the shared HTTP client and the bus connector.
//! 3. Wiring the connection manager, router and continuation adapter.
//! 4. Spawning the relay session that listens on the bus.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing::info;

use relay_core::adapter::ConversationAdapter;
use relay_core::backoff::RetryPolicy;
use relay_core::destination::Destination;
use relay_core::session;
use relay_core::transport::{BusConnector, ConnectParams, PubSubConnector, TokenSource};
use relay_core::{ConnectionManager, DestinationRouter};
use relay_gateway::{
    adapter::HttpConversationAdapter, config::Config, negotiate::NegotiateClient,
    router::create_router, state::AppState,
};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Shared Services ---
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    let tokens: Arc<dyn TokenSource> = Arc::new(NegotiateClient::new(
        http.clone(),
        config.negotiate_url.clone(),
        config.hub.clone(),
    ));
    let params = ConnectParams {
        headers: vec![("x-relay-client", config.app_id.clone())],
        ..ConnectParams::default()
    };
    let connector: Arc<dyn BusConnector> = Arc::new(PubSubConnector::new(tokens, params.clone()));
    let conn = Arc::new(ConnectionManager::new(
        connector,
        RetryPolicy::default(),
        params,
    ));

    let adapter: Arc<dyn ConversationAdapter> = Arc::new(HttpConversationAdapter::new(
        http,
        config.app_id.clone(),
    ));
    let router = Arc::new(DestinationRouter::new(Arc::clone(&adapter)));
    router
        .set_destination(Destination::bootstrap(&config.service_url))
        .await;

    // --- 4. Spawn the Relay Session ---
    let relay = session::spawn(Arc::clone(&conn), Arc::clone(&router));
    info!(hub = %config.hub, "Relay session spawned. Listening on the message bus.");

    let app_state = Arc::new(AppState {
        conn,
        router,
        adapter,
        config: Arc::new(config.clone()),
    });

    // --- 5. Start Server ---
    info!(
        bind_address = %config.bind_address,
        service_url = %config.service_url,
        "Service configured. Starting server..."
    );
    let app = create_router(app_state);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // --- 6. Shut Down the Relay ---
    relay.shutdown().await;
    info!("Server has shut down.");
    Ok(())
}
