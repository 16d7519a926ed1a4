//! Managed MCP gateway entrypoint: load configuration, wire up the shared
//! process state, and serve the edge router until a shutdown signal arrives.

mod admission;
mod background;
mod dispatcher;
mod edge;
mod rpc;
mod state;

use std::sync::Arc;

use gateway_adapters::AdapterRegistry;
use gateway_core::{init_tracing, GatewayConfig};
use gateway_rate_limit::EndpointRateLimiter;
use gateway_store::{MetadataStore, PgMetadataStore};

use background::BackgroundQueue;
use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = GatewayConfig::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let master_key = config.master_key;

    let store = PgMetadataStore::connect(&config.database_url).await?;
    let store: Arc<dyn MetadataStore> = Arc::new(store);

    let adapters = Arc::new(AdapterRegistry::build());
    let rate_limiter = Arc::new(EndpointRateLimiter::new());
    let (background, worker) = BackgroundQueue::spawn(store.clone());

    let state = AppState {
        config: Arc::new(config),
        master_key: Arc::new(master_key),
        store,
        adapters,
        rate_limiter,
        background,
    };

    let app = edge::router(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "managed mcp gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    drop(state);
    tracing::info!("draining background queue");
    worker.await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
