//! HTTP server setup for the index service.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::{api, config::Config, state::AppState};

pub async fn run_server(config: Config) -> Result<()> {
    info!("Starting registry index server");

    let host = config.server.host.clone();
    let port = config.server.port;

    if config.storage.backend.eq_ignore_ascii_case("local") {
        std::fs::create_dir_all(&config.storage.data_dir).map_err(|e| {
            error!(data_dir = %config.storage.data_dir.display(), error = %e, "Failed to create data directory");
            anyhow::anyhow!(
                "Failed to create data directory {}: {}",
                config.storage.data_dir.display(),
                e
            )
        })?;
        info!(data_dir = %config.storage.data_dir.display(), "Using data directory");
    }

    let state = AppState::from_config(config).await?;
    info!(
        storage = %state.config.storage.backend,
        search = %state.config.search.backend,
        mirroring = state.search.is_mirroring(),
        "Index components ready"
    );

    let app = api::router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", host, port).parse().map_err(|e| {
        error!(host = %host, port = %port, error = %e, "Invalid socket address");
        anyhow::anyhow!("Invalid socket address {}:{}: {}", host, port, e)
    })?;

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {}:{}: {}", host, port, e)
    })?;

    println!("✅ Index server is running on http://{}:{}", host, port);
    println!("   Search:     curl http://localhost:{}/v1/search?q=", port);
    println!("   Health:     curl http://localhost:{}/health", port);

    info!("Server listening on {}", addr);
    axum::serve(listener, app).await.map_err(|e| {
        error!(error = %e, "Server error");
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}
