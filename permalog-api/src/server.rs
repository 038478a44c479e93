//! API server setup

use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use permalog_publisher::PublisherService;

use crate::routes::create_router;
use crate::state::{ApiConfig, AppState};

/// Build the router and bind address.
pub fn create_server(
    config: &ApiConfig,
    service: Arc<PublisherService>,
) -> Result<(Router, SocketAddr), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState::new(service, config.admin_secret.clone());

    let mut router = create_router(state).layer(TraceLayer::new_for_http());
    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    Ok((router, addr))
}

/// Run the API server until the process exits.
pub async fn run_server(
    config: &ApiConfig,
    service: Arc<PublisherService>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (router, addr) = create_server(config, service)?;

    tracing::info!("Admin API listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

/// Start the server in the background, returning the bound address
/// (useful with port 0).
pub async fn start_background_server(
    config: &ApiConfig,
    service: Arc<PublisherService>,
) -> Result<SocketAddr, Box<dyn std::error::Error + Send + Sync>> {
    let (router, addr) = create_server(config, service)?;

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!("Admin API server error: {}", e);
        }
    });

    Ok(actual_addr)
}
