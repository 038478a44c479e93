//! Permalog daemon
//!
//! Wires the publisher service from environment configuration and runs
//! the background ticks plus the admin API until interrupted.
//!
//! Required environment:
//! - PERMALOG_WALLET_JWK: signing wallet as a JWK JSON document
//!
//! Optional:
//! - PERMALOG_DATA_DIR: sled database path (default ./permalog_data)
//! - PERMALOG_ADMIN_SECRET: bearer secret for the admin endpoints
//! - PERMALOG_ALERT_WEBHOOK: operator alert webhook URL
//! - PERMALOG_GATEWAY_URL and the PERMALOG_* publisher thresholds

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use permalog_api::ApiConfig;
use permalog_gateway::{GatewayClient, GatewayConfig};
use permalog_publisher::{Alerter, BackgroundRunner, PublisherConfig, PublisherService};
use permalog_store::SledStore;
use permalog_wallet::Wallet;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Daemon exited with unrecoverable error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let wallet_json = std::env::var("PERMALOG_WALLET_JWK")
        .map_err(|_| "PERMALOG_WALLET_JWK is not set; export the signing wallet JWK")?;
    let wallet = Arc::new(Wallet::from_jwk_json(&wallet_json)?);
    info!(address = wallet.address(), "Wallet loaded");

    let data_dir =
        std::env::var("PERMALOG_DATA_DIR").unwrap_or_else(|_| "./permalog_data".to_string());
    let store = Arc::new(SledStore::open(&data_dir)?);
    info!(data_dir = %data_dir, "Store opened");

    let gateway_config = GatewayConfig::from_env();
    info!(gateway = %gateway_config.url, "Gateway configured");
    let gateway = Arc::new(GatewayClient::new(gateway_config)?);

    let alerter = Arc::new(Alerter::with_webhook(
        std::env::var("PERMALOG_ALERT_WEBHOOK").ok().filter(|s| !s.is_empty()),
    ));

    let publisher_config = PublisherConfig::from_env();
    let service = Arc::new(PublisherService::new(
        publisher_config,
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store,
        wallet,
        gateway,
        alerter,
    ));

    let runner = BackgroundRunner::new(service.clone()).start();

    let api_config = ApiConfig::from_env();
    let addr = permalog_api::start_background_server(&api_config, service).await?;
    info!(addr = %addr, "Admin API started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    runner.stop().await;

    Ok(())
}
