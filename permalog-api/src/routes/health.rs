//! Health endpoint

use axum::{extract::State, Json};

use crate::dto::{
    ChainSummary, ConfigSummary, HealthResponse, LastBatchSummary, WalletSummary,
};
use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /` — service health and a snapshot of chain, queue, wallet and
/// verification state. Public.
pub async fn health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let service = &state.service;

    let head = service.head().await?;
    let stats = service.queue_stats().await?;
    let verification = service.verification_counters().await?;
    let balance = service.balance_status().await;

    let wallet = balance.ar().map(|ar| WalletSummary {
        address: service.wallet_address().to_string(),
        balance_ar: ar,
        status: balance.label().to_string(),
    });

    let last_batch = service.last_batch().await.map(|last| LastBatchSummary {
        result: last.result,
        finished_at: last.finished_at,
    });

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        service: permalog_core::constants::APP_NAME.to_string(),
        version: state.version.clone(),
        config: ConfigSummary::from(service.config()),
        chain: ChainSummary {
            seq: head.seq,
            head_tx: head.tx,
        },
        queue: stats.into(),
        wallet,
        verification,
        last_batch,
    }))
}
