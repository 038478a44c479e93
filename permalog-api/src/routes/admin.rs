//! Admin endpoints
//!
//! Protected by the bearer secret: trigger a processing tick, exercise
//! the bundle path with synthetic records, and inspect or inject
//! tracked bundles for verifier testing.

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use tracing::info;

use permalog_publisher::{ProcessResult, TestBundleReport};

use crate::dto::{
    InjectBundleRequest, InjectBundleResponse, TestBundleParams, TestVerifyResponse,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /trigger` — run one processing tick synchronously.
pub async fn trigger(State(state): State<AppState>) -> ApiResult<Json<ProcessResult>> {
    info!("Processing tick triggered via admin API");
    let result = state.service.run_tick().await?;
    Ok(Json(result))
}

/// `POST /test-bundle?count=N` — full sign/bundle/upload/finalize run
/// with synthetic records on the isolated test chain (1 <= N <= 100).
pub async fn test_bundle(
    State(state): State<AppState>,
    Query(params): Query<TestBundleParams>,
) -> ApiResult<Json<TestBundleReport>> {
    let report = state.service.test_bundle(params.count).await?;
    Ok(Json(report))
}

/// `GET /test-verify` — tracked bundles and verification counters.
pub async fn inspect_bundles(
    State(state): State<AppState>,
) -> ApiResult<Json<TestVerifyResponse>> {
    let counters = state.service.verification_counters().await?;
    let bundles = state.service.tracked_bundles().await?;
    Ok(Json(TestVerifyResponse { counters, bundles }))
}

/// `POST /test-verify` — inject a synthetic tracked bundle, optionally
/// backdated, and optionally run a verification pass right away.
pub async fn inject_bundle(
    State(state): State<AppState>,
    Json(request): Json<InjectBundleRequest>,
) -> ApiResult<Json<InjectBundleResponse>> {
    if request.item_count == 0 || request.item_count > 100 {
        return Err(ApiError::BadRequest(
            "item_count must be between 1 and 100".to_string(),
        ));
    }
    if request.age_secs < 0 {
        return Err(ApiError::BadRequest("age_secs must not be negative".to_string()));
    }

    let bundle_tx = request
        .bundle_tx
        .unwrap_or_else(|| format!("test-bundle-{}", Utc::now().timestamp_millis()));

    let bundle = state
        .service
        .inject_tracked_bundle(&bundle_tx, request.item_count, request.age_secs)
        .await?;

    let verify = if request.run_verifier {
        Some(state.service.run_verification().await?.into())
    } else {
        None
    };

    Ok(Json(InjectBundleResponse { bundle, verify }))
}
