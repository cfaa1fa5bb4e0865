//! Predict Route
//!
//! - GET /api/predict - Future part of a fresh forecast

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use crate::api::dto::{ForecastPointDto, PredictParams};
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// Header carrying the shared secret
pub const API_KEY_HEADER: &str = "api_key";

/// GET /api/predict
///
/// Runs the pipeline with the request time as now and returns the points
/// after the cutoff. The pipeline is not touched unless the key matches.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<PredictParams>,
) -> ApiResult<Json<Vec<ForecastPointDto>>> {
    authorize(&headers, &state.config.api_key)?;

    let now = Utc::now();
    let cutoff = params.cutoff(now).map_err(ApiError::Validation)?;

    let pipeline = Arc::clone(&state.pipeline);
    let task = tokio::task::spawn_blocking(move || pipeline.run(now));

    let forecast = match tokio::time::timeout(state.request_timeout(), task).await {
        Ok(Ok(result)) => result?,
        Ok(Err(e)) => return Err(ApiError::Internal(format!("forecast task failed: {}", e))),
        Err(_) => return Err(ApiError::Timeout(state.config.request_timeout_secs)),
    };

    let future: Vec<ForecastPointDto> = forecast
        .future_after(cutoff)
        .iter()
        .map(ForecastPointDto::from)
        .collect();

    tracing::info!(
        history = forecast.history_len,
        returned = future.len(),
        cutoff = %cutoff,
        "Served forecast"
    );

    Ok(Json(future))
}

/// Accept only an exact match of a non-empty configured key
fn authorize(headers: &HeaderMap, expected: &str) -> ApiResult<()> {
    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !expected.is_empty() && constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
