//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (every store answers)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::{HealthResponse, StoreHealth};
use crate::api::state::AppState;

/// GET /health/live
///
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Returns 200 once every configured store answers a trivial query.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    if check_stores(&state).await.iter().all(StoreHealth::is_ok) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /health
///
/// Full health status with component details.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stores = check_stores(&state).await;
    let healthy = stores.iter().filter(|s| s.is_ok()).count();

    let status = if healthy == stores.len() {
        "healthy"
    } else if healthy > 0 {
        "degraded"
    } else {
        "unhealthy"
    };

    let scheduler = match &state.scheduler {
        Some(scheduler) => Some(scheduler.status().await),
        None => None,
    };

    Json(HealthResponse {
        status: status.to_string(),
        stores,
        scheduler,
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Ping every store on a blocking worker
async fn check_stores(state: &AppState) -> Vec<StoreHealth> {
    let probes = state.probes.clone();
    let pinged = tokio::task::spawn_blocking(move || {
        probes
            .iter()
            .map(|probe| (probe.label().to_string(), probe.ping()))
            .collect::<Vec<_>>()
    })
    .await;

    match pinged {
        Ok(results) => results
            .into_iter()
            .map(|(store, result)| match result {
                Ok(()) => StoreHealth::ok(store),
                Err(e) => {
                    tracing::warn!(store = %store, "Health check failed: {}", e);
                    StoreHealth::error(store)
                }
            })
            .collect(),
        Err(e) => {
            tracing::error!("Health check task failed: {}", e);
            vec![StoreHealth::error("probe")]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::api::state::AppState;
    use crate::config::ApiConfig;
    use crate::forecast::AdditiveModel;
    use crate::pipeline::{Pipeline, PipelineSettings, WindowPolicy, WindowPreparer};
    use crate::storage::{Observation, SeriesReader, StoreError, StoreProbe, StoreResult};
    use chrono::Duration;

    struct NoHistory;

    impl SeriesReader for NoHistory {
        fn read(&self, _entity_id: &str, _min_timestamp: i64) -> StoreResult<Vec<Observation>> {
            Ok(Vec::new())
        }
    }

    /// Fails every ping with a message naming a file on the server
    struct MissingFile;

    impl StoreProbe for MissingFile {
        fn label(&self) -> &str {
            "csv"
        }

        fn ping(&self) -> StoreResult<()> {
            Err(StoreError::Unavailable("/srv/flowcast/secret/history.csv not found".into()))
        }
    }

    fn state_with(probe: Arc<dyn StoreProbe>) -> Arc<AppState> {
        let pipeline = Pipeline::new(
            Arc::new(NoHistory),
            WindowPreparer::new(WindowPolicy::default(), 10),
            Arc::new(AdditiveModel::default()),
            PipelineSettings::new("DMC012", 12, Duration::minutes(5)).unwrap(),
        );
        Arc::new(AppState::new(Arc::new(pipeline), ApiConfig::default()).with_probe(probe))
    }

    #[tokio::test]
    async fn test_liveness() {
        let status = liveness().await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_failed_store_detail_is_not_exposed() {
        let state = state_with(Arc::new(MissingFile));

        assert_eq!(
            readiness(State(Arc::clone(&state))).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        let Json(health) = full_health(State(state)).await;
        assert_eq!(health.status, "unhealthy");
        assert_eq!(health.stores[0].status, "error");
        let body = serde_json::to_string(&health).unwrap();
        assert!(!body.contains("/srv/flowcast"), "{}", body);
    }
}
