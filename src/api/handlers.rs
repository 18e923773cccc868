use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::Value;
use std::sync::Arc;

use super::types::*;
use super::AppState;
use crate::address::normalize_address;
use crate::control::validate::{AddChainRequest, UpdateChainRequest};
use crate::db::models::ChainStatusRow;
use crate::db::repository::{self, EventFilter};
use crate::error::IndexerError;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Map the error taxonomy onto HTTP statuses. Probe failures surface as
/// 400: the operator supplied an endpoint that does not answer.
fn error_status(e: &IndexerError) -> StatusCode {
    match e {
        IndexerError::Validation(_) | IndexerError::RpcUnavailable(_) => StatusCode::BAD_REQUEST,
        IndexerError::NotFound(_) => StatusCode::NOT_FOUND,
        IndexerError::Conflict(_) => StatusCode::CONFLICT,
        IndexerError::Decode(_) | IndexerError::Store(_) | IndexerError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(e: IndexerError) -> (StatusCode, Json<ErrorResponse>) {
    (
        error_status(&e),
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn to_cached_value<T: serde::Serialize>(payload: &T) -> Result<Value, (StatusCode, Json<ErrorResponse>)> {
    serde_json::to_value(payload).map_err(|e| api_error(IndexerError::Internal(e.to_string())))
}

// ============================================================
// Health
// ============================================================

pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    if let Some(cached) = state.cache.get("health") {
        return Ok(Json(cached));
    }

    let statuses = state.control.status_all().await.map_err(api_error)?;
    let total_events = repository::count_events(
        &state.pool,
        &EventFilter::WithFilters {
            integrator: None,
            chain_id: None,
            token: None,
            from: None,
            to: None,
        },
    )
    .await
    .map_err(api_error)?;

    let response = HealthResponse {
        status: "ok".to_string(),
        total_events,
        chains: statuses
            .into_iter()
            .map(|s| ChainHealth {
                chain_id: s.chain_id,
                name: s.name,
                worker_status: s.worker_status,
                is_enabled: s.is_enabled,
                last_processed_block: s.last_processed_block,
                error_count: s.error_count,
            })
            .collect(),
    };

    let value = to_cached_value(&response)?;
    state.cache.put("health".to_string(), value.clone());
    Ok(Json(value))
}

// ============================================================
// Events (read path)
// ============================================================

pub async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventParams>,
) -> ApiResult<Value> {
    let cache_key = format!("events:{params:?}");
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let integrator = match &params.integrator {
        Some(address) => Some(normalize_address(address).map_err(api_error)?),
        None => None,
    };
    let token = match &params.token {
        Some(address) => Some(normalize_address(address).map_err(api_error)?),
        None => None,
    };

    let filter = EventFilter::WithFilters {
        integrator,
        chain_id: params.chain_id,
        token,
        from: params.from,
        to: params.to,
    };

    let limit = params.limit.unwrap_or(100).clamp(1, 1_000);
    let offset = params.offset.unwrap_or(0).max(0);

    let total = repository::count_events(&state.pool, &filter)
        .await
        .map_err(api_error)?;
    let events = repository::find_events(&state.pool, &filter, limit, offset)
        .await
        .map_err(api_error)?;

    let value = to_cached_value(&EventsResponse { total, events })?;
    state.cache.put(cache_key, value.clone());
    Ok(Json(value))
}

pub async fn integrator_events(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Value> {
    let integrator = normalize_address(&address).map_err(api_error)?;

    let cache_key = format!("events:integrator:{integrator}:{params:?}");
    if let Some(cached) = state.cache.get(&cache_key) {
        return Ok(Json(cached));
    }

    let filter = EventFilter::ByIntegrator { integrator };
    let limit = params.limit.unwrap_or(100).clamp(1, 1_000);
    let offset = params.offset.unwrap_or(0).max(0);

    let total = repository::count_events(&state.pool, &filter)
        .await
        .map_err(api_error)?;
    let events = repository::find_events(&state.pool, &filter, limit, offset)
        .await
        .map_err(api_error)?;

    let value = to_cached_value(&EventsResponse { total, events })?;
    state.cache.put(cache_key, value.clone());
    Ok(Json(value))
}

// ============================================================
// Chain management (control plane)
// ============================================================

pub async fn list_chains(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ChainStatusRow>> {
    state.control.status_all().await.map(Json).map_err(api_error)
}

pub async fn get_chain(
    State(state): State<Arc<AppState>>,
    Path(chain_id): Path<u64>,
) -> ApiResult<ChainStatusRow> {
    state
        .control
        .status_one(chain_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn add_chain(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddChainRequest>,
) -> ApiResult<ChainStatusRow> {
    state.control.add(req).await.map(Json).map_err(api_error)
}

pub async fn start_chain(
    State(state): State<Arc<AppState>>,
    Path(chain_id): Path<u64>,
) -> ApiResult<ChainStatusRow> {
    state
        .control
        .start(chain_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn stop_chain(
    State(state): State<Arc<AppState>>,
    Path(chain_id): Path<u64>,
) -> ApiResult<ChainStatusRow> {
    state
        .control
        .stop(chain_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn update_chain(
    State(state): State<Arc<AppState>>,
    Path(chain_id): Path<u64>,
    Json(req): Json<UpdateChainRequest>,
) -> ApiResult<ChainStatusRow> {
    state
        .control
        .update(chain_id, req)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn delete_chain(
    State(state): State<Arc<AppState>>,
    Path(chain_id): Path<u64>,
) -> ApiResult<DeleteResponse> {
    state
        .control
        .delete(chain_id)
        .await
        .map(|_| {
            Json(DeleteResponse {
                chain_id,
                deleted: true,
            })
        })
        .map_err(api_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy_maps_to_expected_statuses() {
        assert_eq!(
            error_status(&IndexerError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&IndexerError::RpcUnavailable("probe".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&IndexerError::NotFound(137)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&IndexerError::Conflict(137)),
            StatusCode::CONFLICT
        );
        assert_eq!(
            error_status(&IndexerError::Internal("bug".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            error_status(&IndexerError::Decode("shape".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
