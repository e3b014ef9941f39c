use axum::{
    extract::{Path, Query, State},
    http::header::{self, HeaderMap},
    response::Response,
};
use uuid::Uuid;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::ingest::worker::{RetryPolicy, storage_error, with_retry};
use crate::services::cache;
use crate::tracking::{StatsAggregator, Vuelta};

use super::types::{StatsQuery, StatsResponse, VueltaResponse, VueltasQuery, VueltasResponse};

const STATS_EPSILON: f64 = 1e-9;

/// Pick the response format from the query parameter, then the Accept header.
fn determine_format(query_format: &str, headers: &HeaderMap) -> String {
    // Query parameter takes precedence
    if query_format != "json" {
        return query_format.to_lowercase();
    }
    let wants_csv = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/csv"));
    if wants_csv {
        "csv".to_string()
    } else {
        "json".to_string()
    }
}

fn build_csv(vueltas: &[Vuelta]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for vuelta in vueltas {
        writer
            .serialize(VueltaResponse::from(vuelta))
            .map_err(|e| AppError::Internal(format!("CSV encoding failed: {e}")))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("CSV encoding failed: {e}")))
}

/// History version of a known device.
async fn ensure_device(state: &AppState, device_id: Uuid) -> AppResult<u64> {
    cache::history_version(state, device_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))
}

async fn load_history(
    state: &AppState,
    device_id: Uuid,
    limit: Option<u64>,
) -> AppResult<Vec<Vuelta>> {
    let policy = RetryPolicy::from_config(&state.config);
    with_retry("History load", policy, || state.store.list_vueltas(device_id, limit))
        .await
        .map_err(storage_error)
}

/// Closed vuelta history, newest first
#[utoipa::path(
    get,
    path = "/api/devices/{device_id}/vueltas",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
        VueltasQuery,
    ),
    responses(
        (status = 200, description = "Vuelta history (JSON or CSV)", body = VueltasResponse),
        (status = 400, description = "Unsupported format"),
        (status = 404, description = "Device not found"),
    ),
    tag = "vueltas"
)]
pub async fn list_vueltas(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Query(query): Query<VueltasQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let version = ensure_device(&state, device_id).await?;

    let format = determine_format(&query.format, &headers);
    if format != "json" && format != "csv" {
        return Err(AppError::BadRequest(format!(
            "Unsupported format '{format}', expected json or csv"
        )));
    }

    let limit = query.limit.map(|l| l.to_string()).unwrap_or_default();
    let key = cache::cache_key("vueltas", &[&device_id.to_string(), &limit, &format]);
    if let Some(hit) = cache::get_cached(&state, &key, device_id).await {
        return cache::cached_response(&hit, true);
    }

    let history = load_history(&state, device_id, query.limit).await?;
    tracing::debug!(device_id = %device_id, count = history.len(), format = %format, "Vuelta history loaded");

    if format == "csv" {
        let bytes = build_csv(&history)?;
        return cache::store_and_respond(&state, key, bytes, cache::CSV, version).await;
    }

    let response = VueltasResponse {
        device_id,
        vueltas: history.iter().map(VueltaResponse::from).collect(),
    };
    cache::cache_and_respond(&state, key, &response, version).await
}

/// Device-level irrigation totals
#[utoipa::path(
    get,
    path = "/api/devices/{device_id}/stats",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
        StatsQuery,
    ),
    responses(
        (status = 200, description = "Device totals", body = StatsResponse),
        (status = 404, description = "Device not found"),
    ),
    tag = "vueltas"
)]
pub async fn get_stats(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Query(query): Query<StatsQuery>,
) -> AppResult<Response> {
    let view = state
        .registry
        .view(device_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))?;

    let key = cache::cache_key("stats", &[&device_id.to_string(), &query.verify.to_string()]);
    if let Some(hit) = cache::get_cached(&state, &key, device_id).await {
        return cache::cached_response(&hit, true);
    }

    let verificado = if query.verify {
        let history = load_history(&state, device_id, None).await?;
        let recomputed = StatsAggregator::recompute(&history);
        let agrees = view.stats.agrees_with(&recomputed, STATS_EPSILON);
        if !agrees {
            tracing::warn!(
                device_id = %device_id,
                running = view.stats.total_vueltas,
                recomputed = recomputed.total_vueltas,
                "Running stats disagree with recomputed history"
            );
        }
        Some(agrees)
    } else {
        None
    };

    let version = view.snapshot.stats.total_vueltas;
    let response = StatsResponse::new(device_id, &view.snapshot.stats, verificado);
    cache::cache_and_respond(&state, key, &response, version).await
}
