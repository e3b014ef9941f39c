use std::collections::BTreeSet;

use axum::{Json, extract::State};
use serde_json::Value;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::ingest::Ingested;
use crate::ingest::telemetry::{device_id_hint, parse_sample, split_body};
use crate::services::cache;

use super::types::{SampleResult, SampleStatus, TelemetryResponse, TelemetrySample};

/// Ingest position telemetry
///
/// Accepts one sample object or an array of them. Each sample is validated and
/// applied on its own; the response lists the outcome of every element.
#[utoipa::path(
    post,
    path = "/api/telemetry",
    request_body(content = Vec<TelemetrySample>, description = "One sample or an array of samples"),
    responses(
        (status = 200, description = "Per-sample results", body = TelemetryResponse),
        (status = 503, description = "Storage unavailable; earlier samples in the batch were applied"),
    ),
    tag = "telemetry"
)]
pub async fn post_telemetry(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> AppResult<Json<TelemetryResponse>> {
    let items = split_body(body);
    let mut results = Vec::with_capacity(items.len());
    let mut touched = BTreeSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let hint = device_id_hint(&item);
        let sample = match parse_sample(item) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(index, device_id = ?hint, error = %e, "Telemetry sample rejected");
                results.push(SampleResult::rejected(index, hint, e.to_string()));
                continue;
            }
        };

        let ingested = match state.registry.ingest(&sample).await {
            Ok(ingested) => ingested,
            Err(AppError::NotFound(msg)) => {
                tracing::warn!(index, device_id = %sample.device_id, "Telemetry for unknown device");
                results.push(SampleResult::rejected(index, Some(sample.device_id), msg));
                continue;
            }
            Err(e) => {
                // Persistence gave up; samples already applied stay applied
                for device_id in &touched {
                    cache::invalidate_device(&state, *device_id).await;
                }
                return Err(e);
            }
        };

        let mut result = SampleResult {
            index,
            device_id: Some(sample.device_id),
            timestamp: Some(sample.timestamp),
            status: SampleStatus::Applied,
            reason: None,
            estado: None,
            sector_actual: None,
            vuelta_abierta: None,
            vueltas_cerradas: Vec::new(),
        };
        match ingested {
            Ingested::Applied { changes, snapshot } => {
                if !changes.closed.is_empty() {
                    touched.insert(sample.device_id);
                }
                result.estado = Some(snapshot.live.estado.as_str().to_string());
                result.sector_actual = snapshot.live.sector_actual;
                result.vuelta_abierta = changes
                    .opened
                    .and(snapshot.vuelta_abierta.as_ref().map(|v| v.numero_vuelta));
                result.vueltas_cerradas = changes.closed.iter().map(|v| v.numero_vuelta).collect();
            }
            Ingested::Dropped(reason) => {
                result.status = SampleStatus::Dropped;
                result.reason = Some(reason.as_str().to_string());
            }
        }
        results.push(result);
    }

    for device_id in &touched {
        cache::invalidate_device(&state, *device_id).await;
    }

    let count = |status| results.iter().filter(|r| r.status == status).count();
    let response = TelemetryResponse {
        applied: count(SampleStatus::Applied),
        dropped: count(SampleStatus::Dropped),
        rejected: count(SampleStatus::Rejected),
        results,
    };
    tracing::debug!(
        applied = response.applied,
        dropped = response.dropped,
        rejected = response.rejected,
        "Telemetry batch processed"
    );
    Ok(Json(response))
}
