use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use uuid::Uuid;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::tracking::{DeviceKind, DeviceProfile, FlowConfig};

use super::types::{DeviceRequest, DeviceResponse, LiveStateResponse, OpenVueltaResponse, StopQuery};

/// Register a device or update its profile
#[utoipa::path(
    put,
    path = "/api/devices/{device_id}",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
    ),
    request_body = DeviceRequest,
    responses(
        (status = 200, description = "Device registered", body = DeviceResponse),
        (status = 400, description = "Invalid profile"),
    ),
    tag = "devices"
)]
pub async fn put_device(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Json(req): Json<DeviceRequest>,
) -> AppResult<Json<DeviceResponse>> {
    let tipo = DeviceKind::parse(&req.tipo)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown device type '{}'", req.tipo)))?;

    let profile = DeviceProfile {
        id: device_id,
        nombre: req.nombre,
        tipo,
        radio_cobertura_m: req.radio_cobertura_m,
        flujo: FlowConfig {
            caudal_l_min: req.caudal_l_min,
            tiempo_vuelta_completa_min: req.tiempo_vuelta_completa_min,
        },
        activo: req.activo,
    };

    let snapshot = state.registry.register_device(profile).await?;
    Ok(Json(DeviceResponse::from(&snapshot)))
}

/// List all devices
#[utoipa::path(
    get,
    path = "/api/devices",
    responses(
        (status = 200, description = "Devices retrieved successfully", body = Vec<DeviceResponse>),
    ),
    tag = "devices"
)]
pub async fn list_devices(State(state): State<AppState>) -> Json<Vec<DeviceResponse>> {
    let snapshots = state.registry.snapshots().await;
    Json(snapshots.iter().map(DeviceResponse::from).collect())
}

/// Live position and operating state of a device
#[utoipa::path(
    get,
    path = "/api/devices/{device_id}/live",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
    ),
    responses(
        (status = 200, description = "Live state", body = LiveStateResponse),
        (status = 404, description = "Device not found"),
    ),
    tag = "devices"
)]
pub async fn get_live(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> AppResult<Json<LiveStateResponse>> {
    let snapshot = state
        .registry
        .snapshot(device_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))?;
    Ok(Json(LiveStateResponse::new(device_id, &snapshot.live)))
}

/// The vuelta currently in progress
#[utoipa::path(
    get,
    path = "/api/devices/{device_id}/vuelta",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
    ),
    responses(
        (status = 200, description = "Open vuelta", body = OpenVueltaResponse),
        (status = 404, description = "Device not found or no vuelta in progress"),
    ),
    tag = "devices"
)]
pub async fn get_open_vuelta(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> AppResult<Json<OpenVueltaResponse>> {
    let snapshot = state
        .registry
        .snapshot(device_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))?;
    let vuelta = snapshot
        .vuelta_abierta
        .as_ref()
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' has no vuelta in progress")))?;

    Ok(Json(OpenVueltaResponse {
        vuelta: vuelta.into(),
        tiempo_restante_estimado_min: snapshot.tiempo_restante_estimado_min,
    }))
}

/// Explicit stop signal
#[utoipa::path(
    post,
    path = "/api/devices/{device_id}/stop",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
        StopQuery,
    ),
    responses(
        (status = 200, description = "Device stopped", body = LiveStateResponse),
        (status = 404, description = "Device not found"),
        (status = 503, description = "Storage unavailable"),
    ),
    tag = "devices"
)]
pub async fn stop_device(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
    Query(query): Query<StopQuery>,
) -> AppResult<Json<LiveStateResponse>> {
    let at = query.at.unwrap_or_else(Utc::now);
    let snapshot = state.registry.stop(device_id, at).await?;
    Ok(Json(LiveStateResponse::new(device_id, &snapshot.live)))
}
