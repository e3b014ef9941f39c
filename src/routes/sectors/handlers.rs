use axum::{
    Json,
    extract::{Path, State},
};
use uuid::Uuid;

use crate::common::AppState;
use crate::error::{AppError, AppResult};
use crate::services::cache;
use crate::store::PivotCenter;
use crate::tracking::SectorSpec;

use super::types::{
    PivotCenterResponse, SectorConfigRequest, SectorRequest, SectorResponse, SectorToggleRequest,
    SectorsResponse,
};

/// Sector id derived from lot and sequence number, so re-sending the same
/// configuration keeps ids stable.
fn default_sector_id(lote_id: Uuid, numero: i32) -> Uuid {
    Uuid::new_v5(&lote_id, format!("sector:{numero}").as_bytes())
}

fn to_spec(lote_id: Uuid, pivot_radius: f64, req: SectorRequest) -> SectorSpec {
    SectorSpec {
        id: req.id.unwrap_or_else(|| default_sector_id(lote_id, req.numero)),
        numero: req.numero,
        angulo_inicio: req.angulo_inicio,
        angulo_fin: req.angulo_fin,
        radio_interno_m: req.radio_interno_m,
        radio_externo_m: req.radio_externo_m.unwrap_or(pivot_radius),
        coeficiente_riego: req.coeficiente_riego,
        prioridad: req.prioridad,
        activo: req.activo,
    }
}

/// Replace the sector configuration of a lot
///
/// The lot becomes the device's active lot. Overlapping or invalid sectors
/// reject the whole configuration.
#[utoipa::path(
    put,
    path = "/api/devices/{device_id}/lots/{lot_id}/sectors",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
        ("lot_id" = Uuid, Path, description = "Lot UUID"),
    ),
    request_body = SectorConfigRequest,
    responses(
        (status = 200, description = "Configuration applied", body = SectorsResponse),
        (status = 404, description = "Device not found"),
        (status = 422, description = "Overlapping or invalid sectors"),
    ),
    tag = "sectors"
)]
pub async fn put_sectors(
    State(state): State<AppState>,
    Path((device_id, lot_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SectorConfigRequest>,
) -> AppResult<Json<SectorsResponse>> {
    let snapshot = state
        .registry
        .snapshot(device_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))?;

    let radius = req
        .pivot
        .radio_cobertura_m
        .unwrap_or(snapshot.profile.radio_cobertura_m);
    if !(radius.is_finite() && radius > 0.0) {
        return Err(AppError::BadRequest(
            "radio_cobertura_m must be positive".to_string(),
        ));
    }
    let pivot = PivotCenter {
        lote_id: lot_id,
        latitud: req.pivot.latitud,
        longitud: req.pivot.longitud,
        radio_cobertura_m: radius,
    };
    let specs = req
        .sectores
        .into_iter()
        .map(|s| to_spec(lot_id, radius, s))
        .collect();

    let sectors = state
        .registry
        .configure_sectors(device_id, pivot.clone(), specs)
        .await?;
    cache::invalidate_device(&state, device_id).await;

    Ok(Json(SectorsResponse {
        device_id,
        pivot: Some(PivotCenterResponse::from(&pivot)),
        sectores: sectors.iter().map(SectorResponse::from).collect(),
    }))
}

/// Sectors of the device's active lot
#[utoipa::path(
    get,
    path = "/api/devices/{device_id}/sectors",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
    ),
    responses(
        (status = 200, description = "Sectors retrieved successfully", body = SectorsResponse),
        (status = 404, description = "Device not found"),
    ),
    tag = "sectors"
)]
pub async fn list_sectors(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> AppResult<Json<SectorsResponse>> {
    let view = state
        .registry
        .view(device_id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))?;

    Ok(Json(SectorsResponse {
        device_id,
        pivot: view.pivot.as_ref().map(PivotCenterResponse::from),
        sectores: view.sectors.sectors().iter().map(SectorResponse::from).collect(),
    }))
}

/// Activate or deactivate one sector
#[utoipa::path(
    patch,
    path = "/api/devices/{device_id}/sectors/{sector_id}",
    params(
        ("device_id" = Uuid, Path, description = "Device UUID"),
        ("sector_id" = Uuid, Path, description = "Sector UUID"),
    ),
    request_body = SectorToggleRequest,
    responses(
        (status = 200, description = "Sector updated", body = SectorResponse),
        (status = 404, description = "Device or sector not found"),
        (status = 422, description = "Activation would overlap another active sector"),
    ),
    tag = "sectors"
)]
pub async fn patch_sector(
    State(state): State<AppState>,
    Path((device_id, sector_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SectorToggleRequest>,
) -> AppResult<Json<SectorResponse>> {
    let sector = state
        .registry
        .set_sector_active(device_id, sector_id, req.activo)
        .await?;
    Ok(Json(SectorResponse::from(&sector)))
}
