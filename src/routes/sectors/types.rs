use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::PivotCenter;
use crate::tracking::Sector;

fn default_coeficiente() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct PivotCenterRequest {
    pub latitud: f64,
    pub longitud: f64,
    /// Coverage radius in this lot (default: the device's radius)
    pub radio_cobertura_m: Option<f64>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SectorRequest {
    /// Stable sector id (default: derived from lot and numero)
    pub id: Option<Uuid>,
    pub numero: i32,
    /// Start angle in degrees, inclusive
    pub angulo_inicio: f64,
    /// End angle in degrees, exclusive; smaller than the start for a wrapping sector
    pub angulo_fin: f64,
    #[serde(default)]
    pub radio_interno_m: f64,
    /// Outer radius (default: the pivot's coverage radius)
    pub radio_externo_m: Option<f64>,
    #[serde(default = "default_coeficiente")]
    pub coeficiente_riego: f64,
    #[serde(default)]
    pub prioridad: i32,
    #[serde(default = "default_true")]
    pub activo: bool,
}

/// Full sector configuration of one lot, applied atomically
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SectorConfigRequest {
    pub pivot: PivotCenterRequest,
    pub sectores: Vec<SectorRequest>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SectorToggleRequest {
    pub activo: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SectorResponse {
    pub id: Uuid,
    pub numero: i32,
    pub angulo_inicio: f64,
    pub angulo_fin: f64,
    pub radio_interno_m: f64,
    pub radio_externo_m: f64,
    pub coeficiente_riego: f64,
    pub prioridad: i32,
    pub activo: bool,
    pub area_ha: f64,
}

impl From<&Sector> for SectorResponse {
    fn from(s: &Sector) -> Self {
        Self {
            id: s.id,
            numero: s.numero,
            angulo_inicio: s.range.start,
            angulo_fin: s.range.end_degrees(),
            radio_interno_m: s.radio_interno_m,
            radio_externo_m: s.radio_externo_m,
            coeficiente_riego: s.coeficiente_riego,
            prioridad: s.prioridad,
            activo: s.activo,
            area_ha: s.area_ha(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PivotCenterResponse {
    pub lote_id: Uuid,
    pub latitud: f64,
    pub longitud: f64,
    pub radio_cobertura_m: f64,
}

impl From<&PivotCenter> for PivotCenterResponse {
    fn from(p: &PivotCenter) -> Self {
        Self {
            lote_id: p.lote_id,
            latitud: p.latitud,
            longitud: p.longitud,
            radio_cobertura_m: p.radio_cobertura_m,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SectorsResponse {
    pub device_id: Uuid,
    /// Pivot center of the active lot
    pub pivot: Option<PivotCenterResponse>,
    pub sectores: Vec<SectorResponse>,
}
