use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::routes::vueltas::VueltaResponse;
use crate::tracking::{DeviceSnapshot, LiveState};

fn default_true() -> bool {
    true
}

/// Device registration or profile update
#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct DeviceRequest {
    pub nombre: String,
    /// `pivote`, `lineal` or `aspersion`
    pub tipo: String,
    /// Default coverage radius in meters
    pub radio_cobertura_m: f64,
    /// Flow in liters per minute
    pub caudal_l_min: Option<f64>,
    /// Minutes for one full revolution
    pub tiempo_vuelta_completa_min: Option<f64>,
    #[serde(default = "default_true")]
    pub activo: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LiveStateResponse {
    pub device_id: Uuid,
    pub sector_actual: Option<Uuid>,
    pub sector_numero: Option<i32>,
    pub angulo_actual: Option<f64>,
    pub regando: bool,
    /// `detenido`, `regando` or `pausado`
    pub estado: String,
    pub ultima_actividad: Option<DateTime<Utc>>,
}

impl LiveStateResponse {
    pub fn new(device_id: Uuid, live: &LiveState) -> Self {
        Self {
            device_id,
            sector_actual: live.sector_actual,
            sector_numero: live.sector_numero,
            angulo_actual: live.angulo_actual,
            regando: live.regando,
            estado: live.estado.as_str().to_string(),
            ultima_actividad: live.ultima_actividad,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeviceResponse {
    pub id: Uuid,
    pub nombre: String,
    pub tipo: String,
    pub radio_cobertura_m: f64,
    pub caudal_l_min: Option<f64>,
    pub tiempo_vuelta_completa_min: Option<f64>,
    pub activo: bool,
    /// Number of configured sectors in the active lot
    pub sectores: usize,
    pub live: LiveStateResponse,
    /// Number of the open vuelta, if any
    pub vuelta_abierta: Option<i32>,
    pub porcentaje_completado: Option<f64>,
}

impl From<&DeviceSnapshot> for DeviceResponse {
    fn from(s: &DeviceSnapshot) -> Self {
        let p = &s.profile;
        Self {
            id: p.id,
            nombre: p.nombre.clone(),
            tipo: p.tipo.as_str().to_string(),
            radio_cobertura_m: p.radio_cobertura_m,
            caudal_l_min: p.flujo.caudal_l_min,
            tiempo_vuelta_completa_min: p.flujo.tiempo_vuelta_completa_min,
            activo: p.activo,
            sectores: s.sectores,
            live: LiveStateResponse::new(p.id, &s.live),
            vuelta_abierta: s.vuelta_abierta.as_ref().map(|v| v.numero_vuelta),
            porcentaje_completado: s.vuelta_abierta.as_ref().map(|v| v.porcentaje_completado),
        }
    }
}

/// The open vuelta with its running figures
#[derive(Debug, Serialize, ToSchema)]
pub struct OpenVueltaResponse {
    pub vuelta: VueltaResponse,
    /// Estimated minutes to completion, from the configured revolution time
    pub tiempo_restante_estimado_min: Option<f64>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StopQuery {
    /// When the stop happened (default: now)
    pub at: Option<DateTime<Utc>>,
}
