use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::tracking::{DeviceStats, Vuelta};

fn default_format() -> String {
    "json".to_string()
}

/// One vuelta (full revolution), open or closed
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VueltaResponse {
    pub id: Uuid,
    pub device_id: Uuid,
    pub numero_vuelta: i32,
    pub angulo_inicio: f64,
    pub fecha_inicio: DateTime<Utc>,
    /// Null while the vuelta is open
    pub fecha_fin: Option<DateTime<Utc>>,
    pub completada: bool,
    /// `completada`, `inactividad` or `reemplazada`; null while open
    pub cierre: Option<String>,
    pub sectores_pasados: u32,
    pub sectores_completados: u32,
    pub agua_total_litros: f64,
    pub area_total_ha: f64,
    pub lamina_promedio_mm: f64,
    pub presion_promedio_vuelta: Option<f64>,
    pub duracion_total_minutos: f64,
    pub porcentaje_completado: f64,
    pub anomalias_rotacion: u32,
}

impl From<&Vuelta> for VueltaResponse {
    fn from(v: &Vuelta) -> Self {
        Self {
            id: v.id,
            device_id: v.device_id,
            numero_vuelta: v.numero_vuelta,
            angulo_inicio: v.angulo_inicio,
            fecha_inicio: v.fecha_inicio,
            fecha_fin: v.fecha_fin,
            completada: v.completada,
            cierre: v.cierre.map(|c| c.as_str().to_string()),
            sectores_pasados: v.sectores_pasados,
            sectores_completados: v.sectores_completados,
            agua_total_litros: v.agua_total_litros,
            area_total_ha: v.area_total_ha,
            lamina_promedio_mm: v.lamina_promedio_mm,
            presion_promedio_vuelta: v.presion_promedio_vuelta,
            duracion_total_minutos: v.duracion_total_minutos,
            porcentaje_completado: v.porcentaje_completado,
            anomalias_rotacion: v.anomalias_rotacion,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct VueltasQuery {
    /// Maximum number of vueltas, newest first
    pub limit: Option<u64>,
    /// Response format: json (default), csv
    #[serde(default = "default_format")]
    pub format: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VueltasResponse {
    pub device_id: Uuid,
    pub vueltas: Vec<VueltaResponse>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StatsQuery {
    /// Recompute totals from full history and compare with the running ones
    #[serde(default)]
    pub verify: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    pub device_id: Uuid,
    pub total_vueltas: u64,
    pub vueltas_completadas: u64,
    pub lamina_promedio_mm: f64,
    pub agua_total_m3: f64,
    pub tiempo_total_horas: f64,
    pub area_total_ha: f64,
    /// Present when `verify=true`: whether a full recompute matches
    pub verificado: Option<bool>,
}

impl StatsResponse {
    pub fn new(device_id: Uuid, stats: &DeviceStats, verificado: Option<bool>) -> Self {
        Self {
            device_id,
            total_vueltas: stats.total_vueltas,
            vueltas_completadas: stats.vueltas_completadas,
            lamina_promedio_mm: stats.lamina_promedio_mm,
            agua_total_m3: stats.agua_total_m3,
            tiempo_total_horas: stats.tiempo_total_horas,
            area_total_ha: stats.area_total_ha,
            verificado,
        }
    }
}
