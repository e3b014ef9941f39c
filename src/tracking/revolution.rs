//! Vuelta (full revolution) lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::circular::{FULL_TURN, normalize, signed_delta};
use super::resolver::seconds_between;
use super::sectors::SectorId;
use super::water::WaterSummary;
use crate::config::TrackingConfig;

/// How a vuelta ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Swept the full circle.
    Completada,
    /// Device stopped or stalled past the idle timeout.
    Inactividad,
    /// A new start was detected while this one was still open.
    Reemplazada,
}

impl CloseReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completada => "completada",
            Self::Inactividad => "inactividad",
            Self::Reemplazada => "reemplazada",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completada" => Some(Self::Completada),
            "inactividad" => Some(Self::Inactividad),
            "reemplazada" => Some(Self::Reemplazada),
            _ => None,
        }
    }
}

/// A vuelta as exposed to readers and persisted. `fecha_fin` and `cierre`
/// are `None` while it is still open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vuelta {
    pub id: Uuid,
    pub device_id: Uuid,
    pub numero_vuelta: i32,
    pub angulo_inicio: f64,
    pub fecha_inicio: DateTime<Utc>,
    pub fecha_fin: Option<DateTime<Utc>>,
    pub completada: bool,
    pub cierre: Option<CloseReason>,
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

impl Vuelta {
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.fecha_fin.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationAnomaly {
    pub backward_deg: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub advanced_deg: f64,
    pub anomaly: Option<RotationAnomaly>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenVuelta {
    pub id: Uuid,
    pub device_id: Uuid,
    pub numero_vuelta: i32,
    pub angulo_inicio: f64,
    pub fecha_inicio: DateTime<Utc>,
    pub recorrido_deg: f64,
    pub sectores_visitados: Vec<SectorId>,
    pub anomalias_rotacion: u32,
    pub ultima_muestra: DateTime<Utc>,
    pub ultimo_avance: DateTime<Utc>,
    progress_angle: f64,
    presion_suma: f64,
    presion_muestras: u32,
}

impl OpenVuelta {
    #[must_use]
    pub fn porcentaje_completado(&self) -> f64 {
        (self.recorrido_deg / FULL_TURN * 100.0).min(100.0)
    }

    #[must_use]
    pub fn sectores_pasados(&self) -> u32 {
        self.sectores_visitados.len() as u32
    }

    #[must_use]
    pub fn presion_promedio(&self) -> Option<f64> {
        (self.presion_muestras > 0).then(|| self.presion_suma / f64::from(self.presion_muestras))
    }

    pub fn visit(&mut self, sector: SectorId) {
        if !self.sectores_visitados.contains(&sector) {
            self.sectores_visitados.push(sector);
        }
    }

    pub fn record_pressure(&mut self, pressure_psi: Option<f64>) {
        if let Some(p) = pressure_psi.filter(|p| p.is_finite()) {
            self.presion_suma += p;
            self.presion_muestras += 1;
        }
    }

    /// Advance progress to `angle`.
    ///
    /// Travel only ever grows. Backward deltas within the noise tolerance are
    /// ignored; larger ones are reported as an anomaly and the progress angle
    /// is re-anchored at `angle` so the reversal is never counted as travel.
    pub fn advance(&mut self, angle: f64, at: DateTime<Utc>, cfg: &TrackingConfig) -> Progress {
        let angle = normalize(angle);
        let delta = signed_delta(self.progress_angle, angle);
        self.ultima_muestra = at;

        let mut progress = Progress {
            advanced_deg: 0.0,
            anomaly: None,
            completed: false,
        };

        if delta > 0.0 {
            self.recorrido_deg += delta;
            self.progress_angle = angle;
            self.ultimo_avance = at;
            progress.advanced_deg = delta;
        } else if -delta > cfg.reversal_noise_deg {
            self.anomalias_rotacion += 1;
            self.progress_angle = angle;
            progress.anomaly = Some(RotationAnomaly {
                backward_deg: -delta,
                at,
            });
        }

        let tolerance = cfg.completion_tolerance_deg.clamp(0.0, FULL_TURN / 2.0);
        progress.completed = self.recorrido_deg >= FULL_TURN - tolerance;
        progress
    }

    /// View of this vuelta with the water figures so far.
    #[must_use]
    pub fn to_vuelta(
        &self,
        water: &WaterSummary,
        fecha_fin: Option<DateTime<Utc>>,
        cierre: Option<CloseReason>,
    ) -> Vuelta {
        let completada = cierre == Some(CloseReason::Completada);
        let end = fecha_fin.unwrap_or(self.ultima_muestra);
        Vuelta {
            id: self.id,
            device_id: self.device_id,
            numero_vuelta: self.numero_vuelta,
            angulo_inicio: self.angulo_inicio,
            fecha_inicio: self.fecha_inicio,
            fecha_fin,
            completada,
            cierre,
            sectores_pasados: self.sectores_pasados(),
            sectores_completados: if completada {
                self.sectores_pasados()
            } else {
                water.sectores_completados
            },
            agua_total_litros: water.agua_total_litros,
            area_total_ha: water.area_total_ha,
            lamina_promedio_mm: water.lamina_promedio_mm,
            presion_promedio_vuelta: self.presion_promedio(),
            duracion_total_minutos: seconds_between(self.fecha_inicio, end) / 60.0,
            porcentaje_completado: if completada {
                100.0
            } else {
                self.porcentaje_completado()
            },
            anomalias_rotacion: self.anomalias_rotacion,
        }
    }
}

/// Stable id of a device's n-th vuelta, so re-applying a sample after a
/// failed commit produces the same record.
#[must_use]
pub fn vuelta_id(device_id: Uuid, numero_vuelta: i32) -> Uuid {
    Uuid::new_v5(&device_id, numero_vuelta.to_string().as_bytes())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RevolutionTracker {
    open: Option<OpenVuelta>,
    ultimo_numero: i32,
}

impl RevolutionTracker {
    /// Resume numbering after the highest `numero_vuelta` already recorded.
    #[must_use]
    pub fn with_last_number(ultimo_numero: i32) -> Self {
        Self {
            open: None,
            ultimo_numero,
        }
    }

    #[must_use]
    pub fn ultimo_numero(&self) -> i32 {
        self.ultimo_numero
    }

    #[must_use]
    pub fn current(&self) -> Option<&OpenVuelta> {
        self.open.as_ref()
    }

    pub fn current_mut(&mut self) -> Option<&mut OpenVuelta> {
        self.open.as_mut()
    }

    /// Open the next vuelta at `angle`. Callers close any open one first.
    pub fn open(&mut self, device_id: Uuid, angle: f64, at: DateTime<Utc>) -> &mut OpenVuelta {
        self.ultimo_numero += 1;
        let angle = normalize(angle);
        self.open.insert(OpenVuelta {
            id: vuelta_id(device_id, self.ultimo_numero),
            device_id,
            numero_vuelta: self.ultimo_numero,
            angulo_inicio: angle,
            fecha_inicio: at,
            recorrido_deg: 0.0,
            sectores_visitados: Vec::new(),
            anomalias_rotacion: 0,
            ultima_muestra: at,
            ultimo_avance: at,
            progress_angle: angle,
            presion_suma: 0.0,
            presion_muestras: 0,
        })
    }

    /// Close the open vuelta, if any, into an immutable record.
    pub fn close(
        &mut self,
        reason: CloseReason,
        fecha_fin: DateTime<Utc>,
        water: &WaterSummary,
    ) -> Option<Vuelta> {
        let open = self.open.take()?;
        Some(open.to_vuelta(water, Some(fecha_fin), Some(reason)))
    }
}
