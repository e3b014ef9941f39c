//! Water application accounting for the open vuelta.
//!
//! Liters per square meter and millimeters of depth are the same quantity,
//! so `lamina_mm = liters / area_m2` with no further unit constants.

use serde::{Deserialize, Serialize};

use super::sectors::{Sector, SectorId};

/// `caudal × coeficiente × dwell`, in liters.
#[must_use]
pub fn applied_liters(caudal_l_min: f64, coeficiente_riego: f64, dwell_min: f64) -> f64 {
    caudal_l_min * coeficiente_riego * dwell_min
}

/// Water depth in millimeters for `liters` spread over `area_m2`.
#[must_use]
pub fn lamina_mm(liters: f64, area_m2: f64) -> f64 {
    if area_m2 > 0.0 { liters / area_m2 } else { 0.0 }
}

/// Dwell record of one sector inside the open vuelta.
///
/// Area and coefficient are captured on first visit so a configuration
/// change mid-vuelta does not rewrite what was already applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorDwell {
    pub sector_id: SectorId,
    pub numero: i32,
    pub area_m2: f64,
    pub coeficiente_riego: f64,
    pub dwell_secs: f64,
    pub entered_in_vuelta: bool,
    pub exited: bool,
}

impl SectorDwell {
    #[must_use]
    pub fn liters(&self, caudal_l_min: f64) -> f64 {
        applied_liters(caudal_l_min, self.coeficiente_riego, self.dwell_secs / 60.0)
    }

    /// Both boundaries were crossed inside the vuelta and the sector was
    /// occupied for at least `min_dwell_secs`.
    #[must_use]
    pub fn fully_irrigated(&self, min_dwell_secs: f64) -> bool {
        self.entered_in_vuelta && self.exited && self.dwell_secs >= min_dwell_secs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorWater {
    pub sector_id: SectorId,
    pub numero: i32,
    pub dwell_minutes: f64,
    pub litros: f64,
    pub lamina_mm: f64,
    pub completo: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WaterSummary {
    pub agua_total_litros: f64,
    pub area_total_ha: f64,
    pub lamina_promedio_mm: f64,
    pub sectores_completados: u32,
    pub sectores: Vec<SectorWater>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaterAccumulator {
    dwell: Vec<SectorDwell>,
}

impl WaterAccumulator {
    /// Register a visit to `sector`. `entered` marks that its start boundary
    /// was crossed inside the vuelta.
    pub fn visit(&mut self, sector: &Sector, entered: bool) {
        if let Some(record) = self.find_mut(sector.id) {
            record.entered_in_vuelta |= entered;
            return;
        }
        self.dwell.push(SectorDwell {
            sector_id: sector.id,
            numero: sector.numero,
            area_m2: sector.area_m2(),
            coeficiente_riego: sector.coeficiente_riego,
            dwell_secs: 0.0,
            entered_in_vuelta: entered,
            exited: false,
        });
    }

    /// Add irrigated time to a previously visited sector.
    pub fn accrue(&mut self, sector_id: SectorId, secs: f64) {
        if secs <= 0.0 || !secs.is_finite() {
            return;
        }
        if let Some(record) = self.find_mut(sector_id) {
            record.dwell_secs += secs;
        }
    }

    pub fn mark_exit(&mut self, sector_id: SectorId) {
        if let Some(record) = self.find_mut(sector_id) {
            record.exited = true;
        }
    }

    #[must_use]
    pub fn records(&self) -> &[SectorDwell] {
        &self.dwell
    }

    pub fn reset(&mut self) {
        self.dwell.clear();
    }

    /// Volume, area and lámina over every visited sector.
    ///
    /// Without a configured caudal no volume can be derived and all water
    /// figures are zero.
    #[must_use]
    pub fn summary(&self, caudal_l_min: Option<f64>, min_dwell_secs: f64) -> WaterSummary {
        let caudal = caudal_l_min.filter(|c| c.is_finite() && *c > 0.0).unwrap_or(0.0);

        let sectores: Vec<SectorWater> = self
            .dwell
            .iter()
            .map(|d| {
                let litros = d.liters(caudal);
                SectorWater {
                    sector_id: d.sector_id,
                    numero: d.numero,
                    dwell_minutes: d.dwell_secs / 60.0,
                    litros,
                    lamina_mm: lamina_mm(litros, d.area_m2),
                    completo: d.fully_irrigated(min_dwell_secs),
                }
            })
            .collect();

        let agua_total_litros = sectores.iter().map(|s| s.litros).sum();
        let area_total_ha = self.dwell.iter().map(|d| d.area_m2).sum::<f64>() / 10_000.0;
        let lamina_promedio_mm = if sectores.is_empty() {
            0.0
        } else {
            sectores.iter().map(|s| s.lamina_mm).sum::<f64>() / sectores.len() as f64
        };
        let sectores_completados = sectores.iter().filter(|s| s.completo).count() as u32;

        WaterSummary {
            agua_total_litros,
            area_total_ha,
            lamina_promedio_mm,
            sectores_completados,
            sectores,
        }
    }

    fn find_mut(&mut self, sector_id: SectorId) -> Option<&mut SectorDwell> {
        self.dwell.iter_mut().find(|d| d.sector_id == sector_id)
    }
}
