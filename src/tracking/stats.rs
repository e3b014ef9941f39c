//! Device-level totals over closed vueltas.

use serde::{Deserialize, Serialize};

use super::revolution::Vuelta;

const LITERS_PER_M3: f64 = 1000.0;

/// Summary returned to readers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceStats {
    pub total_vueltas: u64,
    pub vueltas_completadas: u64,
    pub lamina_promedio_mm: f64,
    pub agua_total_m3: f64,
    pub tiempo_total_horas: f64,
    pub area_total_ha: f64,
}

/// Running sums updated once per closed vuelta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsAggregator {
    pub total_vueltas: u64,
    pub vueltas_completadas: u64,
    pub suma_lamina_mm: f64,
    pub agua_total_litros: f64,
    pub area_total_ha: f64,
    pub tiempo_total_minutos: f64,
}

impl StatsAggregator {
    /// Fold one closed vuelta into the totals. Open vueltas are ignored.
    pub fn record(&mut self, vuelta: &Vuelta) {
        if vuelta.is_open() {
            return;
        }
        self.total_vueltas += 1;
        if vuelta.completada {
            self.vueltas_completadas += 1;
        }
        self.suma_lamina_mm += vuelta.lamina_promedio_mm;
        self.agua_total_litros += vuelta.agua_total_litros;
        self.area_total_ha += vuelta.area_total_ha;
        self.tiempo_total_minutos += vuelta.duracion_total_minutos;
    }

    /// Rebuild the totals from full history.
    pub fn recompute<'a>(history: impl IntoIterator<Item = &'a Vuelta>) -> Self {
        let mut stats = Self::default();
        for vuelta in history {
            stats.record(vuelta);
        }
        stats
    }

    #[must_use]
    pub fn summary(&self) -> DeviceStats {
        DeviceStats {
            total_vueltas: self.total_vueltas,
            vueltas_completadas: self.vueltas_completadas,
            lamina_promedio_mm: if self.total_vueltas == 0 {
                0.0
            } else {
                self.suma_lamina_mm / self.total_vueltas as f64
            },
            agua_total_m3: self.agua_total_litros / LITERS_PER_M3,
            tiempo_total_horas: self.tiempo_total_minutos / 60.0,
            area_total_ha: self.area_total_ha,
        }
    }

    /// Equal counts and sums within `epsilon` (summation order differs
    /// between the running and recomputed paths).
    #[must_use]
    pub fn agrees_with(&self, other: &Self, epsilon: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= epsilon * a.abs().max(b.abs()).max(1.0);
        self.total_vueltas == other.total_vueltas
            && self.vueltas_completadas == other.vueltas_completadas
            && close(self.suma_lamina_mm, other.suma_lamina_mm)
            && close(self.agua_total_litros, other.agua_total_litros)
            && close(self.area_total_ha, other.area_total_ha)
            && close(self.tiempo_total_minutos, other.tiempo_total_minutos)
    }
}
