//! Per-device aggregate: the only unit of mutable tracking state.
//!
//! A sample flows through resolver → state machine → revolution tracker →
//! water accumulator → stats, in that order. Everything here is synchronous
//! and deterministic given the sample timestamps; locking and persistence
//! live in `crate::ingest`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::circular::{normalize, signed_delta};
use super::resolver::{PositionResolver, SectorEvent, seconds_between};
use super::revolution::{CloseReason, RevolutionTracker, RotationAnomaly, Vuelta};
use super::sectors::{SectorId, SectorSet};
use super::state_machine::{DeviceStateMachine, OperatingState, StateTransition};
use super::stats::{DeviceStats, StatsAggregator};
use super::water::WaterAccumulator;
use crate::config::TrackingConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Pivote,
    Lineal,
    Aspersion,
}

impl DeviceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pivote => "pivote",
            Self::Lineal => "lineal",
            Self::Aspersion => "aspersion",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pivote" => Some(Self::Pivote),
            "lineal" => Some(Self::Lineal),
            "aspersion" => Some(Self::Aspersion),
            _ => None,
        }
    }
}

/// Flow is configured either as a caudal or as the time of a full revolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    pub caudal_l_min: Option<f64>,
    pub tiempo_vuelta_completa_min: Option<f64>,
}

impl FlowConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        let positive = |v: Option<f64>| v.is_some_and(|v| v.is_finite() && v > 0.0);
        positive(self.caudal_l_min) || positive(self.tiempo_vuelta_completa_min)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: Uuid,
    pub nombre: String,
    pub tipo: DeviceKind,
    pub radio_cobertura_m: f64,
    pub flujo: FlowConfig,
    pub activo: bool,
}

/// One validated telemetry sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub device_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub angle: Option<f64>,
    pub pressure_psi: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_kmh: Option<f64>,
}

impl PositionSample {
    /// Telemetry indicates water flow unless a pressure reading says otherwise.
    #[must_use]
    pub fn activity(&self, cfg: &TrackingConfig) -> bool {
        self.pressure_psi
            .filter(|p| p.is_finite())
            .is_none_or(|p| p >= cfg.min_active_pressure_psi)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    MissingAngle,
    Duplicate,
    OutOfOrder,
    DeviceInactive,
}

impl DropReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingAngle => "missing_angle",
            Self::Duplicate => "duplicate",
            Self::OutOfOrder => "out_of_order",
            Self::DeviceInactive => "device_inactive",
        }
    }
}

/// Everything a sample, a tick or a stop signal changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub events: Vec<SectorEvent>,
    pub transitions: Vec<StateTransition>,
    pub opened: Option<Uuid>,
    pub closed: Vec<Vuelta>,
    pub anomaly: Option<RotationAnomaly>,
}

impl Changes {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.transitions.is_empty()
            && self.opened.is_none()
            && self.closed.is_empty()
            && self.anomaly.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(Changes),
    Dropped(DropReason),
}

/// Serializable runtime state, persisted with the live state so a restart
/// resumes mid-vuelta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerCheckpoint {
    pub resolver: PositionResolver,
    pub machine: DeviceStateMachine,
    pub revolutions: RevolutionTracker,
    pub water: WaterAccumulator,
    pub stats: StatsAggregator,
    pub last_angle: Option<f64>,
    pub last_sample_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_pressure: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveState {
    pub sector_actual: Option<SectorId>,
    pub sector_numero: Option<i32>,
    pub angulo_actual: Option<f64>,
    pub estado: OperatingState,
    pub regando: bool,
    pub ultima_actividad: Option<DateTime<Utc>>,
}

/// Committed, read-only view of one device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    pub profile: DeviceProfile,
    pub live: LiveState,
    pub vuelta_abierta: Option<Vuelta>,
    pub tiempo_restante_estimado_min: Option<f64>,
    pub stats: DeviceStats,
    pub sectores: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceTracker {
    profile: DeviceProfile,
    sectors: SectorSet,
    state: TrackerCheckpoint,
}

impl DeviceTracker {
    #[must_use]
    pub fn new(profile: DeviceProfile, sectors: SectorSet) -> Self {
        Self::restore(profile, sectors, TrackerCheckpoint::default())
    }

    /// Fresh runtime state that continues numbering and totals from history.
    #[must_use]
    pub fn with_history(
        profile: DeviceProfile,
        sectors: SectorSet,
        ultimo_numero: i32,
        stats: StatsAggregator,
    ) -> Self {
        let state = TrackerCheckpoint {
            revolutions: RevolutionTracker::with_last_number(ultimo_numero),
            stats,
            ..TrackerCheckpoint::default()
        };
        Self::restore(profile, sectors, state)
    }

    #[must_use]
    pub fn restore(profile: DeviceProfile, sectors: SectorSet, state: TrackerCheckpoint) -> Self {
        Self {
            profile,
            sectors,
            state,
        }
    }

    #[must_use]
    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    #[must_use]
    pub fn sectors(&self) -> &SectorSet {
        &self.sectors
    }

    #[must_use]
    pub fn checkpoint(&self) -> &TrackerCheckpoint {
        &self.state
    }

    #[must_use]
    pub fn state(&self) -> OperatingState {
        self.state.machine.state()
    }

    #[must_use]
    pub fn stats(&self) -> &StatsAggregator {
        &self.state.stats
    }

    pub fn set_profile(&mut self, profile: DeviceProfile) {
        self.profile = profile;
    }

    pub fn set_sectors(&mut self, sectors: SectorSet) {
        self.sectors = sectors;
    }

    /// Apply one sample.
    pub fn apply(&mut self, sample: &PositionSample, cfg: &TrackingConfig) -> ApplyOutcome {
        if !self.profile.activo {
            return ApplyOutcome::Dropped(DropReason::DeviceInactive);
        }
        let Some(raw_angle) = sample.angle.filter(|a| a.is_finite()) else {
            return ApplyOutcome::Dropped(DropReason::MissingAngle);
        };
        if let Some(last) = self.state.last_sample_at {
            if sample.timestamp == last {
                return ApplyOutcome::Dropped(DropReason::Duplicate);
            }
            if sample.timestamp < last {
                return ApplyOutcome::Dropped(DropReason::OutOfOrder);
            }
        }

        let at = sample.timestamp;
        let prev_at = self.state.last_sample_at;
        let silence_broken = prev_at.is_some_and(|last| at - last > cfg.idle_timeout());
        let mut changes = self.expire(at, cfg);

        // After a silence longer than the idle timeout the previous angle says
        // nothing about motion, so this sample starts from scratch.
        let prev_angle = if silence_broken {
            None
        } else {
            self.state.last_angle
        };

        let angle = normalize(raw_angle);
        let (effective, delta) = match prev_angle {
            Some(prev) => {
                let d = signed_delta(prev, angle);
                if d < 0.0 && -d <= cfg.reversal_noise_deg {
                    (prev, Some(0.0))
                } else {
                    (angle, Some(d))
                }
            }
            None => (angle, None),
        };
        let interval_secs = prev_at.map_or(0.0, |last| seconds_between(last, at));
        let prior_state = self.state.machine.state();
        let prev_sector = self.state.resolver.current();

        changes.events = self
            .state
            .resolver
            .observe(&self.sectors, Some(effective), at);

        let transition =
            self.state
                .machine
                .on_sample(delta, sample.activity(cfg), at, cfg);

        let mut started_here = false;
        if let Some(t) = transition {
            tracing::info!(
                device_id = %self.profile.id,
                from = t.from.as_str(),
                to = t.to.as_str(),
                reason = ?t.reason,
                angle = effective,
                "Device state changed"
            );
            changes.transitions.push(t);

            if t.from == OperatingState::Detenido && t.to == OperatingState::Regando {
                let stale_at = prev_at.unwrap_or(at);
                if let Some(stale) = self.close_vuelta(CloseReason::Reemplazada, stale_at, cfg) {
                    tracing::warn!(
                        device_id = %self.profile.id,
                        numero_vuelta = stale.numero_vuelta,
                        "Force-closed stale vuelta on new start"
                    );
                    changes.closed.push(stale);
                }
                // The movement that triggered the start began at the previous sample.
                let anchor_angle = prev_angle.unwrap_or(effective);
                changes.opened = Some(self.open_vuelta(anchor_angle, stale_at, prev_sector));
                if prev_angle.is_some() {
                    let anchor_pressure = self.state.last_pressure;
                    if let Some(open) = self.state.revolutions.current_mut() {
                        open.record_pressure(anchor_pressure);
                    }
                }
                started_here = true;
            }
        }

        if self.state.machine.state() == OperatingState::Regando
            && self.state.revolutions.current().is_none()
        {
            let sector = self.state.resolver.current();
            changes.opened = Some(self.open_vuelta(effective, at, sector));
        }

        if self.state.revolutions.current().is_some() {
            if prior_state == OperatingState::Regando || started_here {
                if let Some(sector) = prev_sector {
                    self.state.water.accrue(sector, interval_secs);
                }
            }
            self.record_events(&changes.events);
        }

        let regando = self.state.machine.state() == OperatingState::Regando;
        let progress = match self.state.revolutions.current_mut() {
            Some(open) => {
                open.record_pressure(sample.pressure_psi);
                if regando {
                    Some(open.advance(effective, at, cfg))
                } else {
                    open.ultima_muestra = at;
                    None
                }
            }
            None => None,
        };

        if let Some(progress) = progress {
            if let Some(anomaly) = progress.anomaly {
                tracing::warn!(
                    device_id = %self.profile.id,
                    backward_deg = anomaly.backward_deg,
                    "Rotation reversal beyond noise tolerance, progress held"
                );
                changes.anomaly = Some(anomaly);
            }
            if progress.completed {
                if let Some(done) = self.close_vuelta(CloseReason::Completada, at, cfg) {
                    changes.closed.push(done);
                }
                let sector = self.state.resolver.current();
                changes.opened = Some(self.open_vuelta(effective, at, sector));
            }
        }

        self.state.last_angle = Some(effective);
        self.state.last_sample_at = Some(at);
        self.state.last_pressure = sample.pressure_psi;
        ApplyOutcome::Applied(changes)
    }

    /// Evaluate idle timeouts at `now`.
    pub fn expire(&mut self, now: DateTime<Utc>, cfg: &TrackingConfig) -> Changes {
        let mut changes = Changes::default();

        if let Some(t) = self.state.machine.on_tick(now, cfg) {
            tracing::info!(
                device_id = %self.profile.id,
                from = t.from.as_str(),
                reason = ?t.reason,
                "Device idle, stopping"
            );
            changes.transitions.push(t);
        }

        let abandoned_at = self.state.revolutions.current().and_then(|open| {
            let idle = self.state.machine.state() != OperatingState::Regando
                && now - open.ultimo_avance > cfg.idle_timeout();
            idle.then_some(open.ultima_muestra)
        });
        if let Some(fecha_fin) = abandoned_at {
            if let Some(closed) = self.close_vuelta(CloseReason::Inactividad, fecha_fin, cfg) {
                changes.closed.push(closed);
            }
        }

        changes
    }

    /// Explicit stop signal. The open vuelta stays open until it times out
    /// or a new start supersedes it.
    pub fn stop(&mut self, at: DateTime<Utc>) -> Changes {
        let mut changes = Changes::default();
        if let Some(t) = self.state.machine.stop(at) {
            tracing::info!(device_id = %self.profile.id, from = t.from.as_str(), "Stop signal");
            changes.transitions.push(t);
        }
        changes
    }

    #[must_use]
    pub fn live_state(&self) -> LiveState {
        let sector = self
            .state
            .resolver
            .current()
            .and_then(|id| self.sectors.get(id));
        let estado = self.state.machine.state();
        LiveState {
            sector_actual: sector.map(|s| s.id),
            sector_numero: sector.map(|s| s.numero),
            angulo_actual: self.state.last_angle,
            estado,
            regando: estado == OperatingState::Regando,
            ultima_actividad: self.state.last_sample_at,
        }
    }

    /// The open vuelta with its water figures so far.
    #[must_use]
    pub fn open_vuelta_view(&self, cfg: &TrackingConfig) -> Option<Vuelta> {
        let open = self.state.revolutions.current()?;
        let water = self
            .state
            .water
            .summary(self.profile.flujo.caudal_l_min, cfg.min_dwell_seconds);
        Some(open.to_vuelta(&water, None, None))
    }

    #[must_use]
    pub fn snapshot(&self, cfg: &TrackingConfig) -> DeviceSnapshot {
        let vuelta_abierta = self.open_vuelta_view(cfg);
        let tiempo_restante_estimado_min = vuelta_abierta.as_ref().and_then(|v| {
            self.profile
                .flujo
                .tiempo_vuelta_completa_min
                .map(|total| total * (1.0 - v.porcentaje_completado / 100.0))
        });
        DeviceSnapshot {
            profile: self.profile.clone(),
            live: self.live_state(),
            vuelta_abierta,
            tiempo_restante_estimado_min,
            stats: self.state.stats.summary(),
            sectores: self.sectors.len(),
        }
    }

    fn open_vuelta(&mut self, angle: f64, at: DateTime<Utc>, sector: Option<SectorId>) -> Uuid {
        let open = self.state.revolutions.open(self.profile.id, angle, at);
        let (id, numero) = (open.id, open.numero_vuelta);
        if let Some(sector) = sector.and_then(|id| self.sectors.get(id)) {
            open.visit(sector.id);
            self.state.water.visit(sector, false);
        }
        tracing::info!(
            device_id = %self.profile.id,
            numero_vuelta = numero,
            angulo_inicio = angle,
            "Vuelta opened"
        );
        id
    }

    fn close_vuelta(
        &mut self,
        reason: CloseReason,
        fecha_fin: DateTime<Utc>,
        cfg: &TrackingConfig,
    ) -> Option<Vuelta> {
        let water = self
            .state
            .water
            .summary(self.profile.flujo.caudal_l_min, cfg.min_dwell_seconds);
        let vuelta = self.state.revolutions.close(reason, fecha_fin, &water)?;
        self.state.stats.record(&vuelta);
        self.state.water.reset();
        tracing::info!(
            device_id = %self.profile.id,
            numero_vuelta = vuelta.numero_vuelta,
            cierre = reason.as_str(),
            agua_total_litros = vuelta.agua_total_litros,
            sectores_pasados = vuelta.sectores_pasados,
            "Vuelta closed"
        );
        Some(vuelta)
    }

    fn record_events(&mut self, events: &[SectorEvent]) {
        for event in events {
            match event {
                SectorEvent::Exit { sector, .. } => self.state.water.mark_exit(*sector),
                SectorEvent::Enter { sector, .. } => {
                    if let Some(s) = self.sectors.get(*sector) {
                        self.state.water.visit(s, true);
                        if let Some(open) = self.state.revolutions.current_mut() {
                            open.visit(s.id);
                        }
                    }
                }
            }
        }
    }
}
