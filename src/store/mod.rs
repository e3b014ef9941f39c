//! Persistence contract for device configuration, live state and history.
//!
//! Every write the engine makes goes through [`IrrigationStore::commit`], which
//! must be idempotent: re-committing the same sample after a retry leaves the
//! store unchanged.

use async_trait::async_trait;
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::TrackingConfig;
use crate::tracking::{
    Changes, DeviceProfile, DeviceTracker, LiveState, PositionSample, SectorId, SectorSpec,
    StatsAggregator, TrackerCheckpoint, Vuelta,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Fixed point of a pivot within one lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotCenter {
    pub lote_id: Uuid,
    pub latitud: f64,
    pub longitud: f64,
    pub radio_cobertura_m: f64,
}

/// Everything needed to rebuild a device tracker at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDevice {
    pub profile: DeviceProfile,
    pub lote_activo: Option<Uuid>,
    pub pivot: Option<PivotCenter>,
    /// Sectors of the active lot.
    pub sectors: Vec<SectorSpec>,
    pub checkpoint: Option<TrackerCheckpoint>,
    pub ultimo_numero: i32,
    pub history: StatsAggregator,
}

/// One atomic write produced by applying a sample, a sweep or a stop.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCommit {
    pub device_id: Uuid,
    pub sample: Option<PositionSample>,
    pub live: LiveState,
    pub checkpoint: TrackerCheckpoint,
    /// Closed vueltas plus the current open one, if any.
    pub vueltas: Vec<Vuelta>,
    pub stats: StatsAggregator,
}

impl DeviceCommit {
    #[must_use]
    pub fn capture(
        tracker: &DeviceTracker,
        sample: Option<&PositionSample>,
        changes: &Changes,
        cfg: &TrackingConfig,
    ) -> Self {
        let mut vueltas = changes.closed.clone();
        vueltas.extend(tracker.open_vuelta_view(cfg));
        Self {
            device_id: tracker.profile().id,
            sample: sample.cloned(),
            live: tracker.live_state(),
            checkpoint: tracker.checkpoint().clone(),
            vueltas,
            stats: tracker.stats().clone(),
        }
    }
}

#[async_trait]
pub trait IrrigationStore: Send + Sync {
    /// Load every registered device with its active configuration and state.
    async fn load_devices(&self) -> Result<Vec<StoredDevice>, DbErr>;

    /// Insert or update a device profile.
    async fn save_device(&self, profile: &DeviceProfile) -> Result<(), DbErr>;

    /// Replace the sectors of one lot and make it the device's active lot.
    /// Applied atomically.
    async fn replace_sectors(
        &self,
        device_id: Uuid,
        pivot: &PivotCenter,
        sectors: &[SectorSpec],
    ) -> Result<(), DbErr>;

    async fn set_sector_active(
        &self,
        device_id: Uuid,
        sector_id: SectorId,
        activo: bool,
    ) -> Result<(), DbErr>;

    /// Persist the outcome of one tracker step. Must be idempotent.
    async fn commit(&self, commit: &DeviceCommit) -> Result<(), DbErr>;

    /// Closed vueltas, newest first.
    async fn list_vueltas(&self, device_id: Uuid, limit: Option<u64>)
    -> Result<Vec<Vuelta>, DbErr>;
}
