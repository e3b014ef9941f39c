//! In-process store, used by tests and local runs without a database.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DeviceCommit, IrrigationStore, PivotCenter, StoredDevice};
use crate::tracking::{
    DeviceProfile, LiveState, SectorId, SectorSpec, StatsAggregator, TrackerCheckpoint, Vuelta,
};

#[derive(Debug, Clone)]
struct DeviceRow {
    profile: DeviceProfile,
    lote_activo: Option<Uuid>,
    pivots: HashMap<Uuid, PivotCenter>,
    sectors: HashMap<Uuid, Vec<SectorSpec>>,
}

#[derive(Debug, Default)]
struct Inner {
    devices: HashMap<Uuid, DeviceRow>,
    live: HashMap<Uuid, (LiveState, TrackerCheckpoint)>,
    samples: BTreeSet<(Uuid, DateTime<Utc>)>,
    vueltas: HashMap<Uuid, BTreeMap<i32, Vuelta>>,
    stats: HashMap<Uuid, StatsAggregator>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct samples stored for a device.
    pub async fn sample_count(&self, device_id: Uuid) -> usize {
        let inner = self.inner.read().await;
        inner
            .samples
            .iter()
            .filter(|(id, _)| *id == device_id)
            .count()
    }

    pub async fn live_state(&self, device_id: Uuid) -> Option<LiveState> {
        let inner = self.inner.read().await;
        inner.live.get(&device_id).map(|(live, _)| live.clone())
    }

    pub async fn stats(&self, device_id: Uuid) -> Option<StatsAggregator> {
        let inner = self.inner.read().await;
        inner.stats.get(&device_id).cloned()
    }
}

#[async_trait]
impl IrrigationStore for MemoryStore {
    async fn load_devices(&self) -> Result<Vec<StoredDevice>, DbErr> {
        let inner = self.inner.read().await;
        let devices = inner
            .devices
            .iter()
            .map(|(id, row)| {
                let history = inner.vueltas.get(id);
                StoredDevice {
                    profile: row.profile.clone(),
                    lote_activo: row.lote_activo,
                    pivot: row.lote_activo.and_then(|lote| row.pivots.get(&lote).cloned()),
                    sectors: row
                        .lote_activo
                        .and_then(|lote| row.sectors.get(&lote).cloned())
                        .unwrap_or_default(),
                    checkpoint: inner.live.get(id).map(|(_, cp)| cp.clone()),
                    ultimo_numero: history
                        .and_then(|v| v.keys().next_back().copied())
                        .unwrap_or(0),
                    history: inner.stats.get(id).cloned().unwrap_or_default(),
                }
            })
            .collect();
        Ok(devices)
    }

    async fn save_device(&self, profile: &DeviceProfile) -> Result<(), DbErr> {
        let mut inner = self.inner.write().await;
        inner
            .devices
            .entry(profile.id)
            .and_modify(|row| row.profile = profile.clone())
            .or_insert_with(|| DeviceRow {
                profile: profile.clone(),
                lote_activo: None,
                pivots: HashMap::new(),
                sectors: HashMap::new(),
            });
        Ok(())
    }

    async fn replace_sectors(
        &self,
        device_id: Uuid,
        pivot: &PivotCenter,
        sectors: &[SectorSpec],
    ) -> Result<(), DbErr> {
        let mut inner = self.inner.write().await;
        let row = inner
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| DbErr::RecordNotFound(format!("device {device_id}")))?;
        row.pivots.insert(pivot.lote_id, pivot.clone());
        row.sectors.insert(pivot.lote_id, sectors.to_vec());
        row.lote_activo = Some(pivot.lote_id);
        Ok(())
    }

    async fn set_sector_active(
        &self,
        device_id: Uuid,
        sector_id: SectorId,
        activo: bool,
    ) -> Result<(), DbErr> {
        let mut inner = self.inner.write().await;
        let sector = inner
            .devices
            .get_mut(&device_id)
            .and_then(|row| {
                row.sectors
                    .values_mut()
                    .flat_map(|specs| specs.iter_mut())
                    .find(|s| s.id == sector_id)
            })
            .ok_or_else(|| DbErr::RecordNotFound(format!("sector {sector_id}")))?;
        sector.activo = activo;
        Ok(())
    }

    async fn commit(&self, commit: &DeviceCommit) -> Result<(), DbErr> {
        let mut inner = self.inner.write().await;
        if !inner.devices.contains_key(&commit.device_id) {
            return Err(DbErr::RecordNotFound(format!("device {}", commit.device_id)));
        }
        if let Some(sample) = &commit.sample {
            inner.samples.insert((sample.device_id, sample.timestamp));
        }
        let history = inner.vueltas.entry(commit.device_id).or_default();
        for vuelta in &commit.vueltas {
            history.insert(vuelta.numero_vuelta, vuelta.clone());
        }
        inner.live.insert(
            commit.device_id,
            (commit.live.clone(), commit.checkpoint.clone()),
        );
        inner.stats.insert(commit.device_id, commit.stats.clone());
        Ok(())
    }

    async fn list_vueltas(
        &self,
        device_id: Uuid,
        limit: Option<u64>,
    ) -> Result<Vec<Vuelta>, DbErr> {
        let inner = self.inner.read().await;
        let limit = limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        Ok(inner
            .vueltas
            .get(&device_id)
            .map(|history| {
                history
                    .values()
                    .rev()
                    .filter(|v| !v.is_open())
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
