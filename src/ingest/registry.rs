//! Per-device single writer over the tracking engine.
//!
//! Each device owns a writer lock around its [`DeviceTracker`] and a separate
//! read lock around its last committed view. A step clones the tracker,
//! applies the input, persists the result and only then swaps the clone in,
//! so a failed write leaves both the tracker and readers untouched.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::DbErr;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::worker::{RetryPolicy, persist_commit, storage_error, with_retry};
use crate::config::TrackingConfig;
use crate::error::{AppError, AppResult};
use crate::store::{DeviceCommit, IrrigationStore, PivotCenter, StoredDevice};
use crate::tracking::{
    ApplyOutcome, Changes, DeviceProfile, DeviceSnapshot, DeviceTracker, DropReason,
    PositionSample, Sector, SectorId, SectorSet, SectorSpec, StatsAggregator, Vuelta,
};

/// Read-side state of one device, replaced wholesale after each commit.
#[derive(Debug, Clone)]
pub struct CommittedView {
    pub snapshot: DeviceSnapshot,
    pub sectors: SectorSet,
    pub stats: StatsAggregator,
    pub pivot: Option<PivotCenter>,
}

impl CommittedView {
    fn refresh(&mut self, tracker: &DeviceTracker, cfg: &TrackingConfig) {
        self.snapshot = tracker.snapshot(cfg);
        self.sectors = tracker.sectors().clone();
        self.stats = tracker.stats().clone();
    }
}

struct DeviceSlot {
    writer: Mutex<DeviceTracker>,
    committed: RwLock<CommittedView>,
}

impl DeviceSlot {
    fn new(tracker: DeviceTracker, pivot: Option<PivotCenter>, cfg: &TrackingConfig) -> Self {
        let view = CommittedView {
            snapshot: tracker.snapshot(cfg),
            sectors: tracker.sectors().clone(),
            stats: tracker.stats().clone(),
            pivot,
        };
        Self {
            writer: Mutex::new(tracker),
            committed: RwLock::new(view),
        }
    }

    async fn publish(&self, tracker: &DeviceTracker, cfg: &TrackingConfig) {
        self.committed.write().await.refresh(tracker, cfg);
    }

    /// Publish together with a new pivot center, under the same write guard.
    async fn publish_with_pivot(
        &self,
        tracker: &DeviceTracker,
        cfg: &TrackingConfig,
        pivot: PivotCenter,
    ) {
        let mut view = self.committed.write().await;
        view.refresh(tracker, cfg);
        view.pivot = Some(pivot);
    }
}

/// Result of feeding one sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Ingested {
    Applied {
        changes: Changes,
        snapshot: DeviceSnapshot,
    },
    Dropped(DropReason),
}

/// What one idle sweep changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub stopped: Vec<Uuid>,
    pub closed: Vec<Vuelta>,
    pub failed: Vec<Uuid>,
}

pub struct DeviceRegistry {
    store: Arc<dyn IrrigationStore>,
    tracking: TrackingConfig,
    retry: RetryPolicy,
    devices: RwLock<HashMap<Uuid, Arc<DeviceSlot>>>,
}

impl DeviceRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn IrrigationStore>, tracking: TrackingConfig, retry: RetryPolicy) -> Self {
        Self {
            store,
            tracking,
            retry,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Build the registry from everything the store holds.
    ///
    /// # Errors
    ///
    /// Fails if the store cannot be read.
    pub async fn hydrate(
        store: Arc<dyn IrrigationStore>,
        tracking: TrackingConfig,
        retry: RetryPolicy,
    ) -> Result<Self, DbErr> {
        let stored = with_retry("Device load", retry, || store.load_devices()).await?;
        let registry = Self::new(store, tracking, retry);
        {
            let mut devices = registry.devices.write().await;
            for device in stored {
                let id = device.profile.id;
                let (tracker, pivot) = registry.rebuild(device);
                devices.insert(id, Arc::new(DeviceSlot::new(tracker, pivot, &registry.tracking)));
            }
            tracing::info!(devices = devices.len(), "Device trackers hydrated");
        }
        Ok(registry)
    }

    fn rebuild(&self, device: StoredDevice) -> (DeviceTracker, Option<PivotCenter>) {
        let id = device.profile.id;
        let sectors = SectorSet::validate(device.sectors).unwrap_or_else(|e| {
            tracing::warn!(device_id = %id, error = %e, "Stored sectors invalid, tracking without sectors");
            SectorSet::default()
        });
        let tracker = match device.checkpoint {
            Some(checkpoint) => {
                tracing::debug!(device_id = %id, "Resuming from checkpoint");
                DeviceTracker::restore(device.profile, sectors, checkpoint)
            }
            None => DeviceTracker::with_history(
                device.profile,
                sectors,
                device.ultimo_numero,
                device.history,
            ),
        };
        (tracker, device.pivot)
    }

    #[must_use]
    pub fn tracking(&self) -> &TrackingConfig {
        &self.tracking
    }

    async fn slot(&self, device_id: Uuid) -> AppResult<Arc<DeviceSlot>> {
        self.devices
            .read()
            .await
            .get(&device_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Device '{device_id}' not found")))
    }

    /// Register a device or update its profile. Tracking state is kept.
    ///
    /// # Errors
    ///
    /// Rejects profiles without a usable flow configuration or radius.
    pub async fn register_device(&self, profile: DeviceProfile) -> AppResult<DeviceSnapshot> {
        validate_profile(&profile)?;
        with_retry("Device save", self.retry, || self.store.save_device(&profile))
            .await
            .map_err(storage_error)?;

        let existing = self.devices.read().await.get(&profile.id).cloned();
        if let Some(slot) = existing {
            let mut tracker = slot.writer.lock().await;
            tracker.set_profile(profile);
            slot.publish(&tracker, &self.tracking).await;
            return Ok(tracker.snapshot(&self.tracking));
        }

        let mut devices = self.devices.write().await;
        let slot = devices.entry(profile.id).or_insert_with(|| {
            tracing::info!(device_id = %profile.id, nombre = %profile.nombre, "Device registered");
            let tracker = DeviceTracker::new(profile.clone(), SectorSet::default());
            Arc::new(DeviceSlot::new(tracker, None, &self.tracking))
        });
        Ok(slot.committed.read().await.snapshot.clone())
    }

    /// Validate and apply the sector partition of a lot, making it the
    /// device's active lot. Nothing changes unless the whole set is valid.
    ///
    /// # Errors
    ///
    /// Returns every conflict and invalid entry on rejection.
    pub async fn configure_sectors(
        &self,
        device_id: Uuid,
        pivot: PivotCenter,
        specs: Vec<SectorSpec>,
    ) -> AppResult<Vec<Sector>> {
        let slot = self.slot(device_id).await?;
        let sectors = SectorSet::validate(specs)?;
        let specs: Vec<SectorSpec> = sectors.sectors().iter().map(Sector::to_spec).collect();

        let mut tracker = slot.writer.lock().await;
        with_retry("Sector configuration", self.retry, || {
            self.store.replace_sectors(device_id, &pivot, &specs)
        })
        .await
        .map_err(storage_error)?;

        tracing::info!(
            device_id = %device_id,
            lote_id = %pivot.lote_id,
            sectors = sectors.len(),
            "Sector configuration applied"
        );
        tracker.set_sectors(sectors);
        slot.publish_with_pivot(&tracker, &self.tracking, pivot).await;
        Ok(tracker.sectors().sectors().to_vec())
    }

    /// Toggle one sector, re-validating overlap when it is activated.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown sector, a validation error when activation
    /// would overlap another active sector.
    pub async fn set_sector_active(
        &self,
        device_id: Uuid,
        sector_id: SectorId,
        activo: bool,
    ) -> AppResult<Sector> {
        let slot = self.slot(device_id).await?;
        let mut tracker = slot.writer.lock().await;
        let updated = tracker
            .sectors()
            .with_active(sector_id, activo)
            .ok_or_else(|| AppError::NotFound(format!("Sector '{sector_id}' not found")))??;

        with_retry("Sector toggle", self.retry, || {
            self.store.set_sector_active(device_id, sector_id, activo)
        })
        .await
        .map_err(storage_error)?;

        let sector = updated
            .get(sector_id)
            .cloned()
            .ok_or_else(|| AppError::Internal(format!("sector {sector_id} lost on toggle")))?;
        tracing::info!(device_id = %device_id, sector_id = %sector_id, activo, "Sector toggled");
        tracker.set_sectors(updated);
        slot.publish(&tracker, &self.tracking).await;
        Ok(sector)
    }

    /// Feed one telemetry sample.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unregistered device, `ServiceUnavailable` when the
    /// result could not be persisted.
    pub async fn ingest(&self, sample: &PositionSample) -> AppResult<Ingested> {
        let slot = self.slot(sample.device_id).await?;
        let mut tracker = slot.writer.lock().await;

        let mut next = tracker.clone();
        let changes = match next.apply(sample, &self.tracking) {
            ApplyOutcome::Applied(changes) => changes,
            ApplyOutcome::Dropped(reason) => {
                tracing::warn!(
                    device_id = %sample.device_id,
                    timestamp = %sample.timestamp,
                    reason = reason.as_str(),
                    "Sample dropped"
                );
                return Ok(Ingested::Dropped(reason));
            }
        };

        let commit = DeviceCommit::capture(&next, Some(sample), &changes, &self.tracking);
        persist_commit(self.store.as_ref(), &commit, self.retry)
            .await
            .map_err(storage_error)?;

        *tracker = next;
        slot.publish(&tracker, &self.tracking).await;
        Ok(Ingested::Applied {
            changes,
            snapshot: tracker.snapshot(&self.tracking),
        })
    }

    /// Explicit stop signal for one device.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unregistered device, `ServiceUnavailable` when the
    /// result could not be persisted.
    pub async fn stop(&self, device_id: Uuid, at: DateTime<Utc>) -> AppResult<DeviceSnapshot> {
        let slot = self.slot(device_id).await?;
        let mut tracker = slot.writer.lock().await;

        let mut next = tracker.clone();
        let changes = next.stop(at);
        if !changes.is_empty() {
            let commit = DeviceCommit::capture(&next, None, &changes, &self.tracking);
            persist_commit(self.store.as_ref(), &commit, self.retry)
                .await
                .map_err(storage_error)?;
            *tracker = next;
            slot.publish(&tracker, &self.tracking).await;
        }
        Ok(tracker.snapshot(&self.tracking))
    }

    /// Evaluate idle timeouts for every device at `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let slots: Vec<(Uuid, Arc<DeviceSlot>)> = self
            .devices
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, slot.clone()))
            .collect();

        let mut report = SweepReport::default();
        for (device_id, slot) in slots {
            let mut tracker = slot.writer.lock().await;
            let mut next = tracker.clone();
            let changes = next.expire(now, &self.tracking);
            if changes.is_empty() {
                continue;
            }

            let commit = DeviceCommit::capture(&next, None, &changes, &self.tracking);
            if let Err(e) = persist_commit(self.store.as_ref(), &commit, self.retry).await {
                tracing::error!(device_id = %device_id, error = %e, "Idle sweep commit failed");
                report.failed.push(device_id);
                continue;
            }

            *tracker = next;
            slot.publish(&tracker, &self.tracking).await;
            if !changes.transitions.is_empty() {
                report.stopped.push(device_id);
            }
            report.closed.extend(changes.closed);
        }
        report
    }

    pub async fn device_count(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Last committed view of one device.
    pub async fn view(&self, device_id: Uuid) -> Option<CommittedView> {
        let slot = self.devices.read().await.get(&device_id).cloned()?;
        let view = slot.committed.read().await.clone();
        Some(view)
    }

    pub async fn snapshot(&self, device_id: Uuid) -> Option<DeviceSnapshot> {
        self.view(device_id).await.map(|v| v.snapshot)
    }

    /// Committed snapshots of all devices, ordered by name.
    pub async fn snapshots(&self) -> Vec<DeviceSnapshot> {
        let slots: Vec<Arc<DeviceSlot>> = self.devices.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.committed.read().await.snapshot.clone());
        }
        out.sort_by(|a, b| {
            a.profile
                .nombre
                .cmp(&b.profile.nombre)
                .then(a.profile.id.cmp(&b.profile.id))
        });
        out
    }

    /// Write every device's checkpoint, used on shutdown.
    pub async fn flush(&self) -> usize {
        let slots: Vec<Arc<DeviceSlot>> = self.devices.read().await.values().cloned().collect();
        let mut flushed = 0;
        for slot in slots {
            let tracker = slot.writer.lock().await;
            let commit =
                DeviceCommit::capture(&tracker, None, &Changes::default(), &self.tracking);
            match persist_commit(self.store.as_ref(), &commit, self.retry).await {
                Ok(()) => flushed += 1,
                Err(e) => tracing::error!(
                    device_id = %tracker.profile().id,
                    error = %e,
                    "Checkpoint flush failed"
                ),
            }
        }
        tracing::info!(flushed, "Device checkpoints flushed");
        flushed
    }
}

fn validate_profile(profile: &DeviceProfile) -> AppResult<()> {
    if profile.nombre.trim().is_empty() {
        return Err(AppError::BadRequest("nombre must not be empty".to_string()));
    }
    if !(profile.radio_cobertura_m.is_finite() && profile.radio_cobertura_m > 0.0) {
        return Err(AppError::BadRequest(
            "radio_cobertura_m must be positive".to_string(),
        ));
    }
    if !profile.flujo.is_configured() {
        return Err(AppError::BadRequest(
            "either caudal_l_min or tiempo_vuelta_completa_min is required".to_string(),
        ));
    }
    Ok(())
}
