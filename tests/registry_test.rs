//! Device registry over the in-memory store: serialization, persistence,
//! retries and restart.
//!
//! Run with: cargo test --test registry_test

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use common::{EXAMPLE_ANGLES, fast_retry, pivot, profile, quadrants, registry, sample, spec, ts};
use pivot_tracker::config::TrackingConfig;
use pivot_tracker::error::AppError;
use pivot_tracker::ingest::{DeviceRegistry, Ingested, SweepReport};
use pivot_tracker::store::{DeviceCommit, IrrigationStore, MemoryStore, PivotCenter, StoredDevice};
use pivot_tracker::tracking::{
    DeviceProfile, DropReason, OperatingState, SectorId, SectorSpec, Vuelta,
};
use sea_orm::{DbErr, RuntimeErr};
use uuid::Uuid;

/// Memory store whose commits fail with a connection error while
/// `failures` is positive.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failures: AtomicU32,
    commits: AtomicU32,
}

impl FlakyStore {
    fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl IrrigationStore for FlakyStore {
    async fn load_devices(&self) -> Result<Vec<StoredDevice>, DbErr> {
        self.inner.load_devices().await
    }

    async fn save_device(&self, profile: &DeviceProfile) -> Result<(), DbErr> {
        self.inner.save_device(profile).await
    }

    async fn replace_sectors(
        &self,
        device_id: Uuid,
        pivot: &PivotCenter,
        sectors: &[SectorSpec],
    ) -> Result<(), DbErr> {
        self.inner.replace_sectors(device_id, pivot, sectors).await
    }

    async fn set_sector_active(
        &self,
        device_id: Uuid,
        sector_id: SectorId,
        activo: bool,
    ) -> Result<(), DbErr> {
        self.inner.set_sector_active(device_id, sector_id, activo).await
    }

    async fn commit(&self, commit: &DeviceCommit) -> Result<(), DbErr> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(DbErr::Conn(RuntimeErr::Internal(
                "connection reset by peer".to_string(),
            )));
        }
        self.inner.commit(commit).await
    }

    async fn list_vueltas(&self, device_id: Uuid, limit: Option<u64>) -> Result<Vec<Vuelta>, DbErr> {
        self.inner.list_vueltas(device_id, limit).await
    }
}

/// Registered device with the four quadrants configured.
async fn configured(registry: &DeviceRegistry) -> Uuid {
    let id = Uuid::new_v4();
    registry.register_device(profile(id)).await.unwrap();
    registry
        .configure_sectors(id, pivot(Uuid::new_v4()), quadrants())
        .await
        .unwrap();
    id
}

async fn ingest_all(registry: &DeviceRegistry, id: Uuid, angles: &[f64]) -> Vec<Ingested> {
    let mut out = Vec::new();
    for (i, angle) in angles.iter().enumerate() {
        out.push(registry.ingest(&sample(id, i as i64 * 60, *angle)).await.unwrap());
    }
    out
}

#[tokio::test]
async fn example_revolution_is_persisted() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(store.clone());
    let id = configured(&registry).await;

    let results = ingest_all(&registry, id, &EXAMPLE_ANGLES).await;
    let Ingested::Applied { changes, snapshot } = results.last().unwrap() else {
        panic!("last sample dropped");
    };
    assert_eq!(changes.closed.len(), 1);
    assert_eq!(snapshot.stats.total_vueltas, 1);
    assert_eq!(snapshot.vuelta_abierta.as_ref().unwrap().numero_vuelta, 2);

    // History holds closed vueltas only
    let history = store.list_vueltas(id, None).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].completada);
    assert_eq!(history[0].sectores_pasados, 4);

    assert_eq!(store.sample_count(id).await, EXAMPLE_ANGLES.len());
    assert_eq!(store.stats(id).await.unwrap().total_vueltas, 1);
    let live = store.live_state(id).await.unwrap();
    assert_eq!(live.sector_numero, Some(0));
    assert_eq!(live.estado, OperatingState::Regando);
}

#[tokio::test]
async fn replayed_sample_changes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(store.clone());
    let id = configured(&registry).await;
    ingest_all(&registry, id, &[10.0, 50.0, 95.0]).await;

    let before = registry.snapshot(id).await.unwrap();
    let replay = registry.ingest(&sample(id, 120, 95.0)).await.unwrap();
    assert_eq!(replay, Ingested::Dropped(DropReason::Duplicate));
    assert_eq!(registry.snapshot(id).await.unwrap(), before);
    assert_eq!(store.sample_count(id).await, 3);
}

#[tokio::test]
async fn unknown_device_is_not_found() {
    let registry = registry(Arc::new(MemoryStore::new()));
    let err = registry
        .ingest(&sample(Uuid::new_v4(), 0, 10.0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn invalid_profiles_are_rejected() {
    let registry = registry(Arc::new(MemoryStore::new()));

    let mut no_flow = profile(Uuid::new_v4());
    no_flow.flujo.caudal_l_min = None;
    no_flow.flujo.tiempo_vuelta_completa_min = None;
    assert!(matches!(
        registry.register_device(no_flow).await,
        Err(AppError::BadRequest(_))
    ));

    let mut no_radius = profile(Uuid::new_v4());
    no_radius.radio_cobertura_m = 0.0;
    assert!(matches!(
        registry.register_device(no_radius).await,
        Err(AppError::BadRequest(_))
    ));
    assert_eq!(registry.device_count().await, 0);
}

#[tokio::test]
async fn profile_update_keeps_tracking_state() {
    let registry = registry(Arc::new(MemoryStore::new()));
    let id = configured(&registry).await;
    ingest_all(&registry, id, &[10.0, 50.0]).await;

    let mut renamed = profile(id);
    renamed.nombre = "Pivote Sur".to_string();
    let snapshot = registry.register_device(renamed).await.unwrap();

    assert_eq!(snapshot.profile.nombre, "Pivote Sur");
    assert_eq!(snapshot.live.estado, OperatingState::Regando);
    assert!(snapshot.vuelta_abierta.is_some());
    assert_eq!(registry.device_count().await, 1);
}

#[tokio::test]
async fn overlapping_configuration_leaves_sectors_untouched() {
    let registry = registry(Arc::new(MemoryStore::new()));
    let id = configured(&registry).await;

    let err = registry
        .configure_sectors(
            id,
            pivot(Uuid::new_v4()),
            vec![spec(1, 0.0, 100.0), spec(2, 90.0, 180.0)],
        )
        .await
        .unwrap_err();
    let AppError::Validation(validation) = err else {
        panic!("expected a validation error");
    };
    assert_eq!(validation.conflicts.len(), 1);

    let view = registry.view(id).await.unwrap();
    assert_eq!(view.sectors.len(), 4);
    assert_eq!(view.snapshot.sectores, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn readers_see_sectors_and_pivot_of_the_same_lot() {
    let registry = Arc::new(registry(Arc::new(MemoryStore::new())));
    let id = Uuid::new_v4();
    registry.register_device(profile(id)).await.unwrap();

    // Lot A has four sectors, lot B a single one
    let lot_a = Uuid::new_v4();
    let lot_b = Uuid::new_v4();
    registry
        .configure_sectors(id, pivot(lot_a), quadrants())
        .await
        .unwrap();

    let reader = {
        let registry = registry.clone();
        tokio::spawn(async move {
            for _ in 0..2_000 {
                let view = registry.view(id).await.unwrap();
                let lote = view.pivot.as_ref().map(|p| p.lote_id);
                let expected = if view.sectors.len() == 4 { lot_a } else { lot_b };
                assert_eq!(lote, Some(expected));
                tokio::task::yield_now().await;
            }
        })
    };

    for round in 0..200 {
        let (lot, specs) = if round % 2 == 0 {
            (lot_b, vec![spec(1, 0.0, 180.0)])
        } else {
            (lot_a, quadrants())
        };
        registry.configure_sectors(id, pivot(lot), specs).await.unwrap();
        tokio::task::yield_now().await;
    }
    reader.await.unwrap();

    let view = registry.view(id).await.unwrap();
    assert_eq!(view.pivot.unwrap().lote_id, lot_a);
    assert_eq!(view.sectors.len(), 4);
}

#[tokio::test]
async fn sector_toggle_is_validated_and_persisted() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(store.clone());
    let id = Uuid::new_v4();
    registry.register_device(profile(id)).await.unwrap();

    let mut overlay = spec(9, 45.0, 135.0);
    overlay.activo = false;
    let mut specs = quadrants();
    specs.push(overlay.clone());
    let lote = Uuid::new_v4();
    registry.configure_sectors(id, pivot(lote), specs).await.unwrap();

    let err = registry.set_sector_active(id, overlay.id, true).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let first = registry.view(id).await.unwrap().sectors.sectors()[0].id;
    let toggled = registry.set_sector_active(id, first, false).await.unwrap();
    assert!(!toggled.activo);
    assert!(registry.view(id).await.unwrap().sectors.resolve(10.0).is_none());

    let missing = registry.set_sector_active(id, Uuid::new_v4(), true).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));

    // The store reflects the toggle after a restart
    let restarted = DeviceRegistry::hydrate(store, TrackingConfig::default(), fast_retry())
        .await
        .unwrap();
    let view = restarted.view(id).await.unwrap();
    assert!(view.sectors.resolve(10.0).is_none());
    assert_eq!(view.pivot.unwrap().lote_id, lote);
}

#[tokio::test]
async fn transient_failures_are_retried() {
    let store = Arc::new(FlakyStore::default());
    let registry = registry(store.clone());
    let id = configured(&registry).await;

    store.fail_next(2);
    let result = registry.ingest(&sample(id, 0, 10.0)).await.unwrap();
    assert!(matches!(result, Ingested::Applied { .. }));
    assert_eq!(store.commits.load(Ordering::SeqCst), 3);
    assert_eq!(store.inner.sample_count(id).await, 1);
}

#[tokio::test]
async fn exhausted_retries_leave_state_unchanged() {
    let store = Arc::new(FlakyStore::default());
    let registry = registry(store.clone());
    let id = configured(&registry).await;
    ingest_all(&registry, id, &[10.0, 50.0]).await;
    let before = registry.snapshot(id).await.unwrap();

    store.fail_next(u32::MAX);
    let err = registry.ingest(&sample(id, 120, 95.0)).await.unwrap_err();
    assert!(matches!(err, AppError::ServiceUnavailable(_)));
    assert_eq!(registry.snapshot(id).await.unwrap(), before);
    assert_eq!(store.inner.sample_count(id).await, 2);

    // Once storage is back the same sample applies, it is not a duplicate
    store.fail_next(0);
    let retried = registry.ingest(&sample(id, 120, 95.0)).await.unwrap();
    let Ingested::Applied { snapshot, .. } = retried else {
        panic!("sample dropped after recovery");
    };
    assert_eq!(snapshot.live.sector_numero, Some(1));
    assert_eq!(store.inner.sample_count(id).await, 3);
}

#[tokio::test]
async fn stop_signal_is_persisted() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(store.clone());
    let id = configured(&registry).await;
    ingest_all(&registry, id, &[10.0, 50.0]).await;

    let snapshot = registry.stop(id, ts(90)).await.unwrap();
    assert_eq!(snapshot.live.estado, OperatingState::Detenido);
    assert!(snapshot.vuelta_abierta.is_some());
    assert_eq!(
        store.live_state(id).await.unwrap().estado,
        OperatingState::Detenido
    );
}

#[tokio::test]
async fn sweep_closes_idle_vueltas() {
    let store = Arc::new(MemoryStore::new());
    let registry = registry(store.clone());
    let busy = configured(&registry).await;
    let idle = configured(&registry).await;
    ingest_all(&registry, busy, &[10.0, 50.0, 95.0]).await;

    let report = registry.sweep(ts(120 + 901)).await;
    assert_eq!(report.stopped, vec![busy]);
    assert_eq!(report.closed.len(), 1);
    assert!(report.failed.is_empty());
    assert!(!report.closed[0].completada);

    assert_eq!(store.list_vueltas(busy, None).await.unwrap().len(), 1);
    assert!(store.list_vueltas(idle, None).await.unwrap().is_empty());
    let snapshot = registry.snapshot(busy).await.unwrap();
    assert_eq!(snapshot.live.estado, OperatingState::Detenido);
    assert_eq!(snapshot.stats.total_vueltas, 1);

    // Nothing left to expire
    assert_eq!(registry.sweep(ts(120 + 2000)).await, SweepReport::default());
}

#[tokio::test]
async fn sweep_reports_devices_it_could_not_persist() {
    let store = Arc::new(FlakyStore::default());
    let registry = registry(store.clone());
    let id = configured(&registry).await;
    ingest_all(&registry, id, &[10.0, 50.0]).await;

    store.fail_next(u32::MAX);
    let report = registry.sweep(ts(60 + 901)).await;
    assert_eq!(report.failed, vec![id]);
    assert!(report.closed.is_empty());
    assert_eq!(
        registry.snapshot(id).await.unwrap().live.estado,
        OperatingState::Regando
    );
}

#[tokio::test]
async fn restart_resumes_from_checkpoint() {
    let store = Arc::new(MemoryStore::new());
    let first = registry(store.clone());
    let id = configured(&first).await;
    ingest_all(&first, id, &EXAMPLE_ANGLES[..4]).await;
    assert_eq!(first.flush().await, 1);

    let second = DeviceRegistry::hydrate(store.clone(), TrackingConfig::default(), fast_retry())
        .await
        .unwrap();
    assert_eq!(second.snapshot(id).await, first.snapshot(id).await);

    // Continue the revolution on the restarted registry
    for (i, angle) in EXAMPLE_ANGLES.iter().enumerate().skip(4) {
        second.ingest(&sample(id, i as i64 * 60, *angle)).await.unwrap();
    }
    let history = store.list_vueltas(id, Some(10)).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(history[0].completada);
}

#[tokio::test]
async fn devices_are_listed_by_name() {
    let registry = registry(Arc::new(MemoryStore::new()));
    for nombre in ["Pivote C", "Pivote A", "Pivote B"] {
        let mut p = profile(Uuid::new_v4());
        p.nombre = nombre.to_string();
        registry.register_device(p).await.unwrap();
    }
    let names: Vec<String> = registry
        .snapshots()
        .await
        .into_iter()
        .map(|s| s.profile.nombre)
        .collect();
    assert_eq!(names, ["Pivote A", "Pivote B", "Pivote C"]);
}
