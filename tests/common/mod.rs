//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pivot_tracker::common::AppState;
use pivot_tracker::config::{Config, Deployment, TrackingConfig};
use pivot_tracker::ingest::{DeviceRegistry, RetryPolicy};
use pivot_tracker::store::{IrrigationStore, MemoryStore, PivotCenter};
use pivot_tracker::tracking::{
    DeviceKind, DeviceProfile, FlowConfig, PositionSample, SectorSpec,
};
use uuid::Uuid;

/// 2026-01-01T00:00:00Z
const EPOCH: i64 = 1_767_225_600;

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(EPOCH + secs, 0).expect("valid timestamp")
}

pub fn profile(id: Uuid) -> DeviceProfile {
    DeviceProfile {
        id,
        nombre: "Pivote Norte".to_string(),
        tipo: DeviceKind::Pivote,
        radio_cobertura_m: 400.0,
        flujo: FlowConfig {
            caudal_l_min: Some(600.0),
            tiempo_vuelta_completa_min: Some(120.0),
        },
        activo: true,
    }
}

pub fn spec(numero: i32, start: f64, end: f64) -> SectorSpec {
    SectorSpec {
        id: Uuid::new_v4(),
        numero,
        angulo_inicio: start,
        angulo_fin: end,
        radio_interno_m: 0.0,
        radio_externo_m: 400.0,
        coeficiente_riego: 1.0,
        prioridad: 0,
        activo: true,
    }
}

/// `[0,90) [90,180) [180,270) [270,360)`, numbered 0 to 3.
pub fn quadrants() -> Vec<SectorSpec> {
    vec![
        spec(0, 0.0, 90.0),
        spec(1, 90.0, 180.0),
        spec(2, 180.0, 270.0),
        spec(3, 270.0, 360.0),
    ]
}

pub fn pivot(lote_id: Uuid) -> PivotCenter {
    PivotCenter {
        lote_id,
        latitud: -33.45,
        longitud: -70.66,
        radio_cobertura_m: 400.0,
    }
}

pub fn sample(device_id: Uuid, secs: i64, angle: f64) -> PositionSample {
    PositionSample {
        device_id,
        timestamp: ts(secs),
        angle: Some(angle),
        pressure_psi: Some(30.0),
        altitude_m: None,
        speed_kmh: None,
    }
}

/// Angles of the end-to-end example, one minute apart.
pub const EXAMPLE_ANGLES: [f64; 6] = [10.0, 50.0, 95.0, 190.0, 280.0, 9.0];

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: std::time::Duration::from_millis(1),
    }
}

pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        sweep_interval_seconds: 30,
        persist_retry_max: 2,
        persist_retry_delay_ms: 1,
        api_host: "127.0.0.1".to_string(),
        api_port: 0,
        disable_rate_limiting: true,
        rate_limit_telemetry_per_second: 20,
        rate_limit_telemetry_burst: 200,
        rate_limit_query_per_second: 5,
        rate_limit_query_burst: 60,
        cache_ttl_seconds: 300,
        cache_max_bytes: 1_048_576,
        tracking: TrackingConfig::default(),
        deployment: Deployment::Local,
    }
}

pub fn registry(store: Arc<dyn IrrigationStore>) -> DeviceRegistry {
    DeviceRegistry::new(store, TrackingConfig::default(), fast_retry())
}

/// App state over a fresh in-memory store.
pub fn app_state() -> (AppState, Arc<MemoryStore>) {
    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn IrrigationStore> = memory.clone();
    let registry = Arc::new(registry(store.clone()));
    (AppState::new(store, registry, test_config()), memory)
}
