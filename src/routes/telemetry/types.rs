use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Telemetry sample as sent by gateways. Unknown fields reject the sample.
#[derive(Debug, Serialize, ToSchema)]
pub struct TelemetrySample {
    pub device_id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Degrees; a number or a numeric string
    pub angle_degrees: Option<f64>,
    pub pressure_psi: Option<f64>,
    pub altitude_m: Option<f64>,
    pub speed_kmh: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    /// Applied to the device's tracker and persisted
    Applied,
    /// Well-formed but ignored (duplicate, out of order, no angle, inactive device)
    Dropped,
    /// Failed schema validation or referenced an unknown device
    Rejected,
}

/// Outcome for one element of the request body, in request order
#[derive(Debug, Serialize, ToSchema)]
pub struct SampleResult {
    pub index: usize,
    pub device_id: Option<Uuid>,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: SampleStatus,
    /// Why the sample was dropped or rejected
    pub reason: Option<String>,
    /// Operating state after the sample
    pub estado: Option<String>,
    pub sector_actual: Option<Uuid>,
    /// Number of the vuelta opened by this sample
    pub vuelta_abierta: Option<i32>,
    /// Numbers of the vueltas closed by this sample
    pub vueltas_cerradas: Vec<i32>,
}

impl SampleResult {
    pub fn rejected(index: usize, device_id: Option<Uuid>, reason: String) -> Self {
        Self {
            index,
            device_id,
            timestamp: None,
            status: SampleStatus::Rejected,
            reason: Some(reason),
            estado: None,
            sector_actual: None,
            vuelta_abierta: None,
            vueltas_cerradas: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TelemetryResponse {
    pub applied: usize,
    pub dropped: usize,
    pub rejected: usize,
    pub results: Vec<SampleResult>,
}
