//! Canonical telemetry schema.
//!
//! A request body is either one sample object or an array of them. Each
//! element is decoded on its own so one malformed sample never rejects its
//! neighbours.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::tracking::PositionSample;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TelemetryError {
    #[error("malformed sample: {0}")]
    Schema(String),

    #[error("angle_degrees is not a number: {0}")]
    InvalidAngle(String),

    #[error("{field} must be finite")]
    NonFinite { field: &'static str },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AngleValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryPayload {
    pub device_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub angle_degrees: Option<AngleValue>,
    #[serde(default)]
    pub pressure_psi: Option<f64>,
    #[serde(default)]
    pub altitude_m: Option<f64>,
    #[serde(default)]
    pub speed_kmh: Option<f64>,
}

impl TelemetryPayload {
    /// # Errors
    ///
    /// Rejects angles that are not numeric and non-finite readings.
    pub fn into_sample(self) -> Result<PositionSample, TelemetryError> {
        let angle = match self.angle_degrees {
            None => None,
            Some(AngleValue::Number(a)) => Some(a),
            Some(AngleValue::Text(text)) => Some(
                text.trim()
                    .parse::<f64>()
                    .map_err(|_| TelemetryError::InvalidAngle(text.clone()))?,
            ),
        };
        if angle.is_some_and(|a| !a.is_finite()) {
            return Err(TelemetryError::NonFinite {
                field: "angle_degrees",
            });
        }
        for (field, value) in [
            ("pressure_psi", self.pressure_psi),
            ("altitude_m", self.altitude_m),
            ("speed_kmh", self.speed_kmh),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(TelemetryError::NonFinite { field });
            }
        }

        Ok(PositionSample {
            device_id: self.device_id,
            timestamp: self.timestamp,
            angle,
            pressure_psi: self.pressure_psi,
            altitude_m: self.altitude_m,
            speed_kmh: self.speed_kmh,
        })
    }
}

/// Decode one element of a telemetry body.
///
/// # Errors
///
/// Returns why the element was rejected.
pub fn parse_sample(value: Value) -> Result<PositionSample, TelemetryError> {
    serde_json::from_value::<TelemetryPayload>(value)
        .map_err(|e| TelemetryError::Schema(e.to_string()))?
        .into_sample()
}

/// Split a body into its elements, preserving order.
#[must_use]
pub fn split_body(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        other => vec![other],
    }
}

/// Best-effort device id of a rejected element, for logging and reporting.
#[must_use]
pub fn device_id_hint(value: &Value) -> Option<Uuid> {
    value
        .get("device_id")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}
