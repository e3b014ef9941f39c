//! Telemetry ingestion: validation, per-device serialization and persistence.

pub mod registry;
pub mod scheduler;
pub mod telemetry;
pub mod worker;

pub use registry::{CommittedView, DeviceRegistry, Ingested, SweepReport};
pub use telemetry::{TelemetryError, TelemetryPayload};
pub use worker::RetryPolicy;
