mod handlers;
mod types;

pub use handlers::post_telemetry;
pub use types::{SampleResult, SampleStatus, TelemetryResponse, TelemetrySample};

// Re-export utoipa path structs for OpenAPI documentation
pub use handlers::__path_post_telemetry;
