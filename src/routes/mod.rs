pub mod devices;
pub mod health;
pub mod sectors;
pub mod telemetry;
pub mod vueltas;

use axum::{
    Router,
    routing::{get, patch, post, put},
};
use std::sync::Arc;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::common::AppState;
use crate::services::rate_limit::GatewayKeyExtractor;

const BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::healthz,
        telemetry::post_telemetry,
        devices::put_device,
        devices::list_devices,
        devices::get_live,
        devices::get_open_vuelta,
        devices::stop_device,
        sectors::put_sectors,
        sectors::list_sectors,
        sectors::patch_sector,
        vueltas::list_vueltas,
        vueltas::get_stats,
    ),
    components(
        schemas(
            health::HealthResponse,
            telemetry::TelemetrySample,
            telemetry::TelemetryResponse,
            telemetry::SampleResult,
            telemetry::SampleStatus,
            devices::DeviceRequest,
            devices::DeviceResponse,
            devices::LiveStateResponse,
            devices::OpenVueltaResponse,
            sectors::SectorConfigRequest,
            sectors::PivotCenterRequest,
            sectors::SectorRequest,
            sectors::SectorToggleRequest,
            sectors::SectorResponse,
            sectors::SectorsResponse,
            sectors::PivotCenterResponse,
            vueltas::VueltaResponse,
            vueltas::VueltasResponse,
            vueltas::StatsResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "telemetry", description = "Position telemetry input"),
        (name = "devices", description = "Device registration and live state"),
        (name = "sectors", description = "Sector configuration per lot"),
        (name = "vueltas", description = "Revolution history and totals"),
    ),
    info(
        title = "Pivot Tracker API",
        description = "Sector and revolution tracking for center-pivot irrigation",
        version = "0.1.0"
    )
)]
struct ApiDoc;

/// Wrap `routes` in a per-key rate limiter. Invalid settings leave the routes
/// unlimited and are reported at startup.
fn rate_limited(routes: Router<AppState>, name: &str, per_second: u64, burst: u32) -> Router<AppState> {
    let limiter = GovernorConfigBuilder::default()
        .key_extractor(GatewayKeyExtractor)
        .per_second(per_second)
        .burst_size(burst)
        .finish();

    match limiter {
        Some(config) => routes.layer(GovernorLayer {
            config: Arc::new(config),
        }),
        None => {
            tracing::error!(limiter = name, per_second, burst, "Invalid rate limit settings, limiter disabled");
            routes
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    if config.disable_rate_limiting {
        tracing::warn!("Rate limiting DISABLED");
    } else {
        tracing::info!(
            telemetry_rate = %format!("{}/s burst {}", config.rate_limit_telemetry_per_second, config.rate_limit_telemetry_burst),
            query_rate = %format!("{}/s burst {}", config.rate_limit_query_per_second, config.rate_limit_query_burst),
            "Rate limiting configured"
        );
    }

    // Base routes without rate limiting
    let telemetry_routes_base = Router::new().route("/telemetry", post(telemetry::post_telemetry));

    let query_routes_base = Router::new()
        .route("/devices", get(devices::list_devices))
        .route("/devices/{device_id}", put(devices::put_device))
        .route("/devices/{device_id}/live", get(devices::get_live))
        .route("/devices/{device_id}/vuelta", get(devices::get_open_vuelta))
        .route("/devices/{device_id}/stop", post(devices::stop_device))
        .route("/devices/{device_id}/sectors", get(sectors::list_sectors))
        .route(
            "/devices/{device_id}/sectors/{sector_id}",
            patch(sectors::patch_sector),
        )
        .route(
            "/devices/{device_id}/lots/{lot_id}/sectors",
            put(sectors::put_sectors),
        )
        .route("/devices/{device_id}/vueltas", get(vueltas::list_vueltas))
        .route("/devices/{device_id}/stats", get(vueltas::get_stats));

    // Combine API routes, conditionally applying rate limiting
    let api_routes = if config.disable_rate_limiting {
        Router::new()
            .merge(telemetry_routes_base)
            .merge(query_routes_base)
    } else {
        Router::new()
            .merge(rate_limited(
                telemetry_routes_base,
                "telemetry",
                config.rate_limit_telemetry_per_second,
                config.rate_limit_telemetry_burst,
            ))
            .merge(rate_limited(
                query_routes_base,
                "query",
                config.rate_limit_query_per_second,
                config.rate_limit_query_burst,
            ))
    }
    .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES));

    // Health check routes (NO rate limiting)
    let health_routes = Router::new().route("/healthz", get(health::healthz));

    // OpenAPI documentation
    let docs_routes = Router::new().merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(docs_routes)
        .layer(CompressionLayer::new())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
