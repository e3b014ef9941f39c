use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::ingest::DeviceRegistry;
use crate::store::IrrigationStore;

/// Cached response with the history version it was built from.
#[derive(Clone)]
pub struct CachedResponse {
    pub data: Arc<Vec<u8>>,
    pub content_type: &'static str,
    /// Closed vueltas of the device when the entry's data was read.
    pub total_vueltas: u64,
}

/// Cache for history and stats responses. Key is request params, value is
/// serialized response + metadata. Weighted by byte size to enforce memory limit.
pub type ResponseCache = Cache<String, CachedResponse>;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IrrigationStore>,
    pub registry: Arc<DeviceRegistry>,
    pub config: Arc<Config>,
    pub response_cache: ResponseCache,
}

impl AppState {
    pub fn new(store: Arc<dyn IrrigationStore>, registry: Arc<DeviceRegistry>, config: Config) -> Self {
        // Cache weighted by byte size, not entry count
        let cache: ResponseCache = Cache::builder()
            .weigher(|_key: &String, value: &CachedResponse| -> u32 {
                value.data.len().try_into().unwrap_or(u32::MAX)
            })
            .max_capacity(config.cache_max_bytes)
            .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
            .support_invalidation_closures()
            .build();

        Self {
            store,
            registry,
            config: Arc::new(config),
            response_cache: cache,
        }
    }
}
