//! Response caching for vuelta history and device stats.
//!
//! Closed vueltas never change, so a history or stats response stays valid
//! until the device closes another one. Each entry records the device's
//! closed-vuelta count read before its data was loaded:
//!
//! | Event | Invalidation |
//! |-------|--------------|
//! | Vuelta closed (sample or idle sweep) | All entries of the device, by prefix |
//! | Count moved since the entry was built | That entry, on read |
//! | Neither | TTL only |
//!
//! # Usage
//!
//! ```text
//! let version = cache::history_version(&state, device_id).await?;
//! let key = cache::cache_key("vueltas", &[&device_id.to_string(), "json"]);
//! if let Some(hit) = cache::get_cached(&state, &key, device_id).await {
//!     return cache::cached_response(&hit, true);
//! }
//! // ... compute response ...
//! cache::store_and_respond(&state, key, bytes, JSON, version).await
//! ```

use axum::{
    http::{HeaderValue, header},
    response::Response,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::common::{AppState, CachedResponse};
use crate::error::{AppError, AppResult};

pub const JSON: &str = "application/json";
pub const CSV: &str = "text/csv; charset=utf-8";

const DEVICE_PREFIXES: [&str; 2] = ["vueltas", "stats"];

/// Build a cache key from a prefix and components.
///
/// Components are joined with `:` separator. Empty components are included
/// to ensure different queries produce different keys.
pub fn cache_key(prefix: &str, components: &[&str]) -> String {
    let mut key = prefix.to_string();
    for c in components {
        key.push(':');
        key.push_str(c);
    }
    key
}

/// Closed vueltas of a device according to its committed snapshot.
///
/// Read it before loading the data an entry is built from: a vuelta closing
/// in between then makes the entry stale on its first read.
pub async fn history_version(state: &AppState, device_id: Uuid) -> Option<u64> {
    state
        .registry
        .snapshot(device_id)
        .await
        .map(|s| s.stats.total_vueltas)
}

/// Cached entry for `key`, unless the device closed a vuelta since it was built.
pub async fn get_cached(state: &AppState, key: &str, device_id: Uuid) -> Option<CachedResponse> {
    let cached = state.response_cache.get(key).await?;

    if history_version(state, device_id).await != Some(cached.total_vueltas) {
        tracing::debug!(cache_key = %key, "cache_stale");
        state.response_cache.invalidate(key).await;
        return None;
    }

    tracing::debug!(cache_key = %key, "cache_hit");
    Some(cached)
}

/// Store a response under `key`, tagged with the history version its data was read at.
pub async fn store_cached(
    state: &AppState,
    key: String,
    data: Vec<u8>,
    content_type: &'static str,
    total_vueltas: u64,
) -> CachedResponse {
    let entry = CachedResponse {
        data: Arc::new(data),
        content_type,
        total_vueltas,
    };
    let size = entry.data.len();
    state.response_cache.insert(key.clone(), entry.clone()).await;

    tracing::debug!(cache_key = %key, size_bytes = size, "cache_stored");
    entry
}

/// Build a response with an X-Cache header indicating hit/miss status.
pub fn cached_response(entry: &CachedResponse, cache_hit: bool) -> AppResult<Response> {
    let cache_header = if cache_hit { "HIT" } else { "MISS" };
    Response::builder()
        .header(header::CONTENT_TYPE, HeaderValue::from_static(entry.content_type))
        .header("X-Cache", HeaderValue::from_static(cache_header))
        .body(axum::body::Body::from((*entry.data).clone()))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Store raw bytes and return them as a cache miss.
pub async fn store_and_respond(
    state: &AppState,
    key: String,
    data: Vec<u8>,
    content_type: &'static str,
    total_vueltas: u64,
) -> AppResult<Response> {
    let entry = store_cached(state, key, data, content_type, total_vueltas).await;
    cached_response(&entry, false)
}

/// Serialize a response as JSON, store it and return it.
pub async fn cache_and_respond<T: Serialize>(
    state: &AppState,
    key: String,
    response: &T,
    total_vueltas: u64,
) -> AppResult<Response> {
    let json_bytes = serde_json::to_vec(response).map_err(|e| AppError::Internal(e.to_string()))?;
    store_and_respond(state, key, json_bytes, JSON, total_vueltas).await
}

/// Invalidate all cache entries matching a prefix.
pub fn invalidate_prefix(state: &AppState, prefix: &str) {
    let prefix_owned = prefix.to_string();
    if let Err(e) = state
        .response_cache
        .invalidate_entries_if(move |key, _| key.starts_with(&prefix_owned))
    {
        tracing::warn!(prefix = %prefix, error = %e, "cache_prefix_invalidation_failed");
        return;
    }
    tracing::debug!(prefix = %prefix, "cache_prefix_invalidated");
}

/// Drop every cached history and stats response of one device.
pub async fn invalidate_device(state: &AppState, device_id: Uuid) {
    let id = device_id.to_string();
    for prefix in DEVICE_PREFIXES {
        invalidate_prefix(state, &cache_key(prefix, &[&id]));
    }
    state.response_cache.run_pending_tasks().await;
}
