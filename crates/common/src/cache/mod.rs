//! Per-user data cache over the key-value storage abstraction
//!
//! Cached values are wrapped in a `{ data, timestamp, user_id }` envelope so
//! reads can reject entries that have outlived their TTL or that belong to
//! a different user than the one currently signed in.
//!
//! ```no_run
//! # async fn demo(cache: superapp_common::cache::UserDataCache) {
//! cache.put("profile", &serde_json::json!({"name": "Ada"}), Some("user-1")).await.ok();
//! let profile: Option<serde_json::Value> = cache.get("profile", Some("user-1")).await;
//! # }
//! ```

mod stats;
mod user_data;

pub use stats::CacheStats;
pub use user_data::{CacheEnvelope, UserDataCache, CACHE_PREFIX, DEFAULT_CACHE_TTL};
