//! Domain constants
//!
//! Storage keys, thresholds and backend function names shared by every
//! crate in the workspace.

// Storage keys
pub const STORAGE_NAMESPACE: &str = "superapp:";
pub const SESSION_STORAGE_KEY: &str = "superapp:session";
pub const QUEUE_STORAGE_KEY: &str = "superapp:offline_queue";
pub const CART_STORAGE_KEY: &str = "superapp:cart";

// Circuit breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_COOLDOWN_SECS: u64 = 30;

// Session
pub const SESSION_REFRESH_THRESHOLD_SECS: i64 = 300;
pub const MAX_AUTH_RETRIES: u32 = 1;

// Offline queue and cart
pub const QUEUE_ENTRY_TTL_SECS: u64 = 24 * 3600;
pub const QUEUE_MAX_ENTRIES: usize = 1000;
pub const CART_TTL_SECS: u64 = 24 * 3600;
pub const USER_CACHE_TTL_SECS: u64 = 5 * 60;

// Backend
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:54321";
pub const FUNCTIONS_PATH: &str = "functions/v1";
pub const AUTH_PATH: &str = "auth/v1";
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";
pub const API_KEY_HEADER: &str = "apikey";

// Maintenance functions run by the job scheduler
pub const FN_CLEANUP_STALE_DRIVERS: &str = "cleanup-stale-drivers";
pub const FN_CANCEL_EXPIRED_BOOKINGS: &str = "cancel-expired-bookings";
pub const FN_PROCESS_MARKETPLACE_COMMISSION: &str = "process-marketplace-commission";

// Configuration
pub const ENV_PREFIX: &str = "SUPERAPP_";
