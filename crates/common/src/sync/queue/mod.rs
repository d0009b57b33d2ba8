//! Offline mutation queue
//!
//! Mutations captured while offline are appended to a persisted,
//! sequence-numbered log and replayed in order once connectivity returns.

mod core;
mod errors;
mod executor;
mod persistence;
mod types;

pub use self::core::OfflineQueue;
pub use self::errors::{QueueError, QueueResult};
pub use self::executor::MutationExecutor;
pub use self::persistence::QueuePersistence;
pub use self::types::{
    MutationStatus, QueueConfig, QueueLog, QueuedMutation, SyncProgress, SyncReport, SyncStatus,
    DEFAULT_ENTRY_TTL, DEFAULT_QUEUE_KEY, QUEUE_LOG_VERSION,
};
