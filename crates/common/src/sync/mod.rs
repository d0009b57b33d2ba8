//! Offline synchronization
//!
//! - [`queue`]: durable FIFO log of mutations replayed on reconnect
//! - [`cart`]: context-scoped, expiring cart persistence

pub mod cart;
pub mod queue;

pub use cart::{CartEnvelope, CartStore, DEFAULT_CART_KEY, DEFAULT_CART_TTL};
pub use queue::{
    MutationExecutor, MutationStatus, OfflineQueue, QueueConfig, QueueError, QueueLog,
    QueueResult, QueuedMutation, SyncProgress, SyncReport, SyncStatus,
};
