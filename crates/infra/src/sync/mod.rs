//! Background synchronization
//!
//! - [`ConnectivityMonitor`]: online/offline signal fed by the platform
//! - [`ReconnectWorker`]: replays the offline queue whenever the signal
//!   flips back to online
//!
//! The worker follows the explicit lifecycle rules used across this crate:
//! join handles are tracked, cancellation is explicit, and stopping waits
//! a bounded time for the task to finish.

mod connectivity;
mod errors;
pub mod reconnect_worker;

pub use connectivity::ConnectivityMonitor;
pub use errors::{WorkerError, WorkerResult};
pub use reconnect_worker::{ReconnectWorker, ReconnectWorkerConfig};
