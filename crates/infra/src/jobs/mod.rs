//! Cron-driven backend maintenance
//!
//! The backend exposes maintenance functions (stale driver cleanup,
//! expired booking cancellation, marketplace commission processing). The
//! [`MaintenanceScheduler`] triggers them on a schedule through the same
//! guarded call path as user traffic; the work itself runs server-side.

mod error;
pub mod maintenance_scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use maintenance_scheduler::{
    JobStats, MaintenanceJob, MaintenanceRunner, MaintenanceScheduler, MaintenanceSchedulerConfig,
};
