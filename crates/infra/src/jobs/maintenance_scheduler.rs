//! Cron scheduler for backend maintenance functions.
//!
//! Each [`MaintenanceJob`] is registered as its own cron job. A run calls the
//! matching backend function through a [`MaintenanceRunner`] (in production
//! the `GuardedInvoker`, so runs are subject to the session guardian and the
//! circuit breaker) and is bounded by the configured job timeout.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use superapp_common::auth::{CallError, GuardedInvoker};
use superapp_common::time::Clock;
use superapp_domain::constants::{
    FN_CANCEL_EXPIRED_BOOKINGS, FN_CLEANUP_STALE_DRIVERS, FN_PROCESS_MARKETPLACE_COMMISSION,
};
use superapp_domain::JobsConfig;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::error::{SchedulerError, SchedulerResult};

/// Backend maintenance functions run on a schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceJob {
    CleanupStaleDrivers,
    CancelExpiredBookings,
    ProcessMarketplaceCommission,
}

impl MaintenanceJob {
    pub const ALL: [MaintenanceJob; 3] = [
        MaintenanceJob::CleanupStaleDrivers,
        MaintenanceJob::CancelExpiredBookings,
        MaintenanceJob::ProcessMarketplaceCommission,
    ];

    /// Backend function invoked by this job
    pub fn function_name(self) -> &'static str {
        match self {
            Self::CleanupStaleDrivers => FN_CLEANUP_STALE_DRIVERS,
            Self::CancelExpiredBookings => FN_CANCEL_EXPIRED_BOOKINGS,
            Self::ProcessMarketplaceCommission => FN_PROCESS_MARKETPLACE_COMMISSION,
        }
    }

    pub fn cron_expression(self, config: &JobsConfig) -> &str {
        match self {
            Self::CleanupStaleDrivers => &config.cleanup_stale_drivers_cron,
            Self::CancelExpiredBookings => &config.cancel_expired_bookings_cron,
            Self::ProcessMarketplaceCommission => &config.process_marketplace_commission_cron,
        }
    }
}

/// Executes one maintenance function
#[async_trait]
pub trait MaintenanceRunner: Send + Sync {
    async fn run_maintenance(&self, function: &str) -> Result<Value, CallError>;
}

#[async_trait]
impl<C: Clock + 'static> MaintenanceRunner for GuardedInvoker<C> {
    async fn run_maintenance(&self, function: &str) -> Result<Value, CallError> {
        self.invoke_with_session(function, json!({})).await
    }
}

#[derive(Debug, Clone)]
pub struct MaintenanceSchedulerConfig {
    pub jobs: JobsConfig,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}

impl MaintenanceSchedulerConfig {
    pub fn new(jobs: JobsConfig) -> Self {
        Self { jobs, start_timeout: Duration::from_secs(5), stop_timeout: Duration::from_secs(5) }
    }
}

/// Run counters across all jobs
#[derive(Debug, Default)]
pub struct JobStats {
    runs: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
}

impl JobStats {
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }
}

/// Cron scheduler with explicit lifecycle management
///
/// Stopping shuts the underlying scheduler down for good; build a new
/// instance to schedule again.
pub struct MaintenanceScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    config: MaintenanceSchedulerConfig,
    runner: Arc<dyn MaintenanceRunner>,
    stats: Arc<JobStats>,
    job_ids: Vec<(MaintenanceJob, Uuid)>,
    cancellation: CancellationToken,
    running: bool,
}

impl MaintenanceScheduler {
    /// Create the scheduler and register every job
    ///
    /// # Errors
    /// [`SchedulerError::JobRegistrationFailed`] for an invalid cron
    /// expression.
    pub async fn new(
        config: MaintenanceSchedulerConfig,
        runner: Arc<dyn MaintenanceRunner>,
    ) -> SchedulerResult<Self> {
        let raw_scheduler =
            JobScheduler::new().await.map_err(|source| SchedulerError::CreationFailed { source })?;

        let mut scheduler = Self {
            scheduler: Arc::new(RwLock::new(raw_scheduler)),
            config,
            runner,
            stats: Arc::new(JobStats::default()),
            job_ids: Vec::new(),
            cancellation: CancellationToken::new(),
            running: false,
        };
        for job in MaintenanceJob::ALL {
            let id = scheduler.register(job).await?;
            scheduler.job_ids.push((job, id));
        }
        Ok(scheduler)
    }

    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.running {
            return Err(SchedulerError::AlreadyRunning);
        }
        if self.cancellation.is_cancelled() {
            return Err(SchedulerError::ShutDown);
        }

        let scheduler = Arc::clone(&self.scheduler);
        let start_timeout = self.config.start_timeout;
        tokio::time::timeout(start_timeout, async move { scheduler.read().await.start().await })
            .await
            .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?
            .map_err(|source| SchedulerError::StartFailed { source })?;

        self.running = true;
        info!(jobs = self.job_ids.len(), "Maintenance scheduler started");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.running {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();
        let scheduler = Arc::clone(&self.scheduler);
        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.write().await.shutdown().await })
            .await
            .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?
            .map_err(|source| SchedulerError::StopFailed { source })?;

        self.running = false;
        info!("Maintenance scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> &JobStats {
        &self.stats
    }

    /// Registered cron job ids
    pub fn job_ids(&self) -> &[(MaintenanceJob, Uuid)] {
        &self.job_ids
    }

    /// Run one job immediately, outside its schedule
    pub async fn run_now(&self, job: MaintenanceJob) {
        execute(
            job,
            self.runner.as_ref(),
            &self.stats,
            self.config.jobs.job_timeout(),
            &self.cancellation,
        )
        .await;
    }

    async fn register(&self, job: MaintenanceJob) -> SchedulerResult<Uuid> {
        let cron_expr = job.cron_expression(&self.config.jobs).to_string();
        let runner = Arc::clone(&self.runner);
        let stats = Arc::clone(&self.stats);
        let job_timeout = self.config.jobs.job_timeout();
        let cancel = self.cancellation.clone();

        let definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let runner = Arc::clone(&runner);
            let stats = Arc::clone(&stats);
            let cancel = cancel.clone();
            Box::pin(async move {
                execute(job, runner.as_ref(), &stats, job_timeout, &cancel).await;
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed {
            job: job.function_name(),
            source,
        })?;

        let job_id = definition.guid();
        self.scheduler.read().await.add(definition).await.map_err(|source| {
            SchedulerError::JobRegistrationFailed { job: job.function_name(), source }
        })?;
        debug!(job = job.function_name(), cron = %cron_expr, %job_id, "Registered maintenance job");
        Ok(job_id)
    }
}

async fn execute(
    job: MaintenanceJob,
    runner: &dyn MaintenanceRunner,
    stats: &JobStats,
    job_timeout: Duration,
    cancel: &CancellationToken,
) {
    if cancel.is_cancelled() {
        return;
    }

    let function = job.function_name();
    stats.runs.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();

    match tokio::time::timeout(job_timeout, runner.run_maintenance(function)).await {
        Ok(Ok(_)) => {
            debug!(function, elapsed_ms = started.elapsed().as_millis() as u64, "Maintenance job finished");
        }
        Ok(Err(CallError::CircuitOpen)) => {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            warn!(function, "Maintenance job skipped, circuit open");
        }
        Ok(Err(err)) => {
            stats.failures.fetch_add(1, Ordering::Relaxed);
            error!(function, kind = err.kind(), error = %err, "Maintenance job failed");
        }
        Err(_) => {
            stats.timeouts.fetch_add(1, Ordering::Relaxed);
            warn!(function, timeout_secs = job_timeout.as_secs(), "Maintenance job timed out");
        }
    }
}

impl Drop for MaintenanceScheduler {
    fn drop(&mut self) {
        if self.running {
            warn!("MaintenanceScheduler dropped while running; cancelling jobs");
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<String>>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl MaintenanceRunner for RecordingRunner {
        async fn run_maintenance(&self, function: &str) -> Result<Value, CallError> {
            self.calls.lock().unwrap().push(function.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(CallError::SessionExpired);
            }
            Ok(Value::Null)
        }
    }

    fn every_second() -> MaintenanceSchedulerConfig {
        let jobs = JobsConfig {
            enabled: true,
            job_timeout_secs: 2,
            cleanup_stale_drivers_cron: "*/1 * * * * *".into(),
            cancel_expired_bookings_cron: "0 0 0 1 1 *".into(),
            process_marketplace_commission_cron: "0 0 0 1 1 *".into(),
        };
        MaintenanceSchedulerConfig::new(jobs)
    }

    #[test]
    fn job_function_names() {
        assert_eq!(MaintenanceJob::CleanupStaleDrivers.function_name(), "cleanup-stale-drivers");
        assert_eq!(
            MaintenanceJob::CancelExpiredBookings.function_name(),
            "cancel-expired-bookings"
        );
        assert_eq!(
            MaintenanceJob::ProcessMarketplaceCommission.function_name(),
            "process-marketplace-commission"
        );
    }

    /// Validates scheduled execution.
    ///
    /// Assertions:
    /// - Confirms the every-second job runs at least once in two seconds.
    /// - Confirms only the due job ran.
    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_runs_due_job() {
        let runner = Arc::new(RecordingRunner::default());
        let mut scheduler =
            MaintenanceScheduler::new(every_second(), runner.clone()).await.expect("created");
        assert_eq!(scheduler.job_ids().len(), 3);

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_millis(2_200)).await;
        scheduler.stop().await.expect("stop succeeds");

        let calls = runner.calls.lock().unwrap().clone();
        assert!(!calls.is_empty());
        assert!(calls.iter().all(|c| c == "cleanup-stale-drivers"));
        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_is_rejected() {
        let runner = Arc::new(RecordingRunner::default());
        let mut scheduler = MaintenanceScheduler::new(every_second(), runner).await.unwrap();

        assert!(matches!(scheduler.stop().await, Err(SchedulerError::NotRunning)));
        scheduler.start().await.unwrap();
        assert!(matches!(scheduler.start().await, Err(SchedulerError::AlreadyRunning)));
        scheduler.stop().await.unwrap();
        assert!(matches!(scheduler.start().await, Err(SchedulerError::ShutDown)));
    }

    #[tokio::test]
    async fn invalid_cron_is_rejected() {
        let mut config = every_second();
        config.jobs.cancel_expired_bookings_cron = "every tuesday".into();
        let result = MaintenanceScheduler::new(config, Arc::new(RecordingRunner::default())).await;
        assert!(matches!(
            result,
            Err(SchedulerError::JobRegistrationFailed { job: "cancel-expired-bookings", .. })
        ));
    }

    /// Validates failure and timeout accounting on manual runs.
    #[tokio::test]
    async fn run_now_counts_failures_and_timeouts() {
        let failing = Arc::new(RecordingRunner { fail: true, ..Default::default() });
        let scheduler = MaintenanceScheduler::new(every_second(), failing).await.unwrap();
        scheduler.run_now(MaintenanceJob::ProcessMarketplaceCommission).await;
        assert_eq!(scheduler.stats().runs(), 1);
        assert_eq!(scheduler.stats().failures(), 1);

        let mut config = every_second();
        config.jobs.job_timeout_secs = 1;
        let slow = Arc::new(RecordingRunner {
            delay: Some(Duration::from_secs(3)),
            ..Default::default()
        });
        let scheduler = MaintenanceScheduler::new(config, slow).await.unwrap();
        scheduler.run_now(MaintenanceJob::CleanupStaleDrivers).await;
        assert_eq!(scheduler.stats().timeouts(), 1);
    }
}
