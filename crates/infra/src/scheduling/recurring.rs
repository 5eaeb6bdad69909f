//! Cron-driven recurring sync registration
//!
//! The recurring scheduler owns the cron runtime and does exactly one thing
//! per firing: enqueue the registered job specs on the queue. All real work
//! happens on queue workers, so a slow tick can never block the cron loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tempo_core::JobDispatcher;
use tempo_domain::JobSpec;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Closed set of recurring schedule slots. Re-registering a slot replaces
/// its previous cron job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScheduleKey {
    /// Calendar push/pull tick.
    CalendarSync,
    /// CRM and lead record pulls, sharing one cron firing.
    RecordSync,
}

impl ScheduleKey {
    fn as_str(&self) -> &'static str {
        match self {
            Self::CalendarSync => "calendar_sync",
            Self::RecordSync => "record_sync",
        }
    }
}

/// Lifecycle timeouts for the cron runtime.
#[derive(Debug, Clone)]
pub struct RecurringSchedulerConfig {
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}

impl Default for RecurringSchedulerConfig {
    fn default() -> Self {
        Self { start_timeout: Duration::from_secs(5), stop_timeout: Duration::from_secs(5) }
    }
}

/// Cron scheduler that feeds the job queue.
pub struct RecurringScheduler {
    scheduler: Arc<RwLock<JobScheduler>>,
    config: RecurringSchedulerConfig,
    jobs: HashMap<ScheduleKey, Uuid>,
    running: bool,
}

impl RecurringScheduler {
    pub async fn new() -> SchedulerResult<Self> {
        Self::with_config(RecurringSchedulerConfig::default()).await
    }

    pub async fn with_config(config: RecurringSchedulerConfig) -> SchedulerResult<Self> {
        let scheduler =
            JobScheduler::new().await.map_err(|source| SchedulerError::CreationFailed { source })?;

        Ok(Self {
            scheduler: Arc::new(RwLock::new(scheduler)),
            config,
            jobs: HashMap::new(),
            running: false,
        })
    }

    /// Register (or replace) a schedule slot: every cron firing enqueues the
    /// given specs in order.
    #[instrument(skip_all, fields(key = key.as_str(), cron))]
    pub async fn register(
        &mut self,
        key: ScheduleKey,
        cron: &str,
        dispatcher: Arc<dyn JobDispatcher>,
        specs: Vec<JobSpec>,
    ) -> SchedulerResult<()> {
        let scheduler = self.scheduler.write().await;

        if let Some(existing) = self.jobs.remove(&key) {
            debug!(job_id = %existing, "replacing registered schedule");
            scheduler
                .remove(&existing)
                .await
                .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;
        }

        let job = Job::new_async(cron, move |_id, _lock| {
            let dispatcher = Arc::clone(&dispatcher);
            let specs = specs.clone();
            Box::pin(async move {
                for spec in specs {
                    let kind = spec.kind;
                    if let Err(e) = dispatcher.enqueue(spec).await {
                        error!(%kind, error = %e, "failed to enqueue recurring job");
                    }
                }
            })
        })
        .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        let guid = job.guid();
        scheduler
            .add(job)
            .await
            .map_err(|source| SchedulerError::JobRegistrationFailed { source })?;

        self.jobs.insert(key, guid);
        info!(job_id = %guid, "registered recurring schedule");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.running {
            return Err(SchedulerError::AlreadyRunning);
        }

        let scheduler = self.scheduler.clone();
        let start_timeout = self.config.start_timeout;
        let result = tokio::time::timeout(start_timeout, async move {
            let guard = scheduler.write().await;
            guard.start().await
        })
        .await
        .map_err(|source| SchedulerError::Timeout { duration: start_timeout, source })?;

        result.map_err(|source| SchedulerError::StartFailed { source })?;
        self.running = true;
        info!("recurring scheduler started");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.running {
            return Err(SchedulerError::NotRunning);
        }

        let scheduler = self.scheduler.clone();
        let stop_timeout = self.config.stop_timeout;
        let result = tokio::time::timeout(stop_timeout, async move {
            let mut guard = scheduler.write().await;
            guard.shutdown().await
        })
        .await
        .map_err(|source| SchedulerError::Timeout { duration: stop_timeout, source })?;

        result.map_err(|source| SchedulerError::StopFailed { source })?;
        self.running = false;
        info!("recurring scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}
