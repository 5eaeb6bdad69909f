//! Queue handler bindings
//!
//! Binds the core reconcilers and the callback saga to the job kinds the
//! queue dispatches on. Sync handlers run a reconciler tick; a calendar tick
//! that mirrored new blockers chains an immediate replan on the planning
//! queue so the day's plan reacts to the new obstacles.

use std::sync::Arc;

use async_trait::async_trait;
use tempo_core::{
    CalendarReconciler, CallbackSaga, JobContext, JobDispatcher, JobError, JobHandler,
    LeadReconciler, RecordReconciler,
};
use tempo_domain::{JobKind, JobPayload, JobSpec, Provider, QueueName, TempoError};
use tracing::{info, instrument, warn};

use crate::scheduling::queue::JobQueue;

/// Handler for the three provider sync kinds.
pub struct SyncJobHandler {
    calendar: Arc<CalendarReconciler>,
    crm: Arc<RecordReconciler>,
    leads: Arc<LeadReconciler>,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl SyncJobHandler {
    pub fn new(
        calendar: Arc<CalendarReconciler>,
        crm: Arc<RecordReconciler>,
        leads: Arc<LeadReconciler>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self { calendar, crm, leads, dispatcher }
    }

    async fn run_calendar_tick(&self) -> Result<(), JobError> {
        let stats = self.calendar.run_tick().await.map_err(sync_error)?;
        info!(
            pushed = stats.pushed,
            mirrors_created = stats.mirrors_created,
            mirrors_updated = stats.mirrors_updated,
            mirrors_deleted = stats.mirrors_deleted,
            "calendar sync tick finished"
        );

        if stats.created_blockers() {
            let replan =
                JobSpec::immediate(QueueName::Planning, JobKind::Replan, JobPayload::Replan);
            if let Err(e) = self.dispatcher.enqueue(replan).await {
                warn!(error = %e, "failed to chain replan after calendar tick");
            }
        }
        Ok(())
    }
}

/// Transient failures requeue through the job's backoff; everything else
/// ends the job.
fn sync_error(err: TempoError) -> JobError {
    if err.is_transient() {
        JobError::retry(err.to_string())
    } else {
        JobError::Fatal(err)
    }
}

#[async_trait]
impl JobHandler for SyncJobHandler {
    #[instrument(skip(self, ctx), fields(kind = %ctx.kind))]
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        match (&ctx.kind, &ctx.payload) {
            (JobKind::CalendarSync, JobPayload::Sync { provider: Provider::Calendar }) => {
                self.run_calendar_tick().await
            }
            (JobKind::CrmSync, JobPayload::Sync { provider: Provider::Crm }) => {
                let stats = self.crm.run_tick().await.map_err(sync_error)?;
                info!(
                    created = stats.created,
                    updated = stats.updated,
                    skipped = stats.skipped,
                    not_modified = stats.not_modified,
                    "crm sync tick finished"
                );
                Ok(())
            }
            (JobKind::LeadSync, JobPayload::Sync { provider: Provider::Leads }) => {
                let stats = self.leads.run_tick().await.map_err(sync_error)?;
                info!(
                    created = stats.created,
                    updated = stats.updated,
                    triggered = stats.triggered,
                    not_modified = stats.not_modified,
                    "lead sync tick finished"
                );
                Ok(())
            }
            (kind, payload) => Err(JobError::Fatal(TempoError::Internal(format!(
                "mismatched sync job: kind {kind}, payload {payload:?}"
            )))),
        }
    }
}

/// Handler for replan jobs.
///
/// The planning engine itself lives outside this crate; the handler keeps
/// the queue contract (serialized on the planning queue) and logs the
/// trigger so chained replans are observable.
pub struct ReplanJobHandler;

#[async_trait]
impl JobHandler for ReplanJobHandler {
    #[instrument(skip(self, ctx), fields(id = %ctx.id))]
    async fn run(&self, ctx: JobContext) -> Result<(), JobError> {
        match ctx.payload {
            JobPayload::Replan => {
                info!("replan requested");
                Ok(())
            }
            other => Err(JobError::Fatal(TempoError::Internal(format!(
                "replan job with wrong payload: {other:?}"
            )))),
        }
    }
}

/// Wire every handler into the queue.
pub fn register_handlers(queue: &JobQueue, sync: Arc<SyncJobHandler>, saga: Arc<CallbackSaga>) {
    queue.register(JobKind::CalendarSync, sync.clone());
    queue.register(JobKind::CrmSync, sync.clone());
    queue.register(JobKind::LeadSync, sync);
    queue.register(JobKind::CallbackSaga, saga);
    queue.register(JobKind::Replan, Arc::new(ReplanJobHandler));
}
