//! Callback saga job handler
//!
//! Four steps per attempt, each independently idempotent:
//!
//! 1. **DealCreation** (attempt 0 only): create the CRM deal; the deal id is
//!    written back into the retry payload so it is created at most once.
//!    Failure is non-fatal.
//! 2. **TaskCreation**: stable external id `sr_{lead_id}`; reuse or create
//!    the "prepare proposal" task.
//! 3. **AppointmentSearch**: fuzzy match over local blocker mirrors, then
//!    live remote lookup across the configured calendars, 60 days forward.
//!    No match raises a retryable error while attempts remain; on the final
//!    attempt the saga ends in Unscheduled-Final (logged, not an error).
//! 4. **PrepScheduling**: prep block ending 15 minutes before the matched
//!    appointment; the `origin_ref` marker makes re-creation a no-op; the
//!    task deadline moves to the appointment start.
//!
//! Attempt convention: `attempts_made` counts completed attempts. The
//! 10-minute delay before attempt 0 comes from the enqueue options; the
//! custom backoff below is consulted only for re-enqueues.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tempo_domain::constants::{
    CALLBACK_INITIAL_DELAY_MS, CALLBACK_ORIGIN_REF_PREFIX, CALLBACK_PREP_LEAD_MINUTES,
    CALLBACK_SEARCH_WINDOW_DAYS, DEFAULT_PREP_DURATION_MINUTES, LEAD_EXTERNAL_ID_PREFIX,
};
use tempo_domain::{
    CalendarRouting, CallbackJob, EventSource, JobPayload, NewCalendarEvent, NewTask, Provider,
    Result, Task, TaskCategory, TaskPriority, TaskStatus, TempoError,
};
use tracing::{debug, info, instrument, warn};

use crate::auth::TokenManager;
use crate::connector_ports::{CalendarConnector, CrmConnector, DealWrite};
use crate::job_ports::{JobContext, JobError, JobHandler};
use crate::saga::matching::{event_matches, search_needles};
use crate::store_ports::{CalendarEventRepository, IntegrationStateRepository, TaskRepository};

/// Custom backoff for saga retries, keyed by completed attempts.
///
/// Attempt 0's delay is the initial 10-minute enqueue delay, not this
/// function; it is listed here only so the mapping is total.
pub fn callback_backoff(attempts_made: u32) -> u64 {
    match attempts_made {
        0 => CALLBACK_INITIAL_DELAY_MS,
        1 => 1_800_000, // +30min
        2 => 3_600_000, // +1h
        _ => 7_200_000, // +2h
    }
}

/// Transient step failures re-enqueue through the saga's backoff, carrying
/// the current payload (and any created deal id) into the retry; everything
/// else ends the job.
fn step_error(err: TempoError, job: &CallbackJob) -> JobError {
    if err.is_transient() {
        JobError::retry_with_payload(err.to_string(), JobPayload::Callback(job.clone()))
    } else {
        JobError::Fatal(err)
    }
}

/// Saga tuning knobs.
#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Length of the prep block scheduled before the appointment.
    pub prep_duration_minutes: i64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self { prep_duration_minutes: DEFAULT_PREP_DURATION_MINUTES }
    }
}

/// The callback saga job handler.
pub struct CallbackSaga {
    crm: Arc<dyn CrmConnector>,
    calendar: Arc<dyn CalendarConnector>,
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn CalendarEventRepository>,
    states: Arc<dyn IntegrationStateRepository>,
    tokens: Arc<TokenManager>,
    config: CallbackConfig,
}

/// An appointment candidate found in step 3.
#[derive(Debug, Clone, Copy)]
struct AppointmentMatch {
    start: DateTime<Utc>,
}

impl CallbackSaga {
    pub fn new(
        crm: Arc<dyn CrmConnector>,
        calendar: Arc<dyn CalendarConnector>,
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn CalendarEventRepository>,
        states: Arc<dyn IntegrationStateRepository>,
        tokens: Arc<TokenManager>,
        config: CallbackConfig,
    ) -> Self {
        Self { crm, calendar, tasks, events, states, tokens, config }
    }

    /// Step 1: create the CRM deal once. Non-fatal on failure — the deal id
    /// simply stays empty.
    async fn create_deal_once(&self, ctx: &JobContext, job: &mut CallbackJob) {
        if ctx.attempts_made > 0 || job.deal_id.is_some() {
            return;
        }

        let deal = DealWrite {
            title: format!(
                "Callback: {}",
                job.contact_name.as_deref().unwrap_or(&job.lead_id)
            ),
            contact_name: job.contact_name.clone(),
            phone: job.phone.clone(),
            address: job.address.clone(),
        };

        let created = match self.tokens.get_valid_token(Provider::Crm).await {
            Ok(token) => self.crm.create_deal(&token, &deal).await,
            Err(err) => Err(err),
        };

        match created {
            Ok(deal_id) => {
                debug!(lead_id = %job.lead_id, deal_id = %deal_id, "CRM deal created");
                job.deal_id = Some(deal_id);
            }
            Err(err) => {
                warn!(lead_id = %job.lead_id, error = %err, "deal creation failed, continuing without deal");
            }
        }
    }

    /// Step 2: find or create the proposal task under the stable external id.
    async fn ensure_task(&self, job: &CallbackJob) -> Result<Task> {
        let external_id = format!("{LEAD_EXTERNAL_ID_PREFIX}{}", job.lead_id);
        let external_source = Provider::Leads.as_str();

        if let Some(task) = self.tasks.find_by_external(&external_id, external_source).await? {
            return Ok(task);
        }

        let mut task = NewTask::mirrored(
            format!(
                "Prepare proposal: {}",
                job.contact_name.as_deref().unwrap_or(&job.lead_id)
            ),
            TaskCategory::Proposal,
            TaskPriority::High,
            external_id,
            external_source,
        );
        task.estimated_minutes = Some(self.config.prep_duration_minutes);
        self.tasks.insert(task).await
    }

    /// Step 3: local mirrors first, then live remote lookup.
    async fn find_appointment(&self, job: &CallbackJob) -> Result<Option<AppointmentMatch>> {
        let needles = search_needles(job.contact_name.as_deref(), job.address.as_deref());
        if needles.is_empty() {
            debug!(lead_id = %job.lead_id, "no usable search needles for appointment match");
            return Ok(None);
        }

        let start = Utc::now();
        let end = start + Duration::days(CALLBACK_SEARCH_WINDOW_DAYS);

        for event in self.events.list_blockers(start, end).await? {
            if event_matches(
                &needles,
                &event.title,
                event.description.as_deref(),
                event.location.as_deref(),
            ) {
                return Ok(Some(AppointmentMatch { start: event.start_time }));
            }
        }

        let token = self.tokens.get_valid_token(Provider::Calendar).await?;
        let routing = self.calendar_routing().await?;

        for calendar_id in routing.search_calendar_ids() {
            let remote = self.calendar.fetch_events(&token, calendar_id, start, end).await?;
            for event in remote {
                if event.cancelled {
                    continue;
                }
                let title = event.title.as_deref().unwrap_or_default();
                if event_matches(
                    &needles,
                    title,
                    event.description.as_deref(),
                    event.location.as_deref(),
                ) {
                    return Ok(Some(AppointmentMatch { start: event.start }));
                }
            }
        }

        Ok(None)
    }

    /// Step 4: place the prep block and move the task deadline.
    async fn schedule_prep(
        &self,
        job: &CallbackJob,
        task: &Task,
        appointment: AppointmentMatch,
    ) -> Result<()> {
        let origin_ref =
            format!("{CALLBACK_ORIGIN_REF_PREFIX}{LEAD_EXTERNAL_ID_PREFIX}{}", job.lead_id);

        if self.events.find_by_origin_ref(&origin_ref).await?.is_none() {
            let prep_end =
                appointment.start - Duration::minutes(CALLBACK_PREP_LEAD_MINUTES);
            let prep_start = prep_end - Duration::minutes(self.config.prep_duration_minutes);

            self.events
                .insert(NewCalendarEvent {
                    title: format!(
                        "Prep: {}",
                        job.contact_name.as_deref().unwrap_or(&job.lead_id)
                    ),
                    description: Some(task.title.clone()),
                    location: None,
                    start_time: prep_start,
                    end_time: prep_end,
                    is_blocker: false,
                    source: EventSource::AiPlanned,
                    remote_event_id: None,
                    origin_ref: Some(origin_ref),
                })
                .await?;
        } else {
            debug!(lead_id = %job.lead_id, "prep block already exists, skipping create");
        }

        self.tasks
            .set_schedule(&task.id, TaskStatus::Scheduled, Some(appointment.start))
            .await?;

        info!(lead_id = %job.lead_id, appointment_start = %appointment.start, "callback saga scheduled");
        Ok(())
    }

    async fn calendar_routing(&self) -> Result<CalendarRouting> {
        let state = self.states.get(Provider::Calendar).await?;
        Ok(state
            .and_then(|s| s.config)
            .and_then(|c| c.as_calendar().cloned())
            .unwrap_or_else(|| CalendarRouting {
                primary_calendar_id: "primary".to_string(),
                watched_calendar_ids: Vec::new(),
            }))
    }
}

#[async_trait]
impl JobHandler for CallbackSaga {
    #[instrument(skip(self, ctx), fields(job_id = %ctx.id, attempts_made = ctx.attempts_made))]
    async fn run(&self, ctx: JobContext) -> std::result::Result<(), JobError> {
        let JobPayload::Callback(ref payload) = ctx.payload else {
            return Err(JobError::Fatal(TempoError::InvalidInput(
                "callback saga received a non-callback payload".into(),
            )));
        };
        let mut job = payload.clone();

        self.create_deal_once(&ctx, &mut job).await;

        let task = match self.ensure_task(&job).await {
            Ok(task) => task,
            Err(err) => return Err(step_error(err, &job)),
        };

        let appointment = match self.find_appointment(&job).await {
            Ok(appointment) => appointment,
            Err(err) => return Err(step_error(err, &job)),
        };

        match appointment {
            Some(found) => self
                .schedule_prep(&job, &task, found)
                .await
                .map_err(|err| step_error(err, &job)),
            None if ctx.is_final_attempt() => {
                // Unscheduled-Final: the task exists, nothing further is
                // scheduled, and no further retry is enqueued.
                info!(
                    lead_id = %job.lead_id,
                    attempts = ctx.attempts_made + 1,
                    "no appointment found after final attempt; leaving task unscheduled"
                );
                Ok(())
            }
            None => Err(JobError::retry_with_payload(
                format!("no appointment match yet for lead {}", job.lead_id),
                JobPayload::Callback(job),
            )),
        }
    }
}
