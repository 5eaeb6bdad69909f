//! Engine context - dependency injection container
//!
//! Builds the whole adapter graph from an [`EngineConfig`]: database and
//! repositories, provider clients, token manager, reconcilers, saga, queue
//! and the recurring schedule. `build` wires, `start` launches, `shutdown`
//! drains.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tempo_core::{
    CalendarEventRepository, CalendarReconciler, CallbackConfig, CallbackSaga,
    IntegrationStateRepository, JobDispatcher, LeadReconciler, RecordReconciler, TaskRepository,
    TokenManager, TokenRefresher,
};
use tempo_domain::{
    CalendarRouting, IntegrationConfig, JobKind, JobPayload, JobSpec, Provider, QueueName, Result,
    TempoError,
};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::config::EngineConfig;
use crate::database::{
    DbManager, SqliteCalendarEventRepository, SqliteIntegrationStateRepository,
    SqliteTaskRepository,
};
use crate::http::HttpClient;
use crate::integrations::{GoogleCalendarClient, PipedriveClient, SalesRabbitClient};
use crate::scheduling::{
    register_handlers, JobQueue, RecurringScheduler, ScheduleKey, SyncJobHandler,
};
use crate::webhook::WebhookRelay;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Engine context - holds the wired adapter graph.
pub struct EngineContext {
    pub config: EngineConfig,
    pub db: Arc<DbManager>,
    pub tasks: Arc<dyn TaskRepository>,
    pub events: Arc<dyn CalendarEventRepository>,
    pub states: Arc<dyn IntegrationStateRepository>,
    pub tokens: Arc<TokenManager>,
    pub queue: JobQueue,
    pub webhooks: Arc<WebhookRelay>,
    google: Arc<GoogleCalendarClient>,
    scheduler: Mutex<RecurringScheduler>,
}

impl EngineContext {
    /// Wire the full graph. Nothing runs until [`start`](Self::start).
    #[instrument(skip(config), fields(db_path = %config.database.path))]
    pub async fn build(config: EngineConfig) -> Result<Self> {
        let db = Arc::new(DbManager::new(&config.database.path, config.database.pool_size)?);
        db.run_migrations()?;

        let pool = Arc::clone(db.pool());
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let events: Arc<dyn CalendarEventRepository> =
            Arc::new(SqliteCalendarEventRepository::new(pool.clone()));
        let states: Arc<dyn IntegrationStateRepository> =
            Arc::new(SqliteIntegrationStateRepository::new(pool));

        let http = HttpClient::builder().user_agent("tempo-engine").build()?;
        let google = Arc::new(GoogleCalendarClient::new(http.clone(), &config.google));
        let salesrabbit =
            Arc::new(SalesRabbitClient::new(http.clone(), config.salesrabbit.base_url.clone()));

        // The CRM owner filter lives in the stored integration config.
        let crm_owner = match states.get(Provider::Crm).await? {
            Some(state) => match state.config {
                Some(IntegrationConfig::Crm { owner_id }) => owner_id,
                _ => None,
            },
            None => None,
        };
        let pipedrive = Arc::new(
            PipedriveClient::new(http, config.pipedrive.base_url.clone())
                .with_owner_filter(crm_owner),
        );

        let mut refreshers: HashMap<Provider, Arc<dyn TokenRefresher>> = HashMap::new();
        refreshers.insert(Provider::Calendar, google.clone());
        let tokens = Arc::new(TokenManager::new(states.clone(), refreshers));

        let queue = JobQueue::new();
        let dispatcher: Arc<dyn JobDispatcher> = Arc::new(queue.clone());

        let calendar_reconciler = Arc::new(CalendarReconciler::new(
            google.clone(),
            events.clone(),
            states.clone(),
            tokens.clone(),
        ));
        let crm_reconciler = Arc::new(RecordReconciler::crm(
            pipedrive.clone(),
            tasks.clone(),
            states.clone(),
            tokens.clone(),
        ));
        let lead_reconciler = Arc::new(LeadReconciler::new(
            salesrabbit,
            tasks.clone(),
            states.clone(),
            tokens.clone(),
            dispatcher.clone(),
        ));
        let saga = Arc::new(CallbackSaga::new(
            pipedrive,
            google.clone(),
            tasks.clone(),
            events.clone(),
            states.clone(),
            tokens.clone(),
            CallbackConfig { prep_duration_minutes: config.callback.prep_duration_minutes },
        ));

        let sync_handler = Arc::new(SyncJobHandler::new(
            calendar_reconciler,
            crm_reconciler,
            lead_reconciler,
            dispatcher.clone(),
        ));
        register_handlers(&queue, sync_handler, saga);

        let mut scheduler = RecurringScheduler::new().await?;
        if config.sync.enabled {
            scheduler
                .register(
                    ScheduleKey::CalendarSync,
                    &config.sync.calendar_cron,
                    dispatcher.clone(),
                    vec![sync_spec(JobKind::CalendarSync, Provider::Calendar)],
                )
                .await?;
            scheduler
                .register(
                    ScheduleKey::RecordSync,
                    &config.sync.records_cron,
                    dispatcher.clone(),
                    vec![
                        sync_spec(JobKind::CrmSync, Provider::Crm),
                        sync_spec(JobKind::LeadSync, Provider::Leads),
                    ],
                )
                .await?;
        } else {
            warn!("recurring sync is disabled by configuration");
        }

        let webhooks = Arc::new(WebhookRelay::new(dispatcher));

        Ok(Self {
            config,
            db,
            tasks,
            events,
            states,
            tokens,
            queue,
            webhooks,
            google,
            scheduler: Mutex::new(scheduler),
        })
    }

    /// Start the recurring scheduler and resolve the dedicated calendar if
    /// one is configured by name.
    pub async fn start(&self) -> Result<()> {
        self.resolve_named_calendar().await;
        self.scheduler.lock().await.start().await?;
        info!("engine context started");
        Ok(())
    }

    /// Stop the cron loop and drain in-flight jobs.
    pub async fn shutdown(&self) -> Result<()> {
        let mut scheduler = self.scheduler.lock().await;
        if scheduler.is_running() {
            scheduler.stop().await?;
        }
        drop(scheduler);

        self.queue.shutdown(SHUTDOWN_TIMEOUT).await?;
        info!("engine context shut down");
        Ok(())
    }

    /// Best-effort: map `google.calendar_name` to a calendar id and store it
    /// as the push target. Skipped when the provider is not connected yet.
    async fn resolve_named_calendar(&self) {
        let Some(name) = self.config.google.calendar_name.clone() else {
            return;
        };

        if let Err(e) = self.try_resolve_named_calendar(&name).await {
            warn!(name, error = %e, "could not resolve configured calendar name");
        }
    }

    async fn try_resolve_named_calendar(&self, name: &str) -> Result<()> {
        let token = self.tokens.get_valid_token(Provider::Calendar).await?;
        let id = self.google.find_or_create_calendar(&token, name).await?;

        let watched = match self.states.get(Provider::Calendar).await? {
            Some(state) => state
                .config
                .as_ref()
                .and_then(|c| c.as_calendar())
                .map(|routing| routing.watched_calendar_ids.clone())
                .unwrap_or_default(),
            None => {
                return Err(TempoError::NotFound("calendar integration state".into()));
            }
        };

        self.states
            .set_config(
                Provider::Calendar,
                &IntegrationConfig::Calendar(CalendarRouting {
                    primary_calendar_id: id.clone(),
                    watched_calendar_ids: watched,
                }),
            )
            .await?;

        info!(name, calendar_id = %id, "resolved configured calendar");
        Ok(())
    }
}

fn sync_spec(kind: JobKind, provider: Provider) -> JobSpec {
    JobSpec::immediate(QueueName::Sync, kind, JobPayload::Sync { provider })
}
