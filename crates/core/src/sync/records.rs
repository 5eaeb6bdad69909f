//! Record reconciliation worker (CRM deals and field leads)
//!
//! Same push/pull shape as the calendar reconciler, specialized to
//! cursor-based records: existing-vs-new is decided by the
//! `(external_id, external_source)` pair, stage vocabulary goes through the
//! static tables, and terminal stages never create new tasks. A 304 from the
//! provider is a successful no-op that advances nothing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempo_domain::constants::{
    CALLBACK_INITIAL_DELAY_MS, CALLBACK_MAX_ATTEMPTS, LEAD_EXTERNAL_ID_PREFIX,
};
use tempo_domain::{
    BackoffPolicy, CallbackJob, CallbackTriggerRule, JobKind, JobPayload, JobSpec, NewTask,
    Provider, QueueName, Result, Task,
};
use tracing::{debug, info, instrument, warn};

use crate::auth::TokenManager;
use crate::connector_ports::{RecordConnector, RecordFetch, RemoteRecord};
use crate::job_ports::JobDispatcher;
use crate::saga::callback::callback_backoff;
use crate::store_ports::{IntegrationStateRepository, TaskRepository};
use crate::sync::mapping::{lookup_stage, StageMapping, CRM_STAGE_MAP, LEAD_STAGE_MAP};

/// Counters reported by one record sync tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordSyncStats {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub triggered: usize,
    /// True when the provider reported no changes since the cursor.
    pub not_modified: bool,
}

/// Shared cursor-based record reconciler, instantiated per provider.
pub struct RecordReconciler {
    provider: Provider,
    external_id_prefix: &'static str,
    stage_table: &'static [StageMapping],
    connector: Arc<dyn RecordConnector>,
    tasks: Arc<dyn TaskRepository>,
    states: Arc<dyn IntegrationStateRepository>,
    tokens: Arc<TokenManager>,
}

impl RecordReconciler {
    /// Reconciler for the CRM pipeline (Pipedrive deals).
    pub fn crm(
        connector: Arc<dyn RecordConnector>,
        tasks: Arc<dyn TaskRepository>,
        states: Arc<dyn IntegrationStateRepository>,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self {
            provider: Provider::Crm,
            external_id_prefix: "pd_",
            stage_table: CRM_STAGE_MAP,
            connector,
            tasks,
            states,
            tokens,
        }
    }

    /// Reconciler for the lead tracker (SalesRabbit).
    pub fn leads(
        connector: Arc<dyn RecordConnector>,
        tasks: Arc<dyn TaskRepository>,
        states: Arc<dyn IntegrationStateRepository>,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self {
            provider: Provider::Leads,
            external_id_prefix: LEAD_EXTERNAL_ID_PREFIX,
            stage_table: LEAD_STAGE_MAP,
            connector,
            tasks,
            states,
            tokens,
        }
    }

    /// Run one pull tick.
    #[instrument(skip(self), fields(provider = %self.provider))]
    pub async fn run_tick(&self) -> Result<RecordSyncStats> {
        Ok(self.pull().await?.stats)
    }

    /// Pull records since the cursor and upsert their task mirrors.
    pub(crate) async fn pull(&self) -> Result<PullOutcome> {
        let token = self.tokens.get_valid_token(self.provider).await?;
        let cursor = self
            .states
            .get(self.provider)
            .await?
            .and_then(|s| s.sync_cursor);

        let mut outcome = PullOutcome::default();

        let (records, next_cursor) =
            match self.connector.fetch_records(&token, cursor.as_deref()).await? {
                RecordFetch::NotModified => {
                    debug!(provider = %self.provider, "no changes since cursor");
                    outcome.stats.not_modified = true;
                    return Ok(outcome);
                }
                RecordFetch::Changed { records, next_cursor } => (records, next_cursor),
            };

        for record in records {
            match self.upsert_record(&record, &mut outcome.stats).await {
                Ok(Some(task)) => outcome.upserts.push((record, task)),
                Ok(None) => {}
                Err(err) => {
                    // Single-record failures must not abort the batch.
                    warn!(
                        provider = %self.provider,
                        record_id = %record.id,
                        error = %err,
                        "failed to reconcile record, skipping"
                    );
                    outcome.stats.skipped += 1;
                }
            }
        }

        self.states
            .set_sync_cursor(self.provider, next_cursor.as_deref(), Utc::now())
            .await?;

        info!(
            provider = %self.provider,
            created = outcome.stats.created,
            updated = outcome.stats.updated,
            skipped = outcome.stats.skipped,
            "record sync tick completed"
        );
        Ok(outcome)
    }

    async fn upsert_record(
        &self,
        record: &RemoteRecord,
        stats: &mut RecordSyncStats,
    ) -> Result<Option<Task>> {
        let Some(mapping) = lookup_stage(self.stage_table, &record.stage) else {
            debug!(provider = %self.provider, record_id = %record.id, stage = %record.stage, "unknown stage, skipping");
            stats.skipped += 1;
            return Ok(None);
        };

        let external_id = format!("{}{}", self.external_id_prefix, record.id);
        let external_source = self.provider.as_str();

        match self.tasks.find_by_external(&external_id, external_source).await? {
            Some(mut task) => {
                let changed = task.title != record.title
                    || task.category != mapping.category
                    || task.priority != mapping.priority;
                if changed {
                    task.title = record.title.clone();
                    task.category = mapping.category;
                    task.priority = mapping.priority;
                    self.tasks.update(&task).await?;
                    stats.updated += 1;
                }
                Ok(Some(task))
            }
            None => {
                if mapping.terminal {
                    // Closed remote stages are not imported as new tasks.
                    stats.skipped += 1;
                    return Ok(None);
                }
                let task = self
                    .tasks
                    .insert(NewTask::mirrored(
                        record.title.clone(),
                        mapping.category,
                        mapping.priority,
                        external_id,
                        external_source,
                    ))
                    .await?;
                stats.created += 1;
                Ok(Some(task))
            }
        }
    }
}

/// Records pulled in a tick paired with their task mirrors.
#[derive(Default)]
pub(crate) struct PullOutcome {
    pub stats: RecordSyncStats,
    pub upserts: Vec<(RemoteRecord, Task)>,
}

/// Lead reconciler: the shared record pull plus callback trigger detection.
pub struct LeadReconciler {
    inner: RecordReconciler,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl LeadReconciler {
    pub fn new(
        connector: Arc<dyn RecordConnector>,
        tasks: Arc<dyn TaskRepository>,
        states: Arc<dyn IntegrationStateRepository>,
        tokens: Arc<TokenManager>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        Self {
            inner: RecordReconciler::leads(connector, tasks, states, tokens),
            dispatcher,
        }
    }

    /// Run one pull tick, then evaluate the callback trigger rule against
    /// every pulled lead.
    #[instrument(skip(self))]
    pub async fn run_tick(&self) -> Result<RecordSyncStats> {
        let rule = self.trigger_rule().await?;
        let mut outcome = self.inner.pull().await?;

        for (record, task) in &outcome.upserts {
            if !matches_rule(&rule, record) || task.callback_processed {
                continue;
            }

            // Mark before enqueue: a crashed enqueue loses one saga run, a
            // re-trigger would duplicate deals.
            self.inner.tasks.set_callback_processed(&task.id).await?;
            self.enqueue_saga(record).await?;
            outcome.stats.triggered += 1;
            info!(lead_id = %record.id, "callback saga enqueued");
        }

        Ok(outcome.stats)
    }

    async fn enqueue_saga(&self, record: &RemoteRecord) -> Result<()> {
        let payload = JobPayload::Callback(CallbackJob {
            lead_id: record.id.clone(),
            contact_name: record.contact_name.clone(),
            phone: record.phone.clone(),
            address: record.address.clone(),
            deal_id: None,
        });

        let spec = JobSpec::immediate(QueueName::Planning, JobKind::CallbackSaga, payload)
            .with_delay(Duration::from_millis(CALLBACK_INITIAL_DELAY_MS))
            .with_attempts(CALLBACK_MAX_ATTEMPTS)
            .with_backoff(BackoffPolicy::Custom(Arc::new(callback_backoff)));

        self.dispatcher.enqueue(spec).await?;
        Ok(())
    }

    async fn trigger_rule(&self) -> Result<CallbackTriggerRule> {
        let state = self.inner.states.get(Provider::Leads).await?;
        Ok(state
            .and_then(|s| s.config)
            .and_then(|c| c.as_leads().cloned())
            .unwrap_or_default())
    }
}

/// Status-name equality or custom-field match, per the configured rule.
pub(crate) fn matches_rule(rule: &CallbackTriggerRule, record: &RemoteRecord) -> bool {
    if !rule.enabled {
        return false;
    }

    if let Some(status) = rule.status_name_match.as_deref() {
        if record.stage.eq_ignore_ascii_case(status) {
            return true;
        }
    }

    if let (Some(field), Some(expected)) =
        (rule.custom_field.as_deref(), rule.custom_field_match.as_deref())
    {
        if record
            .custom_fields
            .get(field)
            .is_some_and(|value| value.eq_ignore_ascii_case(expected))
        {
            return true;
        }
    }

    false
}
