//! Provider webhook relay
//!
//! Providers that push change notifications get their recurring cadence
//! short-circuited: a notification enqueues the matching sync job
//! immediately instead of waiting for the next cron firing. The payload of
//! the notification is ignored on purpose; the sync tick re-reads provider
//! state from scratch, so a spoofed or duplicated notification can at worst
//! trigger a redundant no-op tick.

use std::sync::Arc;

use tempo_core::JobDispatcher;
use tempo_domain::{JobId, JobKind, JobPayload, JobSpec, Provider, QueueName, Result};
use tracing::{info, instrument};

/// Relay from provider change notifications to immediate sync jobs.
pub struct WebhookRelay {
    dispatcher: Arc<dyn JobDispatcher>,
}

impl WebhookRelay {
    pub fn new(dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Enqueue an immediate sync tick for the notified provider.
    #[instrument(skip(self))]
    pub async fn notify(&self, provider: Provider) -> Result<JobId> {
        let kind = match provider {
            Provider::Calendar => JobKind::CalendarSync,
            Provider::Crm => JobKind::CrmSync,
            Provider::Leads => JobKind::LeadSync,
        };

        let spec = JobSpec::immediate(QueueName::Sync, kind, JobPayload::Sync { provider });
        let id = self.dispatcher.enqueue(spec).await?;
        info!(%provider, %id, "webhook notification enqueued sync tick");
        Ok(id)
    }
}
