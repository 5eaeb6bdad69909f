//! In-memory connector and dispatcher mocks.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tempo_core::{
    CalendarConnector, CrmConnector, DealWrite, DeleteOutcome, EventWrite, JobDispatcher,
    RecordConnector, RecordFetch, RemoteEvent, RemoteRecord, TokenRefresh, TokenRefresher,
};
use tempo_domain::{JobId, JobSpec, Result, TempoError};

/// Calendar provider serving a fixed set of remote events.
#[derive(Default)]
pub struct MockCalendarConnector {
    remote: Mutex<Vec<RemoteEvent>>,
    pub created: Mutex<Vec<EventWrite>>,
    pub create_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
    pub fail_create: AtomicBool,
    pub fail_fetch: AtomicBool,
}

impl MockCalendarConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, event: RemoteEvent) {
        self.remote.lock().unwrap().push(event);
    }

    pub fn remove(&self, remote_id: &str) {
        self.remote.lock().unwrap().retain(|e| e.id != remote_id);
    }
}

#[async_trait]
impl CalendarConnector for MockCalendarConnector {
    async fn fetch_events(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemoteEvent>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(TempoError::Network("simulated fetch failure".into()));
        }
        Ok(self
            .remote
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.start >= start && e.start <= end)
            .cloned()
            .collect())
    }

    async fn create_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        event: &EventWrite,
    ) -> Result<String> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(TempoError::Network("simulated create failure".into()));
        }
        let mut created = self.created.lock().unwrap();
        created.push(event.clone());
        Ok(format!("remote-{}", created.len()))
    }

    async fn update_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        _remote_id: &str,
        _event: &EventWrite,
    ) -> Result<()> {
        Ok(())
    }

    async fn delete_event(
        &self,
        _access_token: &str,
        _calendar_id: &str,
        remote_id: &str,
    ) -> Result<DeleteOutcome> {
        let mut remote = self.remote.lock().unwrap();
        let before = remote.len();
        remote.retain(|e| e.id != remote_id);
        if remote.len() < before {
            Ok(DeleteOutcome::Deleted)
        } else {
            Ok(DeleteOutcome::AlreadyGone)
        }
    }
}

/// Record provider serving one fetch outcome per tick.
#[derive(Default)]
pub struct MockRecordConnector {
    records: Mutex<Vec<RemoteRecord>>,
    next_cursor: Mutex<Option<String>>,
    pub not_modified: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub seen_cursors: Mutex<Vec<Option<String>>>,
}

impl MockRecordConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, record: RemoteRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn set_next_cursor(&self, cursor: &str) {
        *self.next_cursor.lock().unwrap() = Some(cursor.to_string());
    }
}

#[async_trait]
impl RecordConnector for MockRecordConnector {
    async fn fetch_records(
        &self,
        _access_token: &str,
        since_cursor: Option<&str>,
    ) -> Result<RecordFetch> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_cursors.lock().unwrap().push(since_cursor.map(str::to_string));
        if self.not_modified.load(Ordering::SeqCst) {
            return Ok(RecordFetch::NotModified);
        }
        Ok(RecordFetch::Changed {
            records: self.records.lock().unwrap().clone(),
            next_cursor: self.next_cursor.lock().unwrap().clone(),
        })
    }
}

/// CRM provider: record pulls plus deal creation.
#[derive(Default)]
pub struct MockCrmConnector {
    pub records: MockRecordConnector,
    pub deals: Mutex<Vec<DealWrite>>,
    pub create_deal_calls: AtomicUsize,
    pub fail_create_deal: AtomicBool,
}

impl MockCrmConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordConnector for MockCrmConnector {
    async fn fetch_records(
        &self,
        access_token: &str,
        since_cursor: Option<&str>,
    ) -> Result<RecordFetch> {
        self.records.fetch_records(access_token, since_cursor).await
    }
}

#[async_trait]
impl CrmConnector for MockCrmConnector {
    async fn create_deal(&self, _access_token: &str, deal: &DealWrite) -> Result<String> {
        self.create_deal_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_deal.load(Ordering::SeqCst) {
            return Err(TempoError::Network("simulated deal failure".into()));
        }
        let mut deals = self.deals.lock().unwrap();
        deals.push(deal.clone());
        Ok(format!("deal-{}", deals.len()))
    }
}

/// Refresher returning a fixed fresh token, or failing on demand.
#[derive(Default)]
pub struct MockTokenRefresher {
    pub refresh_calls: AtomicUsize,
    pub revoke_calls: AtomicUsize,
    pub fail_refresh: AtomicBool,
}

impl MockTokenRefresher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let refresher = Self::default();
        refresher.fail_refresh.store(true, Ordering::SeqCst);
        refresher
    }
}

#[async_trait]
impl TokenRefresher for MockTokenRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<TokenRefresh> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(TempoError::Auth("simulated refresh rejection".into()));
        }
        Ok(TokenRefresh {
            access_token: "refreshed-token".into(),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }

    async fn revoke(&self, _token: &str) -> Result<()> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Dispatcher that records enqueued specs instead of running them.
#[derive(Default)]
pub struct MockDispatcher {
    pub enqueued: Mutex<Vec<JobSpec>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.enqueued.lock().unwrap().len()
    }
}

#[async_trait]
impl JobDispatcher for MockDispatcher {
    async fn enqueue(&self, spec: JobSpec) -> Result<JobId> {
        self.enqueued.lock().unwrap().push(spec);
        Ok(JobId::new())
    }
}
