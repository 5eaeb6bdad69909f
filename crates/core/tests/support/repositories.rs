//! In-memory repository mocks with write counters.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempo_core::{CalendarEventRepository, IntegrationStateRepository, TaskRepository};
use tempo_domain::{
    CalendarEvent, IntegrationConfig, IntegrationState, NewCalendarEvent, NewTask, Provider,
    Result, Task, TaskStatus, TempoError,
};

/// Task store backed by a `Vec`. Ids are `task-1`, `task-2`, ...
#[derive(Default)]
pub struct MockTaskRepository {
    tasks: Mutex<Vec<Task>>,
    pub insert_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, task: Task) {
        self.tasks.lock().unwrap().push(task);
    }

    pub fn all(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().clone()
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.tasks.lock().unwrap().iter().find(|t| t.id == id).cloned()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn find_by_external(
        &self,
        external_id: &str,
        external_source: &str,
    ) -> Result<Option<Task>> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| {
                t.external_id.as_deref() == Some(external_id)
                    && t.external_source.as_deref() == Some(external_source)
            })
            .cloned())
    }

    async fn insert(&self, task: NewTask) -> Result<Task> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().unwrap();
        let now = Utc::now();
        let task = Task {
            id: format!("task-{}", tasks.len() + 1),
            title: task.title,
            description: task.description,
            status: task.status,
            category: task.category,
            priority: task.priority,
            due_at: task.due_at,
            estimated_minutes: task.estimated_minutes,
            callback_processed: false,
            external_id: task.external_id,
            external_source: task.external_source,
            created_at: now,
            updated_at: now,
        };
        tasks.push(task.clone());
        Ok(task)
    }

    async fn update(&self, task: &Task) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut tasks = self.tasks.lock().unwrap();
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == task.id)
            .ok_or_else(|| TempoError::NotFound(format!("task {}", task.id)))?;
        *slot = task.clone();
        slot.updated_at = Utc::now();
        Ok(())
    }

    async fn set_callback_processed(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TempoError::NotFound(format!("task {id}")))?;
        slot.callback_processed = true;
        Ok(())
    }

    async fn set_schedule(
        &self,
        id: &str,
        status: TaskStatus,
        due_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut tasks = self.tasks.lock().unwrap();
        let slot = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| TempoError::NotFound(format!("task {id}")))?;
        slot.status = status;
        slot.due_at = due_at;
        slot.updated_at = Utc::now();
        Ok(())
    }
}

/// Calendar event store backed by a `Vec`. Ids are `event-1`, `event-2`, ...
#[derive(Default)]
pub struct MockCalendarEventRepository {
    events: Mutex<Vec<CalendarEvent>>,
    pub insert_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl MockCalendarEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, event: CalendarEvent) {
        self.events.lock().unwrap().push(event);
    }

    pub fn all(&self) -> Vec<CalendarEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
            + self.update_calls.load(Ordering::SeqCst)
            + self.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarEventRepository for MockCalendarEventRepository {
    async fn list_unpushed(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| {
                e.source.is_local()
                    && !e.is_blocker
                    && e.remote_event_id.is_none()
                    && e.start_time >= start
                    && e.start_time <= end
            })
            .cloned()
            .collect())
    }

    async fn set_remote_id(&self, id: &str, remote_event_id: &str) -> Result<()> {
        let mut events = self.events.lock().unwrap();
        let slot = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| TempoError::NotFound(format!("event {id}")))?;
        slot.remote_event_id = Some(remote_event_id.to_string());
        slot.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_remote_id(&self, remote_event_id: &str) -> Result<Option<CalendarEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.remote_event_id.as_deref() == Some(remote_event_id))
            .cloned())
    }

    async fn insert(&self, event: NewCalendarEvent) -> Result<CalendarEvent> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events.lock().unwrap();
        let now = Utc::now();
        let event = CalendarEvent {
            id: format!("event-{}", events.len() + 1),
            title: event.title,
            description: event.description,
            location: event.location,
            start_time: event.start_time,
            end_time: event.end_time,
            is_blocker: event.is_blocker,
            source: event.source,
            remote_event_id: event.remote_event_id,
            origin_ref: event.origin_ref,
            created_at: now,
            updated_at: now,
        };
        events.push(event.clone());
        Ok(event)
    }

    async fn update(&self, event: &CalendarEvent) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut events = self.events.lock().unwrap();
        let slot = events
            .iter_mut()
            .find(|e| e.id == event.id)
            .ok_or_else(|| TempoError::NotFound(format!("event {}", event.id)))?;
        *slot = event.clone();
        slot.updated_at = Utc::now();
        Ok(())
    }

    async fn list_blockers(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.is_blocker && e.start_time >= start && e.start_time <= end)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().retain(|e| e.id != id);
        Ok(())
    }

    async fn find_by_origin_ref(&self, origin_ref: &str) -> Result<Option<CalendarEvent>> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.origin_ref.as_deref() == Some(origin_ref))
            .cloned())
    }
}

/// Integration state store backed by a per-provider map.
#[derive(Default)]
pub struct MockIntegrationStateRepository {
    states: Mutex<HashMap<Provider, IntegrationState>>,
}

impl MockIntegrationStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, state: IntegrationState) {
        self.states.lock().unwrap().insert(state.provider, state);
    }

    pub fn snapshot(&self, provider: Provider) -> Option<IntegrationState> {
        self.states.lock().unwrap().get(&provider).cloned()
    }
}

#[async_trait]
impl IntegrationStateRepository for MockIntegrationStateRepository {
    async fn get(&self, provider: Provider) -> Result<Option<IntegrationState>> {
        Ok(self.states.lock().unwrap().get(&provider).cloned())
    }

    async fn upsert(&self, state: &IntegrationState) -> Result<()> {
        self.states.lock().unwrap().insert(state.provider, state.clone());
        Ok(())
    }

    async fn save_tokens(
        &self,
        provider: Provider,
        access_token: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(&provider)
            .ok_or_else(|| TempoError::NotFound(format!("integration {provider}")))?;
        state.access_token = Some(access_token.to_string());
        state.token_expires_at = expires_at;
        Ok(())
    }

    async fn set_active(&self, provider: Provider, is_active: bool) -> Result<()> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(&provider)
            .ok_or_else(|| TempoError::NotFound(format!("integration {provider}")))?;
        state.is_active = is_active;
        Ok(())
    }

    async fn set_sync_cursor(
        &self,
        provider: Provider,
        cursor: Option<&str>,
        last_sync_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(&provider)
            .ok_or_else(|| TempoError::NotFound(format!("integration {provider}")))?;
        state.sync_cursor = cursor.map(str::to_string);
        state.last_sync_at = Some(last_sync_at);
        Ok(())
    }

    async fn clear_credentials(&self, provider: Provider) -> Result<()> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(&provider)
            .ok_or_else(|| TempoError::NotFound(format!("integration {provider}")))?;
        state.access_token = None;
        state.refresh_token = None;
        state.token_expires_at = None;
        state.sync_cursor = None;
        Ok(())
    }

    async fn set_config(&self, provider: Provider, config: &IntegrationConfig) -> Result<()> {
        let mut states = self.states.lock().unwrap();
        let state = states
            .get_mut(&provider)
            .ok_or_else(|| TempoError::NotFound(format!("integration {provider}")))?;
        state.config = Some(config.clone());
        Ok(())
    }
}
