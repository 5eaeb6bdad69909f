//! Reconciliation engine tests
//!
//! Exercises the push/pull/diff/drift calendar tick and the cursor-based
//! record pull for the CRM and lead providers, asserting the idempotency
//! properties the engine promises: repeated runs with unchanged inputs make
//! zero writes, and every remote record maps to at most one local row.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tempo_core::{
    CalendarReconciler, LeadReconciler, RecordReconciler, RemoteEvent, RemoteRecord,
};
use tempo_domain::{
    CalendarEvent, CalendarRouting, CallbackTriggerRule, EventSource, IntegrationConfig, JobKind,
    Provider, QueueName, TaskStatus,
};

use support::connectors::{MockCalendarConnector, MockDispatcher, MockRecordConnector};
use support::repositories::{
    MockCalendarEventRepository, MockIntegrationStateRepository, MockTaskRepository,
};
use support::{active_state, token_manager};

fn seed_calendar_state(states: &MockIntegrationStateRepository) {
    let mut state = active_state(Provider::Calendar);
    state.config = Some(IntegrationConfig::Calendar(CalendarRouting {
        primary_calendar_id: "primary-cal".into(),
        watched_calendar_ids: vec![],
    }));
    states.seed(state);
}

fn local_unpushed(id: &str, title: &str, start: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        id: id.into(),
        title: title.into(),
        description: None,
        location: None,
        start_time: start,
        end_time: start + Duration::hours(1),
        is_blocker: false,
        source: EventSource::AiPlanned,
        remote_event_id: None,
        origin_ref: None,
        created_at: start,
        updated_at: start,
    }
}

fn remote_event(id: &str, title: &str, start: DateTime<Utc>) -> RemoteEvent {
    RemoteEvent {
        id: id.into(),
        title: Some(title.into()),
        description: None,
        location: None,
        start,
        end: start + Duration::hours(1),
        all_day: false,
        cancelled: false,
        app_origin: false,
    }
}

fn lead_record(id: &str, stage: &str) -> RemoteRecord {
    RemoteRecord {
        id: id.into(),
        title: format!("Lead {id}"),
        stage: stage.into(),
        contact_name: Some("Jane Doe".into()),
        phone: Some("555-0100".into()),
        address: Some("12 Elm Street, Springfield".into()),
        ..RemoteRecord::default()
    }
}

struct CalendarFixture {
    connector: Arc<MockCalendarConnector>,
    events: Arc<MockCalendarEventRepository>,
    states: Arc<MockIntegrationStateRepository>,
    reconciler: CalendarReconciler,
}

fn calendar_fixture() -> CalendarFixture {
    let connector = Arc::new(MockCalendarConnector::new());
    let events = Arc::new(MockCalendarEventRepository::new());
    let states = Arc::new(MockIntegrationStateRepository::new());
    seed_calendar_state(&states);
    let tokens = token_manager(states.clone());
    let reconciler = CalendarReconciler::new(
        connector.clone(),
        events.clone(),
        states.clone(),
        tokens,
    );
    CalendarFixture { connector, events, states, reconciler }
}

#[tokio::test]
async fn push_creates_each_local_event_exactly_once() {
    let fx = calendar_fixture();
    fx.events.seed(local_unpushed("e1", "Prep: Jane Doe", Utc::now() + Duration::days(1)));

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.pushed, 1);
    assert_eq!(fx.connector.create_calls.load(Ordering::SeqCst), 1);

    let pushed = &fx.events.all()[0];
    assert_eq!(pushed.remote_event_id.as_deref(), Some("remote-1"));

    // The remote id is the idempotency key: a second tick creates nothing.
    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.pushed, 0);
    assert_eq!(fx.connector.create_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_push_is_retried_on_the_next_tick() {
    let fx = calendar_fixture();
    fx.events.seed(local_unpushed("e1", "Prep: Jane Doe", Utc::now() + Duration::days(1)));
    fx.connector.fail_create.store(true, Ordering::SeqCst);

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.push_failures, 1);
    assert!(fx.events.all()[0].remote_event_id.is_none());

    fx.connector.fail_create.store(false, Ordering::SeqCst);
    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.pushed, 1);
    assert!(fx.events.all()[0].remote_event_id.is_some());
}

#[tokio::test]
async fn pull_mirrors_remote_entries_as_blockers() {
    let fx = calendar_fixture();
    let start = Utc::now() + Duration::days(2);
    fx.connector.serve(remote_event("g1", "Appointment: Jane Doe", start));

    let mut cancelled = remote_event("g2", "Cancelled visit", start);
    cancelled.cancelled = true;
    fx.connector.serve(cancelled);

    let mut all_day = remote_event("g3", "Vacation", start);
    all_day.all_day = true;
    fx.connector.serve(all_day);

    let mut ours = remote_event("g4", "Prep: someone", start);
    ours.app_origin = true;
    fx.connector.serve(ours);

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.mirrors_created, 1);
    assert_eq!(stats.skipped, 3);

    let mirrors = fx.events.all();
    assert_eq!(mirrors.len(), 1);
    assert!(mirrors[0].is_blocker);
    assert_eq!(mirrors[0].source, EventSource::Calendar);
    assert_eq!(mirrors[0].remote_event_id.as_deref(), Some("g1"));

    // Unchanged remote state: the second tick is a pure no-op locally.
    let writes_before = fx.events.write_count();
    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.mirrors_created, 0);
    assert_eq!(stats.mirrors_updated, 0);
    assert_eq!(fx.events.write_count(), writes_before);
}

#[tokio::test]
async fn pull_updates_mirror_only_on_genuine_diff() {
    let fx = calendar_fixture();
    let start = Utc::now() + Duration::days(2);
    fx.connector.serve(remote_event("g1", "Appointment: Jane Doe", start));
    fx.reconciler.run_tick().await.unwrap();

    fx.connector.remove("g1");
    fx.connector.serve(remote_event("g1", "Appointment: Jane Doe (moved)", start));

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.mirrors_updated, 1);
    assert_eq!(fx.events.all()[0].title, "Appointment: Jane Doe (moved)");
}

#[tokio::test]
async fn drift_cleanup_deletes_orphaned_mirrors_once() {
    let fx = calendar_fixture();
    let start = Utc::now() + Duration::days(2);
    fx.connector.serve(remote_event("g1", "Appointment: Jane Doe", start));
    fx.reconciler.run_tick().await.unwrap();
    assert_eq!(fx.events.all().len(), 1);

    fx.connector.remove("g1");

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.mirrors_deleted, 1);
    assert!(fx.events.all().is_empty());

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.mirrors_deleted, 0);
    assert_eq!(fx.events.delete_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn calendar_tick_stamps_last_sync() {
    let fx = calendar_fixture();
    fx.reconciler.run_tick().await.unwrap();
    assert!(fx.states.snapshot(Provider::Calendar).unwrap().last_sync_at.is_some());
}

struct LeadFixture {
    connector: Arc<MockRecordConnector>,
    tasks: Arc<MockTaskRepository>,
    states: Arc<MockIntegrationStateRepository>,
    dispatcher: Arc<MockDispatcher>,
    reconciler: LeadReconciler,
}

fn lead_fixture(rule: Option<CallbackTriggerRule>) -> LeadFixture {
    let connector = Arc::new(MockRecordConnector::new());
    let tasks = Arc::new(MockTaskRepository::new());
    let states = Arc::new(MockIntegrationStateRepository::new());
    let dispatcher = Arc::new(MockDispatcher::new());

    let mut state = active_state(Provider::Leads);
    state.token_expires_at = None;
    state.config = rule.map(IntegrationConfig::Leads);
    states.seed(state);

    let tokens = token_manager(states.clone());
    let reconciler = LeadReconciler::new(
        connector.clone(),
        tasks.clone(),
        states.clone(),
        tokens,
        dispatcher.clone(),
    );
    LeadFixture { connector, tasks, states, dispatcher, reconciler }
}

fn callback_rule() -> CallbackTriggerRule {
    CallbackTriggerRule {
        enabled: true,
        status_name_match: Some("Callback".into()),
        custom_field: None,
        custom_field_match: None,
    }
}

#[tokio::test]
async fn lead_pull_mirrors_records_without_duplicates() {
    let fx = lead_fixture(None);
    fx.connector.serve(lead_record("42", "Appointment Set"));

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.created, 1);

    let tasks = fx.tasks.all();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].external_id.as_deref(), Some("sr_42"));
    assert_eq!(tasks[0].external_source.as_deref(), Some("leads"));
    assert_eq!(tasks[0].status, TaskStatus::Inbox);

    // Same remote record again: looked up by (external_id, source), no
    // second insert.
    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.created, 0);
    assert_eq!(fx.tasks.all().len(), 1);
    assert_eq!(fx.tasks.insert_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unknown_stage_is_skipped() {
    let fx = lead_fixture(None);
    fx.connector.serve(lead_record("7", "Some Future Stage"));

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.created, 0);
    assert_eq!(stats.skipped, 1);
    assert!(fx.tasks.all().is_empty());
}

#[tokio::test]
async fn terminal_stage_never_creates_a_mirror() {
    let fx = lead_fixture(None);
    fx.connector.serve(lead_record("8", "Not Interested"));

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.created, 0);
    assert!(fx.tasks.all().is_empty());
}

#[tokio::test]
async fn not_modified_leaves_cursor_and_store_untouched() {
    let fx = lead_fixture(None);
    let mut state = active_state(Provider::Leads);
    state.token_expires_at = None;
    state.sync_cursor = Some("etag-1".into());
    fx.states.seed(state);
    fx.connector.not_modified.store(true, Ordering::SeqCst);

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert!(stats.not_modified);
    assert!(fx.tasks.all().is_empty());
    assert_eq!(
        fx.states.snapshot(Provider::Leads).unwrap().sync_cursor.as_deref(),
        Some("etag-1")
    );
}

#[tokio::test]
async fn cursor_advances_after_a_successful_pull() {
    let fx = lead_fixture(None);
    fx.connector.serve(lead_record("42", "New Lead"));
    fx.connector.set_next_cursor("etag-2");

    fx.reconciler.run_tick().await.unwrap();

    let state = fx.states.snapshot(Provider::Leads).unwrap();
    assert_eq!(state.sync_cursor.as_deref(), Some("etag-2"));
    assert!(state.last_sync_at.is_some());

    // The next fetch carries the advanced cursor.
    fx.reconciler.run_tick().await.unwrap();
    let cursors = fx.connector.seen_cursors.lock().unwrap();
    assert_eq!(cursors[1].as_deref(), Some("etag-2"));
}

#[tokio::test]
async fn callback_status_triggers_the_saga_exactly_once() {
    let fx = lead_fixture(Some(callback_rule()));
    fx.connector.serve(lead_record("42", "Callback"));

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.triggered, 1);
    assert_eq!(fx.dispatcher.count(), 1);

    let enqueued = fx.dispatcher.enqueued.lock().unwrap();
    let spec = &enqueued[0];
    assert_eq!(spec.queue, QueueName::Planning);
    assert_eq!(spec.kind, JobKind::CallbackSaga);
    assert_eq!(spec.delay, Some(std::time::Duration::from_millis(600_000)));
    assert_eq!(spec.max_attempts, 4);
    drop(enqueued);

    let task = &fx.tasks.all()[0];
    assert!(task.callback_processed);

    // Re-pulling the same lead while still in Callback must not re-trigger.
    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.triggered, 0);
    assert_eq!(fx.dispatcher.count(), 1);
}

#[tokio::test]
async fn disabled_rule_never_triggers() {
    let mut rule = callback_rule();
    rule.enabled = false;
    let fx = lead_fixture(Some(rule));
    fx.connector.serve(lead_record("42", "Callback"));

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.triggered, 0);
    assert_eq!(fx.dispatcher.count(), 0);
}

#[tokio::test]
async fn custom_field_match_triggers_as_alternative() {
    let rule = CallbackTriggerRule {
        enabled: true,
        status_name_match: None,
        custom_field: Some("disposition".into()),
        custom_field_match: Some("callback requested".into()),
    };
    let fx = lead_fixture(Some(rule));

    let mut record = lead_record("43", "New Lead");
    record
        .custom_fields
        .insert("disposition".into(), "Callback Requested".into());
    fx.connector.serve(record);

    let stats = fx.reconciler.run_tick().await.unwrap();
    assert_eq!(stats.triggered, 1);
}

#[tokio::test]
async fn crm_pull_uses_its_own_prefix() {
    let connector = Arc::new(MockRecordConnector::new());
    let tasks = Arc::new(MockTaskRepository::new());
    let states = Arc::new(MockIntegrationStateRepository::new());

    let mut state = active_state(Provider::Crm);
    state.token_expires_at = None;
    states.seed(state);

    let tokens = token_manager(states.clone());
    let reconciler = RecordReconciler::crm(
        connector.clone(),
        tasks.clone(),
        states.clone(),
        tokens,
    );

    connector.serve(RemoteRecord {
        id: "901".into(),
        title: "Doe residence".into(),
        stage: "Proposal Made".into(),
        ..RemoteRecord::default()
    });

    let stats = reconciler.run_tick().await.unwrap();
    assert_eq!(stats.created, 1);
    assert_eq!(tasks.all()[0].external_id.as_deref(), Some("pd_901"));
    assert_eq!(tasks.all()[0].external_source.as_deref(), Some("crm"));
}
