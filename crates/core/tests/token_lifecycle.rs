//! Token manager lifecycle tests
//!
//! Covers the refresh-buffer boundary, the deactivate-on-failure path, and
//! disconnect semantics, all over in-memory state.

mod support;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tempo_domain::{Provider, TempoError};

use support::connectors::MockTokenRefresher;
use support::repositories::MockIntegrationStateRepository;
use support::{active_state, token_manager, token_manager_with_refresher};

#[tokio::test]
async fn valid_token_is_returned_without_refresh() {
    let states = Arc::new(MockIntegrationStateRepository::new());
    let refresher = Arc::new(MockTokenRefresher::new());

    let mut state = active_state(Provider::Calendar);
    state.token_expires_at = Some(Utc::now() + Duration::minutes(10));
    states.seed(state);

    let tokens =
        token_manager_with_refresher(Arc::clone(&states), Provider::Calendar, refresher.clone());
    let token = tokens.get_valid_token(Provider::Calendar).await.unwrap();

    assert_eq!(token, "calendar-token");
    assert_eq!(refresher.refresh_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn token_inside_buffer_is_refreshed_and_persisted() {
    let states = Arc::new(MockIntegrationStateRepository::new());
    let refresher = Arc::new(MockTokenRefresher::new());

    let mut state = active_state(Provider::Calendar);
    state.token_expires_at = Some(Utc::now() + Duration::minutes(4));
    states.seed(state);

    let tokens =
        token_manager_with_refresher(Arc::clone(&states), Provider::Calendar, refresher.clone());
    let token = tokens.get_valid_token(Provider::Calendar).await.unwrap();

    assert_eq!(token, "refreshed-token");
    assert_eq!(refresher.refresh_calls.load(Ordering::SeqCst), 1);

    let stored = states.snapshot(Provider::Calendar).unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("refreshed-token"));
    assert!(stored.token_expires_at.unwrap() > Utc::now() + Duration::minutes(30));
    assert!(stored.is_active);
}

#[tokio::test]
async fn non_expiring_api_key_never_refreshes() {
    let states = Arc::new(MockIntegrationStateRepository::new());

    let mut state = active_state(Provider::Leads);
    state.token_expires_at = None;
    state.refresh_token = None;
    states.seed(state);

    // No refresher registered for the provider at all.
    let tokens = token_manager(Arc::clone(&states));
    let token = tokens.get_valid_token(Provider::Leads).await.unwrap();

    assert_eq!(token, "leads-token");
}

#[tokio::test]
async fn failed_refresh_deactivates_the_integration() {
    let states = Arc::new(MockIntegrationStateRepository::new());
    let refresher = Arc::new(MockTokenRefresher::failing());

    let mut state = active_state(Provider::Calendar);
    state.token_expires_at = Some(Utc::now() - Duration::minutes(1));
    states.seed(state);

    let tokens =
        token_manager_with_refresher(Arc::clone(&states), Provider::Calendar, refresher.clone());
    let err = tokens.get_valid_token(Provider::Calendar).await.unwrap_err();

    assert!(matches!(err, TempoError::Auth(_)));
    assert!(!states.snapshot(Provider::Calendar).unwrap().is_active);

    // The inactive row short-circuits; the refresher is not called again.
    let err = tokens.get_valid_token(Provider::Calendar).await.unwrap_err();
    assert!(matches!(err, TempoError::Auth(_)));
    assert_eq!(refresher.refresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn expired_token_without_refresh_token_deactivates() {
    let states = Arc::new(MockIntegrationStateRepository::new());
    let refresher = Arc::new(MockTokenRefresher::new());

    let mut state = active_state(Provider::Calendar);
    state.refresh_token = None;
    state.token_expires_at = Some(Utc::now() - Duration::minutes(1));
    states.seed(state);

    let tokens =
        token_manager_with_refresher(Arc::clone(&states), Provider::Calendar, refresher.clone());
    let err = tokens.get_valid_token(Provider::Calendar).await.unwrap_err();

    assert!(matches!(err, TempoError::Auth(_)));
    assert_eq!(refresher.refresh_calls.load(Ordering::SeqCst), 0);
    assert!(!states.snapshot(Provider::Calendar).unwrap().is_active);
}

#[tokio::test]
async fn unconnected_provider_is_an_auth_error() {
    let states = Arc::new(MockIntegrationStateRepository::new());
    let tokens = token_manager(states);

    let err = tokens.get_valid_token(Provider::Crm).await.unwrap_err();
    assert!(matches!(err, TempoError::Auth(_)));
}

#[tokio::test]
async fn disconnect_revokes_clears_and_deactivates() {
    let states = Arc::new(MockIntegrationStateRepository::new());
    let refresher = Arc::new(MockTokenRefresher::new());

    let mut state = active_state(Provider::Calendar);
    state.sync_cursor = Some("cursor-1".into());
    states.seed(state);

    let tokens =
        token_manager_with_refresher(Arc::clone(&states), Provider::Calendar, refresher.clone());
    tokens.disconnect(Provider::Calendar).await.unwrap();

    assert_eq!(refresher.revoke_calls.load(Ordering::SeqCst), 1);
    let stored = states.snapshot(Provider::Calendar).unwrap();
    assert!(stored.access_token.is_none());
    assert!(stored.refresh_token.is_none());
    assert!(stored.sync_cursor.is_none());
    assert!(!stored.is_active);
}
