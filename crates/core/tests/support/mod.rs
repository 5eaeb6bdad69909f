//! Shared in-memory mocks for engine tests
//!
//! Deterministic, no database or network. Call counters let tests assert
//! idempotency properties (exactly one create, zero writes on a no-op run).
#![allow(dead_code)]

pub mod connectors;
pub mod repositories;

use std::collections::HashMap;
use std::sync::{Arc, Once};

use chrono::{Duration, Utc};
use tempo_core::{TokenManager, TokenRefresher, TokenRefreshers};
use tempo_domain::{IntegrationState, Provider};

use self::repositories::MockIntegrationStateRepository;

/// Route engine tracing output through the test harness once per binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// An active integration state with a token valid for one hour.
pub fn active_state(provider: Provider) -> IntegrationState {
    IntegrationState {
        provider,
        access_token: Some(format!("{provider}-token")),
        refresh_token: Some(format!("{provider}-refresh")),
        token_expires_at: Some(Utc::now() + Duration::hours(1)),
        sync_cursor: None,
        config: None,
        is_active: true,
        last_sync_at: None,
    }
}

/// Token manager over the given state repo with no refreshers registered.
pub fn token_manager(states: Arc<MockIntegrationStateRepository>) -> Arc<TokenManager> {
    init_tracing();
    Arc::new(TokenManager::new(states, TokenRefreshers::new()))
}

/// Token manager with a single provider refresher.
pub fn token_manager_with_refresher(
    states: Arc<MockIntegrationStateRepository>,
    provider: Provider,
    refresher: Arc<dyn TokenRefresher>,
) -> Arc<TokenManager> {
    init_tracing();
    let mut refreshers: TokenRefreshers = HashMap::new();
    refreshers.insert(provider, refresher);
    Arc::new(TokenManager::new(states, refreshers))
}
