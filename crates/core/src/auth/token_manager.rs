//! Token manager with refresh-on-demand
//!
//! Manages the per-provider token lifecycle over the integration-state row:
//! - `get_valid_token` refreshes transparently inside the 5-minute buffer
//! - refresh failure deactivates the provider and is never auto-retried
//! - `disconnect` revokes best-effort and always clears local material
//!
//! Known race (documented, not prevented): two jobs hitting the refresh
//! window at once both refresh; the state row write is last-writer-wins and
//! both returned tokens are usable.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tempo_domain::{IntegrationState, Provider, Result, TempoError};
use tracing::{debug, info, instrument, warn};

use crate::connector_ports::TokenRefresher;
use crate::store_ports::IntegrationStateRepository;

/// Closed map from provider to its refresher. Providers holding non-expiring
/// API keys (CRM, leads) simply have no entry.
pub type TokenRefreshers = HashMap<Provider, Arc<dyn TokenRefresher>>;

/// Per-provider credential lifecycle.
pub struct TokenManager {
    states: Arc<dyn IntegrationStateRepository>,
    refreshers: TokenRefreshers,
}

impl TokenManager {
    pub fn new(states: Arc<dyn IntegrationStateRepository>, refreshers: TokenRefreshers) -> Self {
        Self { states, refreshers }
    }

    /// Return a usable access token for the provider, refreshing first when
    /// the stored token expires within the buffer.
    ///
    /// # Errors
    /// `Auth` when the integration is missing, inactive, or the refresh
    /// path fails; a failed refresh also flips the row inactive so the
    /// provider is not called again until the user reconnects.
    #[instrument(skip(self))]
    pub async fn get_valid_token(&self, provider: Provider) -> Result<String> {
        let state = self.require_active(provider).await?;

        if !state.needs_refresh(Utc::now()) {
            return state
                .access_token
                .ok_or_else(|| TempoError::Auth(format!("{provider}: no access token stored")));
        }

        self.refresh(provider, &state).await
    }

    /// Disconnect a provider: best-effort remote revocation, then clear all
    /// local token material and the sync cursor, and mark inactive.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, provider: Provider) -> Result<()> {
        if let Some(state) = self.states.get(provider).await? {
            if let (Some(token), Some(refresher)) =
                (state.access_token.as_deref(), self.refreshers.get(&provider))
            {
                if let Err(err) = refresher.revoke(token).await {
                    warn!(%provider, error = %err, "remote token revocation failed; continuing");
                }
            }
        }

        self.states.clear_credentials(provider).await?;
        self.states.set_active(provider, false).await?;
        info!(%provider, "integration disconnected");
        Ok(())
    }

    async fn require_active(&self, provider: Provider) -> Result<IntegrationState> {
        let state = self
            .states
            .get(provider)
            .await?
            .ok_or_else(|| TempoError::Auth(format!("{provider}: integration not connected")))?;

        if !state.is_active {
            return Err(TempoError::Auth(format!(
                "{provider}: integration inactive, reconnect required"
            )));
        }

        Ok(state)
    }

    async fn refresh(&self, provider: Provider, state: &IntegrationState) -> Result<String> {
        debug!(%provider, "access token inside refresh buffer, refreshing");

        let refresh_token = match state.refresh_token.as_deref() {
            Some(token) => token,
            None => {
                self.deactivate(provider).await;
                return Err(TempoError::Auth(format!(
                    "{provider}: token expired and no refresh token available"
                )));
            }
        };

        let refresher = match self.refreshers.get(&provider) {
            Some(refresher) => refresher,
            None => {
                self.deactivate(provider).await;
                return Err(TempoError::Auth(format!(
                    "{provider}: token expired and provider supports no refresh"
                )));
            }
        };

        match refresher.refresh(refresh_token).await {
            Ok(refreshed) => {
                self.states
                    .save_tokens(provider, &refreshed.access_token, Some(refreshed.expires_at))
                    .await?;
                info!(%provider, expires_at = %refreshed.expires_at, "access token refreshed");
                Ok(refreshed.access_token)
            }
            Err(err) => {
                warn!(%provider, error = %err, "token refresh failed, deactivating integration");
                self.deactivate(provider).await;
                Err(TempoError::Auth(format!("{provider}: token refresh failed: {err}")))
            }
        }
    }

    async fn deactivate(&self, provider: Provider) {
        if let Err(err) = self.states.set_active(provider, false).await {
            warn!(%provider, error = %err, "failed to mark integration inactive");
        }
    }
}
