//! OAuth 2.1 with PKCE for authenticated providers.
//!
//! The manager owns pending browser flows and token persistence; the flow
//! module does the wire work against the provider's endpoints.

mod flow;
mod pkce;
mod token;

pub use flow::{AuthorizationRequest, OAuthFlow};
pub use token::TokenResponse;

use crate::transport::TokenProvider;
use async_trait::async_trait;
use conductor_core::{ConductorError, OAuthSettings, StoredToken, TokenStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Pending flows older than this are discarded
const FLOW_TTL: Duration = Duration::from_secs(10 * 60);

struct PendingFlow {
    state: String,
    pkce_verifier: String,
    started_at: Instant,
}

/// Outcome of an authorization callback
#[derive(Debug, Clone)]
pub struct OAuthCompletion {
    pub success: bool,
    pub error: Option<String>,
}

impl OAuthCompletion {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Coordinates token lifetime and browser authorization flows, keyed by
/// provider id
pub struct OAuthManager {
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenStore>,
    flows: Mutex<HashMap<String, PendingFlow>>,
}

impl OAuthManager {
    pub fn new(tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            tokens,
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// Return a usable access token, refreshing if expired.
    ///
    /// `AuthRequired` means an interactive flow is needed: no stored token,
    /// no refresh token, or the refresh was rejected.
    pub async fn get_valid_token(
        &self,
        provider_id: &str,
        settings: &OAuthSettings,
    ) -> Result<String, ConductorError> {
        let stored = self
            .tokens
            .get_token(provider_id)
            .ok_or_else(|| ConductorError::AuthRequired(provider_id.to_string()))?;

        if !stored.is_expired() {
            return Ok(stored.access_token);
        }

        let Some(refresh_token) = stored.refresh_token.clone() else {
            return Err(ConductorError::AuthRequired(provider_id.to_string()));
        };

        let flow = OAuthFlow::new(settings.clone());
        let mut fresh = match flow.refresh_token(&self.http_client, &refresh_token).await {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(provider = provider_id, "token refresh failed: {e}");
                return Err(ConductorError::AuthRequired(provider_id.to_string()));
            }
        };
        // Some servers omit the refresh token on refresh; keep the old one
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }
        self.tokens.save_token(provider_id, &fresh)?;
        Ok(fresh.access_token)
    }

    /// Refresh immediately, ignoring the stored expiry.
    ///
    /// Used after a provider rejects a token that still looked valid
    /// locally (clock skew, server-side revocation).
    pub async fn force_refresh(
        &self,
        provider_id: &str,
        settings: &OAuthSettings,
    ) -> Result<String, ConductorError> {
        let stored = self
            .tokens
            .get_token(provider_id)
            .ok_or_else(|| ConductorError::AuthRequired(provider_id.to_string()))?;
        let Some(refresh_token) = stored.refresh_token.clone() else {
            return Err(ConductorError::AuthRequired(provider_id.to_string()));
        };

        let flow = OAuthFlow::new(settings.clone());
        let mut fresh = flow
            .refresh_token(&self.http_client, &refresh_token)
            .await
            .map_err(|e| {
                warn!(provider = provider_id, "forced refresh failed: {e}");
                ConductorError::AuthRequired(provider_id.to_string())
            })?;
        if fresh.refresh_token.is_none() {
            fresh.refresh_token = Some(refresh_token);
        }
        self.tokens.save_token(provider_id, &fresh)?;
        Ok(fresh.access_token)
    }

    pub fn has_token(&self, provider_id: &str) -> bool {
        self.tokens.get_token(provider_id).is_some()
    }

    /// Start a browser authorization flow.
    ///
    /// The returned URL is opened by the host; the state parameter routes
    /// the callback back to this provider.
    pub fn initiate_oauth_flow(
        &self,
        provider_id: &str,
        settings: &OAuthSettings,
    ) -> anyhow::Result<AuthorizationRequest> {
        let request = OAuthFlow::new(settings.clone()).create_authorization_request()?;

        let mut flows = self.flows.lock();
        flows.retain(|_, flow| flow.started_at.elapsed() < FLOW_TTL);
        flows.insert(
            provider_id.to_string(),
            PendingFlow {
                state: request.state.clone(),
                pkce_verifier: request.pkce_verifier.clone(),
                started_at: Instant::now(),
            },
        );

        info!(provider = provider_id, "authorization flow started");
        Ok(request)
    }

    /// Look up which provider a callback state belongs to
    pub fn find_provider_by_state(&self, state: &str) -> Option<String> {
        self.flows
            .lock()
            .iter()
            .find(|(_, flow)| flow.state == state)
            .map(|(provider_id, _)| provider_id.clone())
    }

    /// Complete a pending flow with the callback code.
    ///
    /// The state must match the pending flow; a mismatch leaves the flow in
    /// place and reports failure.
    pub async fn complete_oauth_flow(
        &self,
        provider_id: &str,
        code: &str,
        state: &str,
        settings: &OAuthSettings,
    ) -> OAuthCompletion {
        let pkce_verifier = {
            let flows = self.flows.lock();
            let Some(pending) = flows.get(provider_id) else {
                return OAuthCompletion::failed("no pending authorization flow");
            };
            if pending.state != state {
                warn!(provider = provider_id, "state mismatch on OAuth callback");
                return OAuthCompletion::failed("state parameter mismatch");
            }
            pending.pkce_verifier.clone()
        };

        let flow = OAuthFlow::new(settings.clone());
        match flow
            .exchange_code(&self.http_client, code, &pkce_verifier)
            .await
        {
            Ok(token) => {
                if let Err(e) = self.tokens.save_token(provider_id, &token) {
                    return OAuthCompletion::failed(format!("failed to persist token: {e}"));
                }
                self.flows.lock().remove(provider_id);
                info!(provider = provider_id, "authorization flow completed");
                OAuthCompletion::ok()
            }
            Err(e) => OAuthCompletion::failed(format!("code exchange failed: {e}")),
        }
    }

    /// Revoke and forget the provider's tokens
    pub async fn revoke_tokens(
        &self,
        provider_id: &str,
        settings: &OAuthSettings,
    ) -> anyhow::Result<()> {
        if let Some(token) = self.tokens.get_token(provider_id) {
            let flow = OAuthFlow::new(settings.clone());
            if let Err(e) = flow.revoke(&self.http_client, &token.access_token).await {
                // Local deletion still proceeds
                warn!(provider = provider_id, "remote revocation failed: {e}");
            }
        }
        self.tokens.delete_token(provider_id)
    }
}

/// Adapts the manager to the transport-layer token interface for one
/// provider
pub struct ProviderTokenSource {
    pub oauth: Arc<OAuthManager>,
    pub provider_id: String,
    pub settings: OAuthSettings,
}

#[async_trait]
impl TokenProvider for ProviderTokenSource {
    async fn bearer_token(&self) -> Result<String, ConductorError> {
        self.oauth
            .get_valid_token(&self.provider_id, &self.settings)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::MemoryTokenStore;

    fn settings() -> OAuthSettings {
        OAuthSettings {
            authorization_endpoint: "https://example.com/authorize".to_string(),
            token_endpoint: "https://example.com/token".to_string(),
            revocation_endpoint: None,
            client_id: "client".to_string(),
            client_secret: None,
            scopes: vec![],
            redirect_uri: "http://localhost:9999/callback".to_string(),
        }
    }

    fn manager() -> OAuthManager {
        OAuthManager::new(Arc::new(MemoryTokenStore::new()))
    }

    #[tokio::test]
    async fn test_no_token_requires_auth() {
        let err = manager()
            .get_valid_token("github", &settings())
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::AuthRequired(_)));
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_refresh() {
        let store = Arc::new(MemoryTokenStore::new());
        store
            .save_token(
                "github",
                &StoredToken {
                    access_token: "abc".to_string(),
                    refresh_token: None,
                    expires_at: None,
                    token_type: "Bearer".to_string(),
                    scope: None,
                },
            )
            .unwrap();
        let manager = OAuthManager::new(store);
        let token = manager.get_valid_token("github", &settings()).await.unwrap();
        assert_eq!(token, "abc");
    }

    #[test]
    fn test_flow_state_routing() {
        let manager = manager();
        let request = manager.initiate_oauth_flow("github", &settings()).unwrap();

        assert_eq!(
            manager.find_provider_by_state(&request.state),
            Some("github".to_string())
        );
        assert_eq!(manager.find_provider_by_state("bogus"), None);
    }

    #[tokio::test]
    async fn test_state_mismatch_rejected() {
        let manager = manager();
        manager.initiate_oauth_flow("github", &settings()).unwrap();

        let completion = manager
            .complete_oauth_flow("github", "code123", "wrong-state", &settings())
            .await;
        assert!(!completion.success);
        assert!(completion.error.unwrap().contains("state"));
    }

    #[tokio::test]
    async fn test_completion_without_pending_flow() {
        let completion = manager()
            .complete_oauth_flow("github", "code123", "state", &settings())
            .await;
        assert!(!completion.success);
    }
}
