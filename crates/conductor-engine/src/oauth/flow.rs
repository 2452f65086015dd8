//! OAuth 2.1 authorization code flow with PKCE

use super::pkce::{FlowSecrets, CHALLENGE_METHOD};
use super::token::TokenResponse;
use conductor_core::{OAuthSettings, StoredToken};
use std::collections::HashMap;
use tracing::{debug, info};
use url::Url;

/// Authorization request to be opened in a browser
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Full authorization URL to open
    pub authorization_url: String,
    /// State parameter for CSRF protection
    pub state: String,
    /// PKCE verifier (kept secret, used in token exchange)
    pub pkce_verifier: String,
}

/// Stateless flow operations against one provider's OAuth endpoints
pub struct OAuthFlow {
    settings: OAuthSettings,
}

impl OAuthFlow {
    pub fn new(settings: OAuthSettings) -> Self {
        Self { settings }
    }

    pub fn create_authorization_request(&self) -> anyhow::Result<AuthorizationRequest> {
        let secrets = FlowSecrets::mint();

        let mut url = Url::parse(&self.settings.authorization_endpoint)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("response_type", "code");
            query.append_pair("client_id", &self.settings.client_id);
            query.append_pair("redirect_uri", &self.settings.redirect_uri);
            query.append_pair("scope", &self.settings.scopes.join(" "));
            query.append_pair("state", secrets.state());
            query.append_pair("code_challenge", secrets.challenge());
            query.append_pair("code_challenge_method", CHALLENGE_METHOD);
        }

        debug!("created authorization URL: {url}");

        Ok(AuthorizationRequest {
            authorization_url: url.to_string(),
            state: secrets.state().to_string(),
            pkce_verifier: secrets.verifier().to_string(),
        })
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        http_client: &reqwest::Client,
        code: &str,
        pkce_verifier: &str,
    ) -> anyhow::Result<StoredToken> {
        info!("exchanging authorization code for tokens");

        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", &self.settings.redirect_uri);
        params.insert("client_id", &self.settings.client_id);
        params.insert("code_verifier", pkce_verifier);
        if let Some(secret) = &self.settings.client_secret {
            params.insert("client_secret", secret);
        }

        let response = http_client
            .post(&self.settings.token_endpoint)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("token exchange failed: HTTP {status} - {body}");
        }

        let token_response: TokenResponse = response.json().await?;
        info!("token exchange successful");
        Ok(token_response.into())
    }

    /// Refresh an access token
    pub async fn refresh_token(
        &self,
        http_client: &reqwest::Client,
        refresh_token: &str,
    ) -> anyhow::Result<StoredToken> {
        info!("refreshing access token");

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.settings.client_id);
        if let Some(secret) = &self.settings.client_secret {
            params.insert("client_secret", secret);
        }

        let response = http_client
            .post(&self.settings.token_endpoint)
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("token refresh failed: HTTP {status} - {body}");
        }

        let token_response: TokenResponse = response.json().await?;
        info!("token refresh successful");
        Ok(token_response.into())
    }

    /// Best-effort revocation (RFC 7009); no-op without a revocation endpoint
    pub async fn revoke(
        &self,
        http_client: &reqwest::Client,
        token: &str,
    ) -> anyhow::Result<()> {
        let Some(endpoint) = &self.settings.revocation_endpoint else {
            return Ok(());
        };

        let mut params = HashMap::new();
        params.insert("token", token);
        params.insert("client_id", &self.settings.client_id);
        if let Some(secret) = &self.settings.client_secret {
            params.insert("client_secret", secret);
        }

        let response = http_client.post(endpoint).form(&params).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("token revocation failed: HTTP {}", response.status());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> OAuthSettings {
        OAuthSettings {
            authorization_endpoint: "https://example.com/authorize".to_string(),
            token_endpoint: "https://example.com/token".to_string(),
            revocation_endpoint: None,
            client_id: "test_client".to_string(),
            client_secret: None,
            scopes: vec!["openid".to_string(), "profile".to_string()],
            redirect_uri: "http://localhost:8080/callback".to_string(),
        }
    }

    #[test]
    fn test_authorization_request() {
        let flow = OAuthFlow::new(test_settings());
        let request = flow.create_authorization_request().unwrap();

        assert!(request.authorization_url.contains("response_type=code"));
        assert!(request.authorization_url.contains("client_id=test_client"));
        assert!(request.authorization_url.contains("code_challenge="));
        assert!(request
            .authorization_url
            .contains("code_challenge_method=S256"));
        assert!(!request.state.is_empty());
        assert!(!request.pkce_verifier.is_empty());
    }

    #[test]
    fn test_each_request_uses_fresh_state() {
        let flow = OAuthFlow::new(test_settings());
        let a = flow.create_authorization_request().unwrap();
        let b = flow.create_authorization_request().unwrap();
        assert_ne!(a.state, b.state);
        assert_ne!(a.pkce_verifier, b.pkce_verifier);
    }
}
