//! Streamable HTTP transport.
//!
//! Token refresh is handled by the OAuth layer before connecting; the token
//! is injected as a default `Authorization` header on the underlying
//! reqwest client so it rides along on every request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{ConductorError, ServerLogger};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::ServiceExt;
use tracing::info;
use url::Url;

use super::{classify_connect_error, timeout_error, ConnectedProvider, TokenProvider, Transport};
use crate::client::ProviderClientHandler;

pub struct StreamableHttpTransport {
    provider_id: String,
    url: Url,
    token_provider: Option<Arc<dyn TokenProvider>>,
    logger: Arc<ServerLogger>,
    connect_timeout: Duration,
}

impl StreamableHttpTransport {
    pub fn new(
        provider_id: String,
        url: Url,
        token_provider: Option<Arc<dyn TokenProvider>>,
        logger: Arc<ServerLogger>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            provider_id,
            url,
            token_provider,
            logger,
            connect_timeout,
        }
    }

    async fn build_http_client(&self) -> Result<reqwest::Client, ConductorError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token_provider) = &self.token_provider {
            let token = token_provider.bearer_token().await?;
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ConductorError::TransportCreation {
                    provider_id: self.provider_id.clone(),
                    reason: format!("invalid token format: {e}"),
                })?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ConductorError::TransportCreation {
                provider_id: self.provider_id.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn connect(
        &self,
        handler: ProviderClientHandler,
    ) -> Result<ConnectedProvider, ConductorError> {
        info!(provider = %self.provider_id, url = %self.url, "connecting to HTTP provider");
        self.logger
            .append(&self.provider_id, format!("connecting to {}", self.url));

        let http_client = self.build_http_client().await?;
        let transport_config = StreamableHttpClientTransportConfig::with_uri(self.url.as_str());
        let transport = StreamableHttpClientTransport::with_client(http_client, transport_config);

        let connect_future = handler.serve(transport);
        let client = match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                let err = classify_connect_error(&self.provider_id, format!("{e:#}"));
                self.logger.append(&self.provider_id, err.to_string());
                return Err(err);
            }
            Err(_) => {
                let err = timeout_error(&self.provider_id, self.connect_timeout);
                self.logger.append(&self.provider_id, err.to_string());
                return Err(err);
            }
        };

        self.logger.append(&self.provider_id, "provider connected");
        Ok(ConnectedProvider::network(client))
    }

    fn kind(&self) -> &'static str {
        "streamable-http"
    }

    fn description(&self) -> String {
        format!("streamable-http:{}", self.url)
    }
}
