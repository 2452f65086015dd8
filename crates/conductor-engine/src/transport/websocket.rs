//! Websocket transport.
//!
//! rmcp has no built-in websocket client, so the tungstenite socket is
//! split into a sink/stream pair carrying JSON-RPC messages as text frames
//! and handed to rmcp's sink-and-stream transport adapter.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use conductor_core::{ConductorError, ServerLogger};
use futures::{SinkExt, StreamExt};
use rmcp::model::{ClientJsonRpcMessage, ServerJsonRpcMessage};
use rmcp::ServiceExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{info, warn};
use url::Url;

use super::{timeout_error, ConnectedProvider, TokenProvider, Transport};
use crate::client::ProviderClientHandler;

#[derive(Debug, thiserror::Error)]
enum WsError {
    #[error(transparent)]
    Socket(#[from] tungstenite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub struct WebsocketTransport {
    provider_id: String,
    url: Url,
    token_provider: Option<Arc<dyn TokenProvider>>,
    logger: Arc<ServerLogger>,
    connect_timeout: Duration,
}

impl WebsocketTransport {
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
}

#[async_trait]
impl Transport for WebsocketTransport {
    async fn connect(
        &self,
        handler: ProviderClientHandler,
    ) -> Result<ConnectedProvider, ConductorError> {
        info!(provider = %self.provider_id, url = %self.url, "connecting to websocket provider");
        self.logger
            .append(&self.provider_id, format!("connecting to {}", self.url));

        let mut request = self.url.as_str().into_client_request().map_err(|e| {
            ConductorError::TransportCreation {
                provider_id: self.provider_id.clone(),
                reason: format!("invalid websocket request: {e}"),
            }
        })?;

        if let Some(token_provider) = &self.token_provider {
            let token = token_provider.bearer_token().await?;
            let value = format!("Bearer {token}").parse().map_err(|e| {
                ConductorError::TransportCreation {
                    provider_id: self.provider_id.clone(),
                    reason: format!("invalid token format: {e}"),
                }
            })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let handshake = tokio::time::timeout(self.connect_timeout, connect_async(request));
        let (socket, _response) = match handshake.await {
            Ok(Ok(connected)) => connected,
            Ok(Err(tungstenite::Error::Http(response)))
                if response.status() == tungstenite::http::StatusCode::UNAUTHORIZED =>
            {
                self.logger
                    .append(&self.provider_id, "websocket rejected: 401 unauthorized");
                return Err(ConductorError::AuthRequired(self.provider_id.clone()));
            }
            Ok(Err(e)) => {
                let err = ConductorError::Other(anyhow::anyhow!(
                    "websocket connection failed: {e}"
                ));
                self.logger.append(&self.provider_id, err.to_string());
                return Err(err);
            }
            Err(_) => {
                let err = timeout_error(&self.provider_id, self.connect_timeout);
                self.logger.append(&self.provider_id, err.to_string());
                return Err(err);
            }
        };

        let (sink, stream) = socket.split();

        let sink = Box::pin(sink.with(|message: ClientJsonRpcMessage| async move {
            let text = serde_json::to_string(&message)?;
            Ok::<Message, WsError>(Message::Text(text))
        }));

        let provider_id = self.provider_id.clone();
        let stream = Box::pin(stream.filter_map(move |frame| {
            let provider_id = provider_id.clone();
            async move {
                let parsed: Option<ServerJsonRpcMessage> = match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str(&text) {
                        Ok(message) => Some(message),
                        Err(e) => {
                            warn!(provider = %provider_id, "dropping unparseable frame: {e}");
                            None
                        }
                    },
                    Ok(Message::Binary(bytes)) => serde_json::from_slice(&bytes).ok(),
                    // Control frames are handled by tungstenite itself
                    Ok(_) => None,
                    Err(e) => {
                        warn!(provider = %provider_id, "websocket read error: {e}");
                        None
                    }
                };
                parsed
            }
        }));

        let connect_future = handler.serve((sink, stream));
        let client = match tokio::time::timeout(self.connect_timeout, connect_future).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                let err = super::classify_connect_error(&self.provider_id, e);
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
        "websocket"
    }

    fn description(&self) -> String {
        format!("websocket:{}", self.url)
    }
}
