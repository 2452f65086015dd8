//! Transports for provider connections.
//!
//! The factory turns declarative `TransportConfig` into a concrete
//! transport; each transport performs the MCP handshake with a timeout and
//! returns a live client.

pub mod http;
pub mod resolution;
pub mod stdio;
pub mod websocket;

pub use resolution::resolve_command_path;

use crate::client::{McpClient, ProviderClientHandler};
use async_trait::async_trait;
use conductor_core::{ConductorError, ProviderConfig, ServerLogger, TransportConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Child;
use tokio::task::JoinHandle;
use url::Url;

/// Supplies a bearer token for authenticated network transports
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<String, ConductorError>;
}

/// A live provider connection plus the process resources backing it
pub struct ConnectedProvider {
    pub client: McpClient,
    /// Child process for stdio providers; killed on drop
    pub child: Option<Child>,
    /// Stderr forwarding task for stdio providers
    pub stderr_task: Option<JoinHandle<()>>,
}

impl ConnectedProvider {
    pub fn network(client: McpClient) -> Self {
        Self {
            client,
            child: None,
            stderr_task: None,
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the MCP handshake. Classifies failures into the shared
    /// taxonomy: timeouts, auth rejections, everything else.
    async fn connect(
        &self,
        handler: ProviderClientHandler,
    ) -> Result<ConnectedProvider, ConductorError>;

    fn kind(&self) -> &'static str;

    fn description(&self) -> String;
}

impl std::fmt::Debug for dyn Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("kind", &self.kind())
            .finish()
    }
}

pub struct TransportFactory;

impl TransportFactory {
    /// Build a transport from provider configuration.
    ///
    /// Fails fast on unresolvable commands and malformed URLs so callers
    /// can distinguish configuration problems from connection problems.
    pub fn create(
        provider_id: &str,
        config: &ProviderConfig,
        token_provider: Option<Arc<dyn TokenProvider>>,
        logger: Arc<ServerLogger>,
    ) -> Result<Box<dyn Transport>, ConductorError> {
        let connect_timeout = config.connect_timeout();
        match &config.transport {
            TransportConfig::Stdio { command, args, env } => {
                let command_path = resolve_command_path(command).ok_or_else(|| {
                    ConductorError::TransportCreation {
                        provider_id: provider_id.to_string(),
                        reason: format!(
                            "command not found: {command}. Ensure it's installed and in PATH."
                        ),
                    }
                })?;
                Ok(Box::new(stdio::StdioTransport::new(
                    provider_id.to_string(),
                    command_path,
                    args.clone(),
                    env.clone(),
                    logger,
                    connect_timeout,
                )))
            }
            TransportConfig::Websocket { url } => {
                let url = parse_url(provider_id, url)?;
                Ok(Box::new(websocket::WebsocketTransport::new(
                    provider_id.to_string(),
                    url,
                    token_provider,
                    logger,
                    connect_timeout,
                )))
            }
            TransportConfig::StreamableHttp { url } => {
                let url = parse_url(provider_id, url)?;
                Ok(Box::new(http::StreamableHttpTransport::new(
                    provider_id.to_string(),
                    url,
                    token_provider,
                    logger,
                    connect_timeout,
                )))
            }
        }
    }
}

fn parse_url(provider_id: &str, url: &str) -> Result<Url, ConductorError> {
    Url::parse(url).map_err(|e| ConductorError::TransportCreation {
        provider_id: provider_id.to_string(),
        reason: format!("invalid URL '{url}': {e}"),
    })
}

/// Map a handshake timeout race result into the error taxonomy
pub(crate) fn classify_connect_error(
    provider_id: &str,
    error: impl std::fmt::Display,
) -> ConductorError {
    let message = error.to_string();
    if conductor_core::error::is_auth_error(&message) {
        ConductorError::AuthRequired(provider_id.to_string())
    } else {
        ConductorError::Other(anyhow::anyhow!("MCP handshake failed: {message}"))
    }
}

pub(crate) fn timeout_error(provider_id: &str, timeout: Duration) -> ConductorError {
    ConductorError::ConnectionTimeout {
        provider_id: provider_id.to_string(),
        timeout,
    }
}
