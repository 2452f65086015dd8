//! MCP client handler for provider connections.
//!
//! Brokers provider-initiated requests (elicitation, sampling) to the
//! host-supplied collaborator traits and forwards server log notifications
//! into the per-provider log buffer.

use std::sync::Arc;

use conductor_core::{
    ElicitationHandler, ElicitationMode, ElicitationOutcome, ElicitationRequest, SamplingHandler,
    SamplingMessage, SamplingRequest, ServerLogger,
};
use rmcp::model::{
    ClientCapabilities, ClientInfo, CreateElicitationRequestParams, CreateElicitationResult,
    CreateMessageRequestMethod, CreateMessageRequestParams, CreateMessageResult,
    ErrorData as McpError, Implementation,
};
use rmcp::service::{NotificationContext, RequestContext, RunningService};
use rmcp::RoleClient;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Type alias for the MCP client service
pub type McpClient = RunningService<RoleClient, ProviderClientHandler>;

/// Client handler registered on every provider connection
#[derive(Clone)]
pub struct ProviderClientHandler {
    info: ClientInfo,
    provider_id: String,
    logger: Arc<ServerLogger>,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    sampling: Option<Arc<dyn SamplingHandler>>,
}

impl std::fmt::Debug for ProviderClientHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClientHandler")
            .field("provider_id", &self.provider_id)
            .field("elicitation", &self.elicitation.is_some())
            .field("sampling", &self.sampling.is_some())
            .finish()
    }
}

impl ProviderClientHandler {
    pub fn new(
        provider_id: &str,
        logger: Arc<ServerLogger>,
        elicitation: Option<Arc<dyn ElicitationHandler>>,
        sampling: Option<Arc<dyn SamplingHandler>>,
    ) -> Self {
        Self {
            info: ClientInfo {
                protocol_version: Default::default(),
                capabilities: ClientCapabilities::default(),
                client_info: Implementation {
                    name: format!("conductor-{provider_id}"),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    title: Some("Conductor".to_string()),
                    ..Default::default()
                },
                meta: None,
            },
            provider_id: provider_id.to_string(),
            logger,
            elicitation,
            sampling,
        }
    }
}

fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

impl rmcp::ClientHandler for ProviderClientHandler {
    fn get_info(&self) -> ClientInfo {
        self.info.clone()
    }

    fn create_elicitation(
        &self,
        request: CreateElicitationRequestParams,
        _context: RequestContext<RoleClient>,
    ) -> impl std::future::Future<Output = Result<CreateElicitationResult, McpError>> + Send + '_
    {
        let handler = self.elicitation.clone();
        let provider_id = self.provider_id.clone();
        async move {
            let decline = || {
                serde_json::from_value::<CreateElicitationResult>(json!({"action": "decline"}))
                    .map_err(|e| internal_error(format!("failed to build result: {e}")))
            };

            let Some(handler) = handler else {
                debug!(provider = %provider_id, "no elicitation handler, declining");
                return decline();
            };

            // Read the wire shape instead of destructuring the params struct
            let raw = serde_json::to_value(&request)
                .map_err(|e| internal_error(format!("failed to serialize request: {e}")))?;
            let message = raw
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let mode = match raw.get("url").and_then(Value::as_str) {
                Some(url) => ElicitationMode::Url {
                    url: url.to_string(),
                },
                None => ElicitationMode::Form {
                    requested_schema: raw.get("requestedSchema").cloned().unwrap_or(Value::Null),
                },
            };

            match handler
                .elicit(&provider_id, ElicitationRequest { message, mode })
                .await
            {
                Ok(ElicitationOutcome::Accept { content }) => {
                    serde_json::from_value(json!({"action": "accept", "content": content}))
                        .map_err(|e| internal_error(format!("failed to build result: {e}")))
                }
                Ok(ElicitationOutcome::Decline) => decline(),
                Ok(ElicitationOutcome::Cancel) => {
                    serde_json::from_value(json!({"action": "cancel"}))
                        .map_err(|e| internal_error(format!("failed to build result: {e}")))
                }
                Err(e) => Err(internal_error(format!("elicitation failed: {e}"))),
            }
        }
    }

    fn create_message(
        &self,
        params: CreateMessageRequestParams,
        _context: RequestContext<RoleClient>,
    ) -> impl std::future::Future<Output = Result<CreateMessageResult, McpError>> + Send + '_ {
        let handler = self.sampling.clone();
        let provider_id = self.provider_id.clone();
        async move {
            let Some(handler) = handler else {
                return Err(McpError::method_not_found::<CreateMessageRequestMethod>());
            };

            let raw = serde_json::to_value(&params)
                .map_err(|e| internal_error(format!("failed to serialize request: {e}")))?;
            let messages = raw
                .get("messages")
                .and_then(Value::as_array)
                .map(|messages| {
                    messages
                        .iter()
                        .filter_map(|m| {
                            let role = m.get("role")?.as_str()?.to_string();
                            let text = m
                                .get("content")
                                .and_then(|c| c.get("text"))
                                .and_then(Value::as_str)
                                .unwrap_or_default()
                                .to_string();
                            Some(SamplingMessage { role, text })
                        })
                        .collect()
                })
                .unwrap_or_default();
            let sampling_request = SamplingRequest {
                system_prompt: raw
                    .get("systemPrompt")
                    .and_then(Value::as_str)
                    .map(String::from),
                messages,
                max_tokens: raw.get("maxTokens").and_then(Value::as_u64),
            };

            let reply = handler
                .complete(&provider_id, sampling_request)
                .await
                .map_err(|e| internal_error(format!("sampling failed: {e}")))?;

            serde_json::from_value(json!({
                "model": reply.model,
                "role": "assistant",
                "content": {"type": "text", "text": reply.text},
            }))
            .map_err(|e| internal_error(format!("failed to build result: {e}")))
        }
    }

    fn on_logging_message(
        &self,
        params: rmcp::model::LoggingMessageNotificationParam,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let provider_id = self.provider_id.clone();
        let logger = Arc::clone(&self.logger);
        async move {
            let message = match &params.data {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            logger.append(&provider_id, format!("[{:?}] {message}", params.level));
        }
    }

    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        let provider_id = self.provider_id.clone();
        let logger = Arc::clone(&self.logger);
        async move {
            info!(provider = %provider_id, "provider reported tools/list_changed");
            logger.append(&provider_id, "tool list changed notification");
        }
    }
}
