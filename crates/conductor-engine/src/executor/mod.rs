//! Tool dispatch.
//!
//! Resolution order: approval gate, built-in tools, qualified provider
//! call, unqualified search across visible tools. Every failure the caller
//! can see comes back as a `ToolResult` with `is_error` set; errors never
//! escape this module.

pub mod repair;

use std::sync::Arc;
use std::time::{Duration, Instant};

use rmcp::model::CallToolRequestParams;
use rmcp::service::Peer;
use rmcp::RoleClient;
use serde_json::Value;
use tracing::{debug, info, warn};

use conductor_core::error::is_schema_error;
use conductor_core::{
    split_qualified, ApprovalHandler, BuiltinTools, ProfileToolConfig, ProgressFn,
    ResourceTracker, ResponseProcessor, ServerLogger, ServerStateManager, ToolCall, ToolContent,
    ToolResult,
};

use crate::lifecycle::ServerLifecycleManager;
use crate::registry::ToolManager;

/// Upper bound on a single provider invocation
pub const TOOL_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-call options supplied by the host
#[derive(Clone, Default)]
pub struct ExecuteOptions {
    /// Bypass the approval gate (pre-approved agent flows)
    pub skip_approval: bool,
    /// Session identity forwarded to built-in tools
    pub session_id: Option<String>,
    /// Profile policy; when set it replaces the global provider layer
    pub profile: Option<ProfileToolConfig>,
    pub on_progress: Option<ProgressFn>,
}

/// Where a call name routes, resolved once at the top of dispatch
enum CallTarget<'a> {
    Builtin(&'a str),
    Qualified {
        provider_id: &'a str,
        tool_name: &'a str,
    },
    Unqualified(&'a str),
}

impl<'a> CallTarget<'a> {
    fn resolve(builtins: &dyn BuiltinTools, name: &'a str) -> Self {
        if builtins.is_builtin(name) {
            Self::Builtin(name)
        } else if let Some((provider_id, tool_name)) = split_qualified(name) {
            Self::Qualified {
                provider_id,
                tool_name,
            }
        } else {
            Self::Unqualified(name)
        }
    }

    /// Re-route a built-in name that declined the call
    fn past_builtin(name: &'a str) -> Self {
        match split_qualified(name) {
            Some((provider_id, tool_name)) => Self::Qualified {
                provider_id,
                tool_name,
            },
            None => Self::Unqualified(name),
        }
    }
}

pub struct ToolExecutor {
    lifecycle: Arc<ServerLifecycleManager>,
    registry: Arc<ToolManager>,
    state: Arc<ServerStateManager>,
    logger: Arc<ServerLogger>,
    builtins: Arc<dyn BuiltinTools>,
    approval: Arc<dyn ApprovalHandler>,
    processor: Arc<dyn ResponseProcessor>,
    resources: Arc<ResourceTracker>,
}

impl ToolExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        lifecycle: Arc<ServerLifecycleManager>,
        registry: Arc<ToolManager>,
        state: Arc<ServerStateManager>,
        logger: Arc<ServerLogger>,
        builtins: Arc<dyn BuiltinTools>,
        approval: Arc<dyn ApprovalHandler>,
        processor: Arc<dyn ResponseProcessor>,
        resources: Arc<ResourceTracker>,
    ) -> Self {
        Self {
            lifecycle,
            registry,
            state,
            logger,
            builtins,
            approval,
            processor,
            resources,
        }
    }

    pub async fn execute(&self, call: &ToolCall, opts: &ExecuteOptions) -> ToolResult {
        if self.approval.approval_required() && !opts.skip_approval {
            let preview = serde_json::to_string_pretty(&call.arguments)
                .unwrap_or_else(|_| call.arguments.to_string());
            if !self.approval.request_approval(&call.name, &preview).await {
                info!(tool = %call.name, "tool call denied by user");
                return ToolResult::error(format!(
                    "Tool call '{}' was denied by the user",
                    call.name
                ));
            }
        }

        // Built-ins take precedence over provider tools of the same name
        let target = match CallTarget::resolve(self.builtins.as_ref(), &call.name) {
            CallTarget::Builtin(name) => {
                match self
                    .builtins
                    .execute(name, call.arguments.clone(), opts.session_id.as_deref())
                    .await
                {
                    Ok(Some(result)) => return result,
                    Ok(None) => {
                        debug!(tool = name, "built-in declined, falling through");
                        CallTarget::past_builtin(&call.name)
                    }
                    Err(e) => return ToolResult::error(format!("Tool call failed: {e}")),
                }
            }
            other => other,
        };

        match target {
            CallTarget::Qualified {
                provider_id,
                tool_name,
            } => {
                self.invoke_qualified(provider_id, tool_name, &call.arguments, opts)
                    .await
            }
            _ => self.invoke_unqualified(call, opts).await,
        }
    }

    /// Resolve a bare name against the currently visible tools
    async fn invoke_unqualified(&self, call: &ToolCall, opts: &ExecuteOptions) -> ToolResult {
        let visible = match &opts.profile {
            Some(profile) => self.registry.visible_tools_for_profile(profile),
            None => self.registry.visible_tools(&self.state.runtime_disabled()),
        };

        let matches: Vec<String> = visible
            .iter()
            .filter(|t| t.short_name() == call.name)
            .map(|t| t.name.clone())
            .collect();

        match matches.as_slice() {
            [] => {
                let mut available: Vec<&str> = visible.iter().map(|t| t.name.as_str()).collect();
                available.sort();
                ToolResult::error(format!(
                    "Tool '{}' not found. Available tools: {}",
                    call.name,
                    available.join(", ")
                ))
            }
            [qualified] => match split_qualified(qualified) {
                Some((provider_id, tool_name)) => {
                    self.invoke_qualified(provider_id, tool_name, &call.arguments, opts)
                        .await
                }
                // A visible bare name that is not a built-in cannot be routed
                None => ToolResult::error(format!("Tool '{}' is not invokable", call.name)),
            },
            _ => ToolResult::error(format!(
                "Ambiguous tool name '{}': matches {}. Use the qualified name.",
                call.name,
                matches.join(", ")
            )),
        }
    }

    async fn invoke_qualified(
        &self,
        provider_id: &str,
        tool_name: &str,
        arguments: &Value,
        opts: &ExecuteOptions,
    ) -> ToolResult {
        let provider_visible = match &opts.profile {
            Some(profile) => profile.is_provider_visible(provider_id),
            None => self.state.is_runtime_enabled(provider_id),
        };
        if !provider_visible {
            return ToolResult::error(format!("Provider '{provider_id}' is disabled"));
        }

        let qualified = format!("{provider_id}:{tool_name}");
        let profile_disabled = opts
            .profile
            .as_ref()
            .map(|p| p.disabled_tools.contains(&qualified))
            .unwrap_or(false);
        if self.registry.is_tool_disabled(&qualified) || profile_disabled {
            return ToolResult::error(format!("Tool '{qualified}' is disabled"));
        }

        let Some(connection) = self.lifecycle.connection(provider_id) else {
            return ToolResult::error(format!("Provider '{provider_id}' is not connected"));
        };

        let arguments = match self.registry.tool_schema(&qualified) {
            Some(schema) => repair::coerce_arguments(arguments, &schema),
            None => arguments.clone(),
        };

        let started = Instant::now();
        let peer = connection.peer();
        let outcome = call_with_repair(tool_name, &arguments, |args| {
            let peer = peer.clone();
            async move { self.call_provider(&peer, tool_name, &args).await }
        })
        .await;

        let duration_ms = started.elapsed().as_millis();
        match outcome {
            Ok(result) => {
                self.logger.append(
                    provider_id,
                    format!("tool call {tool_name} completed in {duration_ms}ms"),
                );
                if result.is_error {
                    return result;
                }
                self.finish(provider_id, tool_name, result, opts).await
            }
            Err(message) => {
                self.logger.append(
                    provider_id,
                    format!("tool call {tool_name} failed after {duration_ms}ms: {message}"),
                );
                ToolResult::error(format!("Tool call failed: {message}"))
            }
        }
    }

    async fn call_provider(
        &self,
        peer: &Peer<RoleClient>,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<ToolResult, String> {
        let params = CallToolRequestParams {
            name: tool_name.to_string().into(),
            arguments: arguments.as_object().cloned(),
            task: None,
            meta: None,
        };

        let result = tokio::time::timeout(TOOL_CALL_TIMEOUT, peer.call_tool(params))
            .await
            .map_err(|_| format!("tool call timed out after {TOOL_CALL_TIMEOUT:?}"))?
            .map_err(|e| e.to_string())?;

        // Read the wire shape: text items keep their text, anything else is
        // carried as serialized JSON
        let raw = serde_json::to_value(&result).map_err(|e| e.to_string())?;
        let content = raw
            .get("content")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .map(|item| match item.get("text").and_then(Value::as_str) {
                        Some(text) => ToolContent::text(text),
                        None => ToolContent::text(item.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(ToolResult {
            content,
            is_error: raw
                .get("isError")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Successful results pass through the response pipeline and feed the
    /// resource tracker
    async fn finish(
        &self,
        provider_id: &str,
        tool_name: &str,
        result: ToolResult,
        opts: &ExecuteOptions,
    ) -> ToolResult {
        self.resources
            .record_from_result(provider_id, &result.combined_text());

        let filtered = self
            .processor
            .filter(provider_id, tool_name, result.content)
            .await;
        let processed = self
            .processor
            .process(provider_id, tool_name, filtered, opts.on_progress.clone())
            .await;

        ToolResult {
            content: processed,
            is_error: false,
        }
    }
}

/// Drive one provider call with at most one repaired retry.
///
/// A schema-shaped rejection, thrown or carried in-band as `is_error`,
/// buys a single replay with corrected parameter names; the retry is
/// skipped when repair would resend the same arguments. An in-band error
/// whose retry also fails falls back to the original result.
async fn call_with_repair<C, Fut>(
    tool_name: &str,
    arguments: &Value,
    call: C,
) -> Result<ToolResult, String>
where
    C: Fn(Value) -> Fut,
    Fut: std::future::Future<Output = Result<ToolResult, String>>,
{
    match call(arguments.clone()).await {
        Ok(result) if !result.is_error => Ok(result),
        Ok(result) => {
            let text = result.combined_text();
            if !is_schema_error(&text) {
                return Ok(result);
            }
            let repaired = repair::repair_argument_keys(arguments, &text);
            if &repaired == arguments {
                return Ok(result);
            }
            warn!(tool = tool_name, "retrying with corrected parameter names");
            call(repaired).await.or(Ok(result))
        }
        Err(message) if is_schema_error(&message) => {
            let repaired = repair::repair_argument_keys(arguments, &message);
            if &repaired == arguments {
                return Err(message);
            }
            warn!(tool = tool_name, "retrying with corrected parameter names");
            call(repaired).await
        }
        Err(message) => Err(message),
    }
}
