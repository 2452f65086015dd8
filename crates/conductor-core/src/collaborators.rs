//! Traits for host-supplied behavior.
//!
//! The engine never implements these itself; the embedding application
//! provides them and the engine calls through the trait objects.

use crate::domain::{Tool, ToolContent, ToolResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Progress callback invoked with human-readable status lines during a
/// long-running tool call
pub type ProgressFn = Arc<dyn Fn(String) + Send + Sync>;

/// Host-side built-in tools, dispatched before any provider lookup.
///
/// `execute` returning `Ok(None)` means "recognized name but not handled
/// here"; the executor falls through to provider resolution.
#[async_trait]
pub trait BuiltinTools: Send + Sync {
    fn is_builtin(&self, name: &str) -> bool;

    /// Built-in tool descriptors, merged into visibility listings
    fn tools(&self) -> Vec<Tool>;

    async fn execute(
        &self,
        name: &str,
        arguments: Value,
        session_id: Option<&str>,
    ) -> anyhow::Result<Option<ToolResult>>;
}

/// Pre-invocation confirmation gate
#[async_trait]
pub trait ApprovalHandler: Send + Sync {
    /// Present the call for confirmation; `false` denies it
    async fn request_approval(&self, tool_name: &str, arguments_preview: &str) -> bool;

    /// Whether approval prompts apply at all
    fn approval_required(&self) -> bool {
        true
    }
}

/// Post-invocation content pipeline
#[async_trait]
pub trait ResponseProcessor: Send + Sync {
    /// Drop or redact content items before further processing
    async fn filter(
        &self,
        provider_id: &str,
        tool_name: &str,
        content: Vec<ToolContent>,
    ) -> Vec<ToolContent>;

    /// Transform the surviving content, optionally reporting progress
    async fn process(
        &self,
        provider_id: &str,
        tool_name: &str,
        content: Vec<ToolContent>,
        on_progress: Option<ProgressFn>,
    ) -> Vec<ToolContent>;
}

/// How a provider wants user input collected
#[derive(Debug, Clone)]
pub enum ElicitationMode {
    /// Inline form described by a JSON Schema
    Form { requested_schema: Value },
    /// External browser-based flow
    Url { url: String },
}

#[derive(Debug, Clone)]
pub struct ElicitationRequest {
    pub message: String,
    pub mode: ElicitationMode,
}

#[derive(Debug, Clone)]
pub enum ElicitationOutcome {
    Accept { content: Value },
    Decline,
    Cancel,
}

/// Brokers provider-initiated user-input requests to the host UI
#[async_trait]
pub trait ElicitationHandler: Send + Sync {
    async fn elicit(
        &self,
        provider_id: &str,
        request: ElicitationRequest,
    ) -> anyhow::Result<ElicitationOutcome>;
}

#[derive(Debug, Clone)]
pub struct SamplingMessage {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct SamplingRequest {
    pub system_prompt: Option<String>,
    pub messages: Vec<SamplingMessage>,
    pub max_tokens: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SamplingReply {
    pub model: String,
    pub text: String,
}

/// Brokers provider-initiated LLM completion requests to the host
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    async fn complete(
        &self,
        provider_id: &str,
        request: SamplingRequest,
    ) -> anyhow::Result<SamplingReply>;
}

/// No built-in tools
pub struct NoBuiltinTools;

#[async_trait]
impl BuiltinTools for NoBuiltinTools {
    fn is_builtin(&self, _name: &str) -> bool {
        false
    }

    fn tools(&self) -> Vec<Tool> {
        Vec::new()
    }

    async fn execute(
        &self,
        _name: &str,
        _arguments: Value,
        _session_id: Option<&str>,
    ) -> anyhow::Result<Option<ToolResult>> {
        Ok(None)
    }
}

/// Approves every call without prompting
pub struct AutoApprove;

#[async_trait]
impl ApprovalHandler for AutoApprove {
    async fn request_approval(&self, _tool_name: &str, _arguments_preview: &str) -> bool {
        true
    }

    fn approval_required(&self) -> bool {
        false
    }
}

/// Identity response pipeline
pub struct PassthroughResponses;

#[async_trait]
impl ResponseProcessor for PassthroughResponses {
    async fn filter(
        &self,
        _provider_id: &str,
        _tool_name: &str,
        content: Vec<ToolContent>,
    ) -> Vec<ToolContent> {
        content
    }

    async fn process(
        &self,
        _provider_id: &str,
        _tool_name: &str,
        content: Vec<ToolContent>,
        _on_progress: Option<ProgressFn>,
    ) -> Vec<ToolContent> {
        content
    }
}
