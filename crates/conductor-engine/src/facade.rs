//! Top-level assembler.
//!
//! `Conductor` owns every component and is the only type a host needs to
//! hold. All wiring is explicit dependency injection through the builder;
//! nothing here reaches for globals.

use std::sync::Arc;

use parking_lot::Mutex;

use conductor_core::{
    ApprovalHandler, AutoApprove, BuiltinTools, ConductorError, ConfigStore, ElicitationHandler,
    InitializationProgress, LogEntry, MemoryConfigStore, MemoryTokenStore, NoBuiltinTools,
    PassthroughResponses, ProfileToolConfig, ResourceTracker, ResponseProcessor, SamplingHandler,
    ServerLogger, ServerStateManager, Tool, TokenStore, ToolCall, ToolResult, TrackedResource,
};
use tracing::info;

use crate::executor::{ExecuteOptions, ToolExecutor};
use crate::lifecycle::{InitializationSummary, ServerLifecycleManager};
use crate::oauth::{AuthorizationRequest, OAuthCompletion, OAuthManager};
use crate::registry::ToolManager;

/// One row of the management-surface tool listing
#[derive(Debug, Clone)]
pub struct ToolListing {
    pub tool: Tool,
    pub enabled: bool,
    pub provider_connected: bool,
}

pub struct ConductorBuilder {
    config_store: Arc<dyn ConfigStore>,
    token_store: Arc<dyn TokenStore>,
    builtins: Arc<dyn BuiltinTools>,
    approval: Arc<dyn ApprovalHandler>,
    processor: Arc<dyn ResponseProcessor>,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    sampling: Option<Arc<dyn SamplingHandler>>,
}

impl Default for ConductorBuilder {
    fn default() -> Self {
        Self {
            config_store: Arc::new(MemoryConfigStore::default()),
            token_store: Arc::new(MemoryTokenStore::new()),
            builtins: Arc::new(NoBuiltinTools),
            approval: Arc::new(AutoApprove),
            processor: Arc::new(PassthroughResponses),
            elicitation: None,
            sampling: None,
        }
    }
}

impl ConductorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config_store(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = store;
        self
    }

    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = store;
        self
    }

    pub fn builtin_tools(mut self, builtins: Arc<dyn BuiltinTools>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn approval_handler(mut self, approval: Arc<dyn ApprovalHandler>) -> Self {
        self.approval = approval;
        self
    }

    pub fn response_processor(mut self, processor: Arc<dyn ResponseProcessor>) -> Self {
        self.processor = processor;
        self
    }

    pub fn elicitation_handler(mut self, handler: Arc<dyn ElicitationHandler>) -> Self {
        self.elicitation = Some(handler);
        self
    }

    pub fn sampling_handler(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling = Some(handler);
        self
    }

    pub fn build(self) -> Conductor {
        let logger = Arc::new(ServerLogger::new());
        let resources = Arc::new(ResourceTracker::new());
        let state = Arc::new(ServerStateManager::new(self.config_store.clone()));
        let oauth = Arc::new(OAuthManager::new(self.token_store));
        let registry = Arc::new(ToolManager::new(
            self.config_store.clone(),
            self.builtins.clone(),
        ));
        let lifecycle = Arc::new(ServerLifecycleManager::new(
            self.config_store.clone(),
            state.clone(),
            registry.clone(),
            logger.clone(),
            oauth.clone(),
            self.elicitation,
            self.sampling,
        ));
        let executor = ToolExecutor::new(
            lifecycle.clone(),
            registry.clone(),
            state.clone(),
            logger.clone(),
            self.builtins,
            self.approval,
            self.processor,
            resources.clone(),
        );
        Conductor {
            config_store: self.config_store,
            state,
            logger,
            resources,
            oauth,
            registry,
            lifecycle,
            executor,
            sweeper: Mutex::new(None),
        }
    }
}

pub struct Conductor {
    config_store: Arc<dyn ConfigStore>,
    state: Arc<ServerStateManager>,
    logger: Arc<ServerLogger>,
    resources: Arc<ResourceTracker>,
    oauth: Arc<OAuthManager>,
    registry: Arc<ToolManager>,
    lifecycle: Arc<ServerLifecycleManager>,
    executor: ToolExecutor,
    /// Started lazily by the first bring-up, so construction needs no
    /// runtime
    sweeper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl Drop for Conductor {
    fn drop(&mut self) {
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
        }
    }
}

impl Conductor {
    pub fn builder() -> ConductorBuilder {
        ConductorBuilder::new()
    }

    /// Bring up every available provider; safe to call repeatedly
    pub async fn initialize(&self) -> InitializationSummary {
        self.ensure_sweeper();
        self.lifecycle.initialize_all().await
    }

    fn ensure_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            *sweeper = Some(self.resources.spawn_sweeper());
        }
    }

    pub fn initialization_progress(&self) -> InitializationProgress {
        self.lifecycle.progress()
    }

    pub async fn execute_tool(&self, call: &ToolCall, opts: &ExecuteOptions) -> ToolResult {
        self.executor.execute(call, opts).await
    }

    /// Tools visible under the global policy, built-ins included
    pub fn visible_tools(&self) -> Vec<Tool> {
        self.registry.visible_tools(&self.state.runtime_disabled())
    }

    pub fn visible_tools_for_profile(&self, profile: &ProfileToolConfig) -> Vec<Tool> {
        self.registry.visible_tools_for_profile(profile)
    }

    /// Management view of every known tool, with orphans cleaned out first
    pub fn tool_listing(&self) -> anyhow::Result<Vec<ToolListing>> {
        self.registry.cleanup_orphaned_tools()?;
        let mut listing: Vec<ToolListing> = self
            .registry
            .all_discovered()
            .into_iter()
            .map(|tool| {
                let enabled = !self.registry.is_tool_disabled(&tool.name);
                let provider_connected = tool
                    .provider_id()
                    .map(|p| self.lifecycle.is_connected(p))
                    .unwrap_or(true);
                ToolListing {
                    tool,
                    enabled,
                    provider_connected,
                }
            })
            .collect();
        listing.sort_by(|a, b| a.tool.name.cmp(&b.tool.name));
        Ok(listing)
    }

    /// Returns false when the name matches no known tool
    pub fn set_tool_enabled(&self, name: &str, enabled: bool) -> anyhow::Result<bool> {
        self.registry.set_tool_enabled(name, enabled)
    }

    /// Runtime provider switch. Disabling only hides the provider's tools;
    /// the connection stays warm for cheap re-enabling.
    pub fn set_provider_enabled(&self, provider_id: &str, enabled: bool) -> anyhow::Result<()> {
        self.state.set_runtime_enabled(provider_id, enabled)
    }

    /// Apply a profile's provider policy to the runtime-disabled set
    pub fn apply_profile(&self, profile: &ProfileToolConfig) -> anyhow::Result<()> {
        let provider_ids: Vec<String> = self.config_store.get().providers.keys().cloned().collect();
        self.state.apply_profile_config(profile, &provider_ids)
    }

    pub async fn restart_provider(&self, provider_id: &str) -> Result<usize, ConductorError> {
        self.lifecycle.restart_provider(provider_id).await
    }

    pub async fn stop_provider(&self, provider_id: &str) {
        self.lifecycle.stop_provider(provider_id).await;
    }

    /// Validate a provider's configuration against a disposable connection;
    /// returns the advertised tool count
    pub async fn test_provider(&self, provider_id: &str) -> Result<usize, ConductorError> {
        let config = self.config_store.get();
        let provider_config = config.providers.get(provider_id).ok_or_else(|| {
            ConductorError::Other(anyhow::anyhow!("unknown provider: {provider_id}"))
        })?;
        self.lifecycle
            .test_connection(provider_id, provider_config)
            .await
    }

    /// Kill switch: synchronous best-effort teardown of everything
    pub fn emergency_stop(&self) {
        info!("emergency stop requested");
        self.lifecycle.emergency_stop_all();
    }

    pub fn connected_providers(&self) -> Vec<String> {
        self.lifecycle.connected_providers()
    }

    pub fn provider_logs(&self, provider_id: &str) -> Vec<LogEntry> {
        self.logger.logs(provider_id)
    }

    pub fn tracked_resources(&self) -> Vec<TrackedResource> {
        self.resources.tracked_resources()
    }

    /// Start a browser authorization flow for an OAuth provider
    pub fn initiate_oauth(&self, provider_id: &str) -> anyhow::Result<AuthorizationRequest> {
        let settings = self.oauth_settings(provider_id)?;
        self.oauth.initiate_oauth_flow(provider_id, &settings)
    }

    /// Route an authorization callback to its provider by state parameter
    pub fn oauth_provider_for_state(&self, state: &str) -> Option<String> {
        self.oauth.find_provider_by_state(state)
    }

    pub async fn complete_oauth(
        &self,
        provider_id: &str,
        code: &str,
        state: &str,
    ) -> OAuthCompletion {
        let settings = match self.oauth_settings(provider_id) {
            Ok(settings) => settings,
            Err(e) => {
                return OAuthCompletion {
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        };
        self.oauth
            .complete_oauth_flow(provider_id, code, state, &settings)
            .await
    }

    pub async fn revoke_oauth(&self, provider_id: &str) -> anyhow::Result<()> {
        let settings = self.oauth_settings(provider_id)?;
        self.oauth.revoke_tokens(provider_id, &settings).await
    }

    fn oauth_settings(
        &self,
        provider_id: &str,
    ) -> anyhow::Result<conductor_core::OAuthSettings> {
        self.config_store
            .get()
            .providers
            .get(provider_id)
            .ok_or_else(|| anyhow::anyhow!("unknown provider: {provider_id}"))?
            .oauth
            .clone()
            .ok_or_else(|| anyhow::anyhow!("provider '{provider_id}' has no OAuth configuration"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::{AppConfig, ProviderConfig, TransportConfig};
    use serde_json::json;

    fn conductor_with(config: AppConfig) -> Conductor {
        Conductor::builder()
            .config_store(Arc::new(MemoryConfigStore::new(config)))
            .build()
    }

    #[test]
    fn test_build_outside_runtime() {
        // Construction and teardown never touch the runtime
        let conductor = conductor_with(AppConfig::default());
        assert!(conductor.connected_providers().is_empty());
        drop(conductor);
    }

    #[tokio::test]
    async fn test_default_build_is_empty_but_functional() {
        let conductor = conductor_with(AppConfig::default());
        let summary = conductor.initialize().await;
        assert!(summary.connected.is_empty());
        assert!(conductor.visible_tools().is_empty());

        let result = conductor
            .execute_tool(
                &ToolCall::new("anything", json!({})),
                &ExecuteOptions::default(),
            )
            .await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn test_oauth_requires_configuration() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "plain".to_string(),
            ProviderConfig::new(TransportConfig::Websocket {
                url: "ws://localhost:3000".to_string(),
            }),
        );
        let conductor = conductor_with(config);

        let err = conductor.initiate_oauth("plain").unwrap_err();
        assert!(err.to_string().contains("no OAuth configuration"));
        let err = conductor.initiate_oauth("ghost").unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }

    #[tokio::test]
    async fn test_provider_switch_and_listing() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "github".to_string(),
            ProviderConfig::new(TransportConfig::Websocket {
                url: "ws://localhost:3000".to_string(),
            }),
        );
        let conductor = conductor_with(config);

        conductor.set_provider_enabled("github", false).unwrap();
        assert!(!conductor
            .state
            .is_runtime_enabled("github"));

        // Unknown tool names are reported, not silently accepted
        assert!(!conductor.set_tool_enabled("ghost:tool", false).unwrap());

        let listing = conductor.tool_listing().unwrap();
        assert!(listing.is_empty());
    }
}
