//! Provider lifecycle: bring-up, restart, teardown.
//!
//! Bring-up is sequential and idempotent; concurrent callers join the
//! in-flight pass instead of starting a second one. One provider failing
//! never aborts the pass.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use rmcp::service::Peer;
use rmcp::RoleClient;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use conductor_core::{
    ConductorError, ElicitationHandler, InitializationProgress, ProviderConfig, SamplingHandler,
    ServerLogger, ServerStateManager, Tool,
};

use crate::client::{McpClient, ProviderClientHandler};
use crate::oauth::{OAuthManager, ProviderTokenSource};
use crate::registry::ToolManager;
use crate::transport::{ConnectedProvider, TokenProvider, TransportFactory};

/// A live provider connection.
///
/// Holds the running client plus the child process backing stdio
/// providers; dropping the connection kills the child.
pub struct ProviderConnection {
    peer: Peer<RoleClient>,
    client: Mutex<Option<McpClient>>,
    child: Mutex<Option<tokio::process::Child>>,
    stderr_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ProviderConnection {
    fn new(connected: ConnectedProvider) -> Self {
        Self {
            peer: connected.client.peer().clone(),
            client: Mutex::new(Some(connected.client)),
            child: Mutex::new(connected.child),
            stderr_task: Mutex::new(connected.stderr_task),
        }
    }

    pub fn peer(&self) -> Peer<RoleClient> {
        self.peer.clone()
    }

    /// Graceful shutdown: cancel the client, then reap the child
    async fn shutdown(&self) {
        let client = self.client.lock().take();
        if let Some(client) = client {
            let _ = client.cancel().await;
        }
        if let Some(task) = self.stderr_task.lock().take() {
            task.abort();
        }
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.start_kill();
        }
    }

    /// Synchronous best-effort teardown for the kill switch
    fn abort(&self) {
        drop(self.client.lock().take());
        if let Some(task) = self.stderr_task.lock().take() {
            task.abort();
        }
        if let Some(mut child) = self.child.lock().take() {
            let _ = child.start_kill();
        }
    }
}

impl Drop for ProviderConnection {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Result of one bring-up pass
#[derive(Debug, Clone, Default)]
pub struct InitializationSummary {
    pub connected: Vec<String>,
    /// Provider id and failure message
    pub failed: Vec<(String, String)>,
    /// Disabled or already-initialized providers
    pub skipped: Vec<String>,
}

type SharedInit = Shared<BoxFuture<'static, InitializationSummary>>;

pub struct ServerLifecycleManager {
    config_store: Arc<dyn conductor_core::ConfigStore>,
    state: Arc<ServerStateManager>,
    registry: Arc<ToolManager>,
    logger: Arc<ServerLogger>,
    oauth: Arc<OAuthManager>,
    elicitation: Option<Arc<dyn ElicitationHandler>>,
    sampling: Option<Arc<dyn SamplingHandler>>,
    connections: DashMap<String, Arc<ProviderConnection>>,
    progress: RwLock<InitializationProgress>,
    in_flight: AsyncMutex<Option<SharedInit>>,
}

impl ServerLifecycleManager {
    pub fn new(
        config_store: Arc<dyn conductor_core::ConfigStore>,
        state: Arc<ServerStateManager>,
        registry: Arc<ToolManager>,
        logger: Arc<ServerLogger>,
        oauth: Arc<OAuthManager>,
        elicitation: Option<Arc<dyn ElicitationHandler>>,
        sampling: Option<Arc<dyn SamplingHandler>>,
    ) -> Self {
        Self {
            config_store,
            state,
            registry,
            logger,
            oauth,
            elicitation,
            sampling,
            connections: DashMap::new(),
            progress: RwLock::new(InitializationProgress::default()),
            in_flight: AsyncMutex::new(None),
        }
    }

    /// Bring up every available, not-yet-initialized provider.
    ///
    /// Concurrent callers share one pass and receive the same summary.
    pub async fn initialize_all(self: &Arc<Self>) -> InitializationSummary {
        let shared = {
            let mut in_flight = self.in_flight.lock().await;
            match in_flight.as_ref() {
                Some(shared) => shared.clone(),
                None => {
                    let this = Arc::clone(self);
                    let shared: SharedInit = async move {
                        let summary = this.run_bring_up().await;
                        this.in_flight.lock().await.take();
                        summary
                    }
                    .boxed()
                    .shared();
                    *in_flight = Some(shared.clone());
                    shared
                }
            }
        };
        shared.await
    }

    async fn run_bring_up(&self) -> InitializationSummary {
        let config = self.config_store.get();
        let mut candidates: Vec<(String, ProviderConfig)> = Vec::new();
        let mut summary = InitializationSummary::default();

        let mut provider_ids: Vec<&String> = config.providers.keys().collect();
        provider_ids.sort();
        for provider_id in provider_ids {
            let provider_config = &config.providers[provider_id];
            if !self.state.is_available(provider_id, provider_config)
                || self.state.is_initialized(provider_id)
            {
                summary.skipped.push(provider_id.clone());
            } else {
                candidates.push((provider_id.clone(), provider_config.clone()));
            }
        }

        let total = candidates.len();
        info!(total, "starting provider bring-up");

        for (index, (provider_id, provider_config)) in candidates.into_iter().enumerate() {
            *self.progress.write() = InitializationProgress {
                current: index + 1,
                total,
                current_provider: Some(provider_id.clone()),
            };

            // Auth failures at startup are surfaced, not silently retried;
            // only manual restarts permit the refresh-and-reconnect path
            match self.initialize_one(&provider_id, &provider_config, false).await {
                Ok(tool_count) => {
                    info!(provider = %provider_id, tool_count, "provider initialized");
                    self.state.mark_initialized(&provider_id);
                    summary.connected.push(provider_id);
                }
                Err(e) => {
                    error!(provider = %provider_id, "initialization failed: {e}");
                    self.logger
                        .append(&provider_id, format!("initialization failed: {e}"));
                    summary.failed.push((provider_id, e.to_string()));
                }
            }
        }

        *self.progress.write() = InitializationProgress {
            current: total,
            total,
            current_provider: None,
        };
        summary
    }

    /// Connect one provider, discover its tools, and publish both together.
    ///
    /// On an auth-shaped failure, and only when `allow_auto_oauth` is set,
    /// a forced token refresh buys exactly one reconnect attempt.
    pub async fn initialize_one(
        &self,
        provider_id: &str,
        config: &ProviderConfig,
        allow_auto_oauth: bool,
    ) -> Result<usize, ConductorError> {
        // Stale state from a previous life is purged before connecting
        self.registry.remove_provider_tools(provider_id);
        self.logger.create_buffer(provider_id);

        let connected = match self.connect_provider(provider_id, config).await {
            Ok(connected) => connected,
            Err(e) if e.is_auth_required() && allow_auto_oauth => {
                let Some(oauth_settings) = &config.oauth else {
                    return Err(e);
                };
                warn!(provider = %provider_id, "auth rejected, refreshing token and retrying");
                self.logger
                    .append(provider_id, "auth rejected, refreshing token and retrying");
                self.oauth
                    .force_refresh(provider_id, oauth_settings)
                    .await?;
                self.connect_provider(provider_id, config).await?
            }
            Err(e) => return Err(e),
        };

        let connection = Arc::new(ProviderConnection::new(connected));
        let tools = match self.discover_tools(provider_id, config, &connection).await {
            Ok(tools) => tools,
            Err(e) => {
                connection.shutdown().await;
                return Err(e);
            }
        };

        let tool_count = tools.len();
        // Tools and connection are published together; no half-states
        self.registry.replace_provider_tools(provider_id, tools);
        self.connections
            .insert(provider_id.to_string(), connection);
        self.logger
            .append(provider_id, format!("connected, {tool_count} tools"));
        Ok(tool_count)
    }

    async fn connect_provider(
        &self,
        provider_id: &str,
        config: &ProviderConfig,
    ) -> Result<ConnectedProvider, ConductorError> {
        let token_provider = self.token_provider_for(provider_id, config);
        let transport = TransportFactory::create(
            provider_id,
            config,
            token_provider,
            Arc::clone(&self.logger),
        )?;
        let handler = ProviderClientHandler::new(
            provider_id,
            Arc::clone(&self.logger),
            self.elicitation.clone(),
            self.sampling.clone(),
        );
        transport.connect(handler).await
    }

    fn token_provider_for(
        &self,
        provider_id: &str,
        config: &ProviderConfig,
    ) -> Option<Arc<dyn TokenProvider>> {
        config.oauth.as_ref().map(|settings| {
            Arc::new(ProviderTokenSource {
                oauth: Arc::clone(&self.oauth),
                provider_id: provider_id.to_string(),
                settings: settings.clone(),
            }) as Arc<dyn TokenProvider>
        })
    }

    async fn discover_tools(
        &self,
        provider_id: &str,
        config: &ProviderConfig,
        connection: &ProviderConnection,
    ) -> Result<Vec<Tool>, ConductorError> {
        let peer = connection.peer();
        let listed = tokio::time::timeout(config.connect_timeout(), peer.list_all_tools())
            .await
            .map_err(|_| ConductorError::ConnectionTimeout {
                provider_id: provider_id.to_string(),
                timeout: config.connect_timeout(),
            })?
            .map_err(|e| {
                ConductorError::Other(anyhow::anyhow!("tool discovery failed: {e}"))
            })?;

        Ok(listed
            .into_iter()
            .map(|t| {
                let schema = serde_json::to_value(t.input_schema.as_ref()).unwrap_or_default();
                Tool::qualified(
                    provider_id,
                    t.name.as_ref(),
                    t.description.as_ref().map(|d| d.to_string()),
                    schema,
                )
            })
            .collect())
    }

    /// Tear one provider down: tools first, then the connection, then its
    /// log buffer
    pub async fn stop_provider(&self, provider_id: &str) {
        self.registry.remove_provider_tools(provider_id);
        if let Some((_, connection)) = self.connections.remove(provider_id) {
            connection.shutdown().await;
            info!(provider = %provider_id, "provider stopped");
        }
        self.logger.remove_buffer(provider_id);
        self.state.clear_initialized(provider_id);
    }

    /// Full stop/start cycle with auto-OAuth permitted
    pub async fn restart_provider(&self, provider_id: &str) -> Result<usize, ConductorError> {
        self.stop_provider(provider_id).await;

        let config = self.config_store.get();
        let provider_config = config.providers.get(provider_id).ok_or_else(|| {
            ConductorError::Other(anyhow::anyhow!("unknown provider: {provider_id}"))
        })?;

        let tool_count = self
            .initialize_one(provider_id, provider_config, true)
            .await?;
        self.state.mark_initialized(provider_id);
        Ok(tool_count)
    }

    /// Validate a configuration against a disposable connection.
    ///
    /// Never touches the live connection map. Returns the number of tools
    /// the provider advertised.
    pub async fn test_connection(
        &self,
        provider_id: &str,
        config: &ProviderConfig,
    ) -> Result<usize, ConductorError> {
        let connected = self.connect_provider(provider_id, config).await?;
        let connection = ProviderConnection::new(connected);
        let result = self.discover_tools(provider_id, config, &connection).await;
        connection.shutdown().await;
        result.map(|tools| tools.len())
    }

    /// Kill switch: drop every live connection without awaiting graceful
    /// shutdown. Child processes die via kill-on-drop.
    pub fn emergency_stop_all(&self) {
        let provider_ids: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        warn!(count = provider_ids.len(), "emergency stop");

        for provider_id in provider_ids {
            self.registry.remove_provider_tools(&provider_id);
            if let Some((_, connection)) = self.connections.remove(&provider_id) {
                connection.abort();
            }
            self.state.clear_initialized(&provider_id);
        }
    }

    pub fn connection(&self, provider_id: &str) -> Option<Arc<ProviderConnection>> {
        self.connections
            .get(provider_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn connected_providers(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn is_connected(&self, provider_id: &str) -> bool {
        self.connections.contains_key(provider_id)
    }

    pub fn progress(&self) -> InitializationProgress {
        self.progress.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_core::{
        AppConfig, MemoryConfigStore, MemoryTokenStore, NoBuiltinTools, TransportConfig,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts `get` calls; `run_bring_up` reads the config exactly once
    /// per pass
    struct CountingConfigStore {
        inner: MemoryConfigStore,
        reads: AtomicUsize,
    }

    impl CountingConfigStore {
        fn new(config: AppConfig) -> Self {
            Self {
                inner: MemoryConfigStore::new(config),
                reads: AtomicUsize::new(0),
            }
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    impl conductor_core::ConfigStore for CountingConfigStore {
        fn get(&self) -> AppConfig {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.get()
        }

        fn save(&self, config: &AppConfig) -> anyhow::Result<()> {
            self.inner.save(config)
        }
    }

    fn manager_over(store: Arc<dyn conductor_core::ConfigStore>) -> Arc<ServerLifecycleManager> {
        let state = Arc::new(ServerStateManager::new(store.clone()));
        let registry = Arc::new(ToolManager::new(store.clone(), Arc::new(NoBuiltinTools)));
        let logger = Arc::new(ServerLogger::new());
        let oauth = Arc::new(OAuthManager::new(Arc::new(MemoryTokenStore::new())));
        Arc::new(ServerLifecycleManager::new(
            store, state, registry, logger, oauth, None, None,
        ))
    }

    fn manager_for(config: AppConfig) -> Arc<ServerLifecycleManager> {
        manager_over(Arc::new(MemoryConfigStore::new(config)))
    }

    fn broken_provider() -> ProviderConfig {
        ProviderConfig::new(TransportConfig::Stdio {
            command: "definitely-not-a-real-command-xyz".to_string(),
            args: vec![],
            env: HashMap::new(),
        })
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let mut config = AppConfig::default();
        config
            .providers
            .insert("one".to_string(), broken_provider());
        config
            .providers
            .insert("two".to_string(), broken_provider());

        let manager = manager_for(config);
        let summary = manager.initialize_all().await;

        // Both fail independently; the pass still completes
        assert_eq!(summary.failed.len(), 2);
        assert!(summary.connected.is_empty());

        let progress = manager.progress();
        assert_eq!(progress.current, 2);
        assert_eq!(progress.total, 2);
        assert!(progress.current_provider.is_none());
    }

    #[tokio::test]
    async fn test_disabled_providers_skipped() {
        let mut config = AppConfig::default();
        let mut disabled = broken_provider();
        disabled.disabled = true;
        config.providers.insert("off".to_string(), disabled);

        let manager = manager_for(config);
        let summary = manager.initialize_all().await;
        assert_eq!(summary.skipped, vec!["off".to_string()]);
        assert!(summary.failed.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_initialize_share_one_pass() {
        let mut config = AppConfig::default();
        config
            .providers
            .insert("one".to_string(), broken_provider());

        let store = Arc::new(CountingConfigStore::new(config));
        let manager = manager_over(store.clone());
        let before = store.reads();

        let (a, b) = tokio::join!(
            {
                let m = Arc::clone(&manager);
                async move { m.initialize_all().await }
            },
            {
                let m = Arc::clone(&manager);
                async move { m.initialize_all().await }
            },
        );

        // Both callers observe the same single pass
        assert_eq!(a.failed.len(), 1);
        assert_eq!(b.failed.len(), 1);
        // Two sequential passes would each read the config; a shared pass
        // reads it once
        assert_eq!(store.reads() - before, 1);
    }

    #[tokio::test]
    async fn test_unknown_provider_restart() {
        let manager = manager_for(AppConfig::default());
        let err = manager.restart_provider("ghost").await.unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
    }
}
