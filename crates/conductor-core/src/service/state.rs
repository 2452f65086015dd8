//! Runtime provider state.
//!
//! Tracks which providers are runtime-enabled and which have completed
//! bring-up. The runtime-disabled set is persisted through the config
//! store on every mutation; the initialized set is in-memory only.

use crate::domain::{ProfileToolConfig, ProviderConfig};
use crate::repository::ConfigStore;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct ServerStateManager {
    config_store: Arc<dyn ConfigStore>,
    runtime_disabled: RwLock<HashSet<String>>,
    initialized: RwLock<HashSet<String>>,
}

impl ServerStateManager {
    pub fn new(config_store: Arc<dyn ConfigStore>) -> Self {
        let runtime_disabled = config_store
            .get()
            .runtime_disabled_providers
            .into_iter()
            .collect();
        Self {
            config_store,
            runtime_disabled: RwLock::new(runtime_disabled),
            initialized: RwLock::new(HashSet::new()),
        }
    }

    pub fn is_runtime_enabled(&self, provider_id: &str) -> bool {
        !self.runtime_disabled.read().contains(provider_id)
    }

    /// Both config-enabled and runtime-enabled
    pub fn is_available(&self, provider_id: &str, config: &ProviderConfig) -> bool {
        !config.disabled && self.is_runtime_enabled(provider_id)
    }

    pub fn runtime_disabled(&self) -> HashSet<String> {
        self.runtime_disabled.read().clone()
    }

    /// Flip a provider's runtime switch and persist the set.
    ///
    /// Only state changes here; stopping or starting the connection is the
    /// lifecycle manager's job.
    pub fn set_runtime_enabled(&self, provider_id: &str, enabled: bool) -> anyhow::Result<()> {
        {
            let mut disabled = self.runtime_disabled.write();
            let changed = if enabled {
                disabled.remove(provider_id)
            } else {
                disabled.insert(provider_id.to_string())
            };
            if !changed {
                return Ok(());
            }
        }
        debug!(provider = provider_id, enabled, "runtime switch changed");
        self.persist_runtime_disabled()
    }

    /// Rebuild the runtime-disabled set from a profile's policy.
    ///
    /// Live connections are untouched; hidden providers stay warm and are
    /// filtered out at the visibility layer.
    pub fn apply_profile_config(
        &self,
        profile: &ProfileToolConfig,
        all_provider_ids: &[String],
    ) -> anyhow::Result<()> {
        {
            let mut disabled = self.runtime_disabled.write();
            disabled.clear();
            for provider_id in all_provider_ids {
                if !profile.is_provider_visible(provider_id) {
                    disabled.insert(provider_id.clone());
                }
            }
        }
        self.persist_runtime_disabled()
    }

    fn persist_runtime_disabled(&self) -> anyhow::Result<()> {
        let mut config = self.config_store.get();
        let mut list: Vec<String> = self.runtime_disabled.read().iter().cloned().collect();
        list.sort();
        config.runtime_disabled_providers = list;
        self.config_store.save(&config)
    }

    pub fn mark_initialized(&self, provider_id: &str) {
        self.initialized.write().insert(provider_id.to_string());
    }

    pub fn is_initialized(&self, provider_id: &str) -> bool {
        self.initialized.read().contains(provider_id)
    }

    pub fn clear_initialized(&self, provider_id: &str) {
        self.initialized.write().remove(provider_id);
    }

    pub fn reset_initialized(&self) {
        self.initialized.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AppConfig, TransportConfig};
    use crate::repository::MemoryConfigStore;

    fn provider(disabled: bool) -> ProviderConfig {
        let mut config = ProviderConfig::new(TransportConfig::Websocket {
            url: "ws://localhost:3000".to_string(),
        });
        config.disabled = disabled;
        config
    }

    #[test]
    fn test_runtime_switch_persists() {
        let store = Arc::new(MemoryConfigStore::default());
        let state = ServerStateManager::new(store.clone());

        state.set_runtime_enabled("github", false).unwrap();
        assert!(!state.is_runtime_enabled("github"));
        assert_eq!(
            store.get().runtime_disabled_providers,
            vec!["github".to_string()]
        );

        state.set_runtime_enabled("github", true).unwrap();
        assert!(state.is_runtime_enabled("github"));
        assert!(store.get().runtime_disabled_providers.is_empty());
    }

    #[test]
    fn test_seeded_from_config() {
        let config = AppConfig {
            runtime_disabled_providers: vec!["slack".to_string()],
            ..Default::default()
        };
        let state = ServerStateManager::new(Arc::new(MemoryConfigStore::new(config)));
        assert!(!state.is_runtime_enabled("slack"));
        assert!(state.is_runtime_enabled("github"));
    }

    #[test]
    fn test_is_available_composes_both_switches() {
        let state = ServerStateManager::new(Arc::new(MemoryConfigStore::default()));
        assert!(state.is_available("github", &provider(false)));
        assert!(!state.is_available("github", &provider(true)));

        state.set_runtime_enabled("github", false).unwrap();
        assert!(!state.is_available("github", &provider(false)));
    }

    #[test]
    fn test_apply_profile_opt_in() {
        let store = Arc::new(MemoryConfigStore::default());
        let state = ServerStateManager::new(store.clone());
        let all = vec!["github".to_string(), "slack".to_string(), "db".to_string()];

        let profile = ProfileToolConfig {
            all_servers_disabled_by_default: true,
            enabled_servers: vec!["github".to_string()],
            ..Default::default()
        };
        state.apply_profile_config(&profile, &all).unwrap();

        assert!(state.is_runtime_enabled("github"));
        assert!(!state.is_runtime_enabled("slack"));
        assert!(!state.is_runtime_enabled("db"));
        assert_eq!(store.get().runtime_disabled_providers.len(), 2);
    }

    #[test]
    fn test_apply_profile_opt_out() {
        let state = ServerStateManager::new(Arc::new(MemoryConfigStore::default()));
        let all = vec!["github".to_string(), "slack".to_string()];

        let profile = ProfileToolConfig {
            disabled_servers: vec!["slack".to_string()],
            ..Default::default()
        };
        state.apply_profile_config(&profile, &all).unwrap();

        assert!(state.is_runtime_enabled("github"));
        assert!(!state.is_runtime_enabled("slack"));
    }

    #[test]
    fn test_initialized_tracking() {
        let state = ServerStateManager::new(Arc::new(MemoryConfigStore::default()));
        assert!(!state.is_initialized("github"));
        state.mark_initialized("github");
        assert!(state.is_initialized("github"));
        state.clear_initialized("github");
        assert!(!state.is_initialized("github"));
    }
}
