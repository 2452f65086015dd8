//! Tool registry: discovery results, visibility, and enable/disable state.
//!
//! Discovered tools are replaced wholesale per provider, so a reconnect can
//! never leave duplicates or stale entries behind. Visibility composes
//! three layers: provider availability, per-tool disabled flags, and
//! (optionally) a profile's own policy.

use conductor_core::{BuiltinTools, ConfigStore, ProfileToolConfig, Tool};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub struct ToolManager {
    config_store: Arc<dyn ConfigStore>,
    builtins: Arc<dyn BuiltinTools>,
    /// Provider-backed tools only; built-ins are merged at query time
    tools: RwLock<Vec<Tool>>,
    disabled_tools: RwLock<HashSet<String>>,
}

impl ToolManager {
    pub fn new(config_store: Arc<dyn ConfigStore>, builtins: Arc<dyn BuiltinTools>) -> Self {
        let disabled_tools = config_store.get().disabled_tools.into_iter().collect();
        Self {
            config_store,
            builtins,
            tools: RwLock::new(Vec::new()),
            disabled_tools: RwLock::new(disabled_tools),
        }
    }

    /// Replace every tool of one provider with a fresh discovery result
    pub fn replace_provider_tools(&self, provider_id: &str, tools: Vec<Tool>) {
        let mut all = self.tools.write();
        all.retain(|t| t.provider_id() != Some(provider_id));
        all.extend(tools);
    }

    pub fn remove_provider_tools(&self, provider_id: &str) {
        self.tools
            .write()
            .retain(|t| t.provider_id() != Some(provider_id));
    }

    pub fn provider_tools(&self, provider_id: &str) -> Vec<Tool> {
        self.tools
            .read()
            .iter()
            .filter(|t| t.provider_id() == Some(provider_id))
            .cloned()
            .collect()
    }

    /// Every discovered tool regardless of visibility
    pub fn all_discovered(&self) -> Vec<Tool> {
        self.tools.read().clone()
    }

    pub fn is_tool_disabled(&self, qualified_name: &str) -> bool {
        self.disabled_tools.read().contains(qualified_name)
    }

    /// Schema of a discovered tool, for argument coercion
    pub fn tool_schema(&self, qualified_name: &str) -> Option<serde_json::Value> {
        self.tools
            .read()
            .iter()
            .find(|t| t.name == qualified_name)
            .map(|t| t.input_schema.clone())
    }

    /// Tools visible under the global policy: providers outside the
    /// runtime-disabled set, built-ins appended, individually disabled
    /// tools dropped last
    pub fn visible_tools(&self, runtime_disabled: &HashSet<String>) -> Vec<Tool> {
        let disabled_tools = self.disabled_tools.read();
        self.tools
            .read()
            .iter()
            .filter(|t| {
                t.provider_id()
                    .map(|p| !runtime_disabled.contains(p))
                    .unwrap_or(true)
            })
            .cloned()
            .chain(self.builtins.tools())
            .filter(|t| !disabled_tools.contains(&t.name))
            .collect()
    }

    /// Tools visible under a profile's policy.
    ///
    /// The profile replaces the provider-level layer; the global per-tool
    /// disabled set still applies, then the profile's own disabled list.
    pub fn visible_tools_for_profile(&self, profile: &ProfileToolConfig) -> Vec<Tool> {
        let disabled_tools = self.disabled_tools.read();
        self.tools
            .read()
            .iter()
            .filter(|t| {
                t.provider_id()
                    .map(|p| profile.is_provider_visible(p))
                    .unwrap_or(true)
            })
            .cloned()
            .chain(self.builtins.tools())
            .filter(|t| !disabled_tools.contains(&t.name))
            .filter(|t| !profile.disabled_tools.contains(&t.name))
            .collect()
    }

    /// Flip a single tool's disabled flag and persist.
    ///
    /// Returns `false` when the name matches no discovered or built-in
    /// tool.
    pub fn set_tool_enabled(&self, name: &str, enabled: bool) -> anyhow::Result<bool> {
        let known = self.builtins.is_builtin(name)
            || self.tools.read().iter().any(|t| t.name == name);
        if !known {
            return Ok(false);
        }

        {
            let mut disabled = self.disabled_tools.write();
            let changed = if enabled {
                disabled.remove(name)
            } else {
                disabled.insert(name.to_string())
            };
            if !changed {
                return Ok(true);
            }
        }
        debug!(tool = name, enabled, "tool switch changed");
        self.persist_disabled_tools()?;
        Ok(true)
    }

    /// Drop registry and disabled-flag entries whose provider no longer
    /// exists in configuration. Bare built-in names are never pruned.
    pub fn cleanup_orphaned_tools(&self) -> anyhow::Result<()> {
        let known_providers: HashSet<String> =
            self.config_store.get().providers.keys().cloned().collect();

        self.tools.write().retain(|t| {
            t.provider_id()
                .map(|p| known_providers.contains(p))
                .unwrap_or(true)
        });

        let removed = {
            let mut disabled = self.disabled_tools.write();
            let before = disabled.len();
            disabled.retain(|name| match conductor_core::split_qualified(name) {
                Some((provider, _)) => known_providers.contains(provider),
                None => true,
            });
            before != disabled.len()
        };
        if removed {
            self.persist_disabled_tools()?;
        }
        Ok(())
    }

    fn persist_disabled_tools(&self) -> anyhow::Result<()> {
        let mut config = self.config_store.get();
        let mut list: Vec<String> = self.disabled_tools.read().iter().cloned().collect();
        list.sort();
        config.disabled_tools = list;
        self.config_store.save(&config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conductor_core::{
        AppConfig, MemoryConfigStore, NoBuiltinTools, ProviderConfig, ToolResult, TransportConfig,
    };
    use serde_json::{json, Value};

    struct SnippetBuiltin;

    #[async_trait]
    impl BuiltinTools for SnippetBuiltin {
        fn is_builtin(&self, name: &str) -> bool {
            name == "make_snippet"
        }

        fn tools(&self) -> Vec<Tool> {
            vec![Tool {
                name: "make_snippet".to_string(),
                description: None,
                input_schema: json!({}),
            }]
        }

        async fn execute(
            &self,
            _name: &str,
            _arguments: Value,
            _session_id: Option<&str>,
        ) -> anyhow::Result<Option<ToolResult>> {
            Ok(Some(ToolResult::text("snippet")))
        }
    }

    fn tool(provider: &str, name: &str) -> Tool {
        Tool::qualified(provider, name, None, json!({}))
    }

    fn manager_with_builtin() -> ToolManager {
        ToolManager::new(
            Arc::new(MemoryConfigStore::default()),
            Arc::new(SnippetBuiltin),
        )
    }

    #[test]
    fn test_wholesale_replacement() {
        let manager = manager_with_builtin();
        manager.replace_provider_tools("github", vec![tool("github", "a"), tool("github", "b")]);
        manager.replace_provider_tools("github", vec![tool("github", "c")]);

        let tools = manager.provider_tools("github");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "github:c");
    }

    #[test]
    fn test_visibility_composition() {
        let manager = manager_with_builtin();
        manager.replace_provider_tools("github", vec![tool("github", "a")]);
        manager.replace_provider_tools("slack", vec![tool("slack", "b")]);
        manager.set_tool_enabled("github:a", false).unwrap();

        let runtime_disabled: HashSet<String> = ["slack".to_string()].into();
        let visible = manager.visible_tools(&runtime_disabled);

        // github:a disabled individually, slack:b hidden with its provider,
        // only the built-in remains
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "make_snippet");
    }

    #[test]
    fn test_profile_visibility_overrides_provider_layer() {
        let manager = manager_with_builtin();
        manager.replace_provider_tools("github", vec![tool("github", "a")]);
        manager.replace_provider_tools("slack", vec![tool("slack", "b")]);

        let profile = ProfileToolConfig {
            all_servers_disabled_by_default: true,
            enabled_servers: vec!["github".to_string()],
            disabled_tools: vec!["make_snippet".to_string()],
            ..Default::default()
        };
        let visible = manager.visible_tools_for_profile(&profile);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "github:a");
    }

    #[test]
    fn test_set_tool_enabled_unknown_name() {
        let manager = manager_with_builtin();
        assert!(!manager.set_tool_enabled("ghost:tool", false).unwrap());
        assert!(manager.set_tool_enabled("make_snippet", false).unwrap());
    }

    #[test]
    fn test_disabled_tools_persist() {
        let store = Arc::new(MemoryConfigStore::default());
        let manager = ToolManager::new(store.clone(), Arc::new(SnippetBuiltin));
        manager.replace_provider_tools("github", vec![tool("github", "a")]);
        manager.set_tool_enabled("github:a", false).unwrap();

        assert_eq!(store.get().disabled_tools, vec!["github:a".to_string()]);

        // A fresh manager over the same store sees the flag
        let reloaded = ToolManager::new(store, Arc::new(SnippetBuiltin));
        assert!(reloaded.is_tool_disabled("github:a"));
    }

    #[test]
    fn test_cleanup_orphaned_tools() {
        let mut config = AppConfig::default();
        config.providers.insert(
            "github".to_string(),
            ProviderConfig::new(TransportConfig::Websocket {
                url: "ws://localhost:3000".to_string(),
            }),
        );
        config.disabled_tools = vec![
            "github:a".to_string(),
            "removed:b".to_string(),
            "make_snippet".to_string(),
        ];
        let store = Arc::new(MemoryConfigStore::new(config));
        let manager = ToolManager::new(store.clone(), Arc::new(NoBuiltinTools));
        manager.replace_provider_tools("github", vec![tool("github", "a")]);
        manager.replace_provider_tools("removed", vec![tool("removed", "b")]);

        manager.cleanup_orphaned_tools().unwrap();

        assert_eq!(manager.all_discovered().len(), 1);
        let disabled = store.get().disabled_tools;
        assert!(disabled.contains(&"github:a".to_string()));
        assert!(disabled.contains(&"make_snippet".to_string()));
        assert!(!disabled.contains(&"removed:b".to_string()));
    }
}
