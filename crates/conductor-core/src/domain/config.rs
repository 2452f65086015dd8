//! Provider and application configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Default connection timeout when a provider does not override it
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// How a provider process or endpoint is reached
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TransportConfig {
    /// Local subprocess speaking JSON-RPC over stdin/stdout
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    /// Persistent websocket connection
    Websocket { url: String },
    /// Streamable HTTP endpoint
    StreamableHttp { url: String },
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Stdio { .. } => "stdio",
            Self::Websocket { .. } => "websocket",
            Self::StreamableHttp { .. } => "streamable-http",
        }
    }

    /// Endpoint URL for network transports
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Stdio { .. } => None,
            Self::Websocket { url } | Self::StreamableHttp { url } => Some(url),
        }
    }
}

/// OAuth 2.1 endpoints and client credentials for one provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthSettings {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub redirect_uri: String,
}

/// Declarative configuration for a single tool provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(flatten)]
    pub transport: TransportConfig,

    /// OAuth settings for providers that require authentication
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthSettings>,

    /// Connection timeout override in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Configured-off: never considered for bring-up
    #[serde(default)]
    pub disabled: bool,
}

impl ProviderConfig {
    pub fn new(transport: TransportConfig) -> Self {
        Self {
            transport,
            oauth: None,
            timeout_ms: None,
            disabled: false,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }
}

/// Persisted application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Providers keyed by identifier
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Providers switched off at runtime (distinct from `disabled` in config)
    #[serde(default)]
    pub runtime_disabled_providers: Vec<String>,

    /// Individually hidden tools, by qualified name
    #[serde(default)]
    pub disabled_tools: Vec<String>,
}

/// Per-profile tool visibility policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileToolConfig {
    /// Opt-in mode: only `enabled_servers` are visible
    #[serde(default)]
    pub all_servers_disabled_by_default: bool,

    #[serde(default)]
    pub enabled_servers: Vec<String>,

    #[serde(default)]
    pub disabled_servers: Vec<String>,

    /// Qualified tool names hidden within this profile
    #[serde(default)]
    pub disabled_tools: Vec<String>,
}

impl ProfileToolConfig {
    /// Whether this profile shows tools from the given provider
    pub fn is_provider_visible(&self, provider_id: &str) -> bool {
        if self.all_servers_disabled_by_default {
            self.enabled_servers.iter().any(|s| s == provider_id)
        } else {
            !self.disabled_servers.iter().any(|s| s == provider_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_config_serialization() {
        let config = ProviderConfig::new(TransportConfig::Stdio {
            command: "uvx".to_string(),
            args: vec!["mcp-server-fetch".to_string()],
            env: HashMap::new(),
        });

        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"type\":\"stdio\""));
        assert!(json.contains("\"command\":\"uvx\""));

        let parsed: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.transport.kind(), "stdio");
    }

    #[test]
    fn test_network_transport_from_json() {
        let parsed: ProviderConfig = serde_json::from_str(
            r#"{"type": "streamable-http", "url": "https://example.com/mcp", "timeout_ms": 5000}"#,
        )
        .unwrap();
        assert_eq!(parsed.transport.url(), Some("https://example.com/mcp"));
        assert_eq!(parsed.connect_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_default_connect_timeout() {
        let config = ProviderConfig::new(TransportConfig::Websocket {
            url: "ws://localhost:3000".to_string(),
        });
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
    }

    #[test]
    fn test_profile_config_camel_case() {
        let profile: ProfileToolConfig = serde_json::from_str(
            r#"{
                "allServersDisabledByDefault": true,
                "enabledServers": ["github"],
                "disabledTools": ["github:delete_repo"]
            }"#,
        )
        .unwrap();
        assert!(profile.all_servers_disabled_by_default);
        assert!(profile.is_provider_visible("github"));
        assert!(!profile.is_provider_visible("slack"));
    }

    #[test]
    fn test_profile_opt_out_mode() {
        let profile = ProfileToolConfig {
            disabled_servers: vec!["slack".to_string()],
            ..Default::default()
        };
        assert!(profile.is_provider_visible("github"));
        assert!(!profile.is_provider_visible("slack"));
    }
}
