//! Data access traits and in-memory implementations

use crate::domain::AppConfig;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Synchronous configuration storage.
///
/// Reads return the current state directly; mutations are written back
/// before the mutating call returns, so readers never observe stale state.
pub trait ConfigStore: Send + Sync {
    fn get(&self) -> AppConfig;
    fn save(&self, config: &AppConfig) -> anyhow::Result<()>;
}

/// A persisted OAuth token set for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl StoredToken {
    /// Expired, or within the 60-second refresh margin of expiry.
    /// Tokens without an expiry never report expired.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => Utc::now() + Duration::seconds(60) >= at,
            None => false,
        }
    }
}

/// OAuth token storage keyed by provider id
pub trait TokenStore: Send + Sync {
    fn get_token(&self, provider_id: &str) -> Option<StoredToken>;
    fn save_token(&self, provider_id: &str, token: &StoredToken) -> anyhow::Result<()>;
    fn delete_token(&self, provider_id: &str) -> anyhow::Result<()>;
}

/// In-memory config store, used in tests and embedded hosts
#[derive(Default)]
pub struct MemoryConfigStore {
    config: Mutex<AppConfig>,
}

impl MemoryConfigStore {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Mutex::new(config),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn get(&self) -> AppConfig {
        self.config.lock().clone()
    }

    fn save(&self, config: &AppConfig) -> anyhow::Result<()> {
        *self.config.lock() = config.clone();
        Ok(())
    }
}

/// In-memory token store
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, StoredToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_token(&self, provider_id: &str) -> Option<StoredToken> {
        self.tokens.lock().get(provider_id).cloned()
    }

    fn save_token(&self, provider_id: &str, token: &StoredToken) -> anyhow::Result<()> {
        self.tokens
            .lock()
            .insert(provider_id.to_string(), token.clone());
        Ok(())
    }

    fn delete_token(&self, provider_id: &str) -> anyhow::Result<()> {
        self.tokens.lock().remove(provider_id);
        Ok(())
    }
}
