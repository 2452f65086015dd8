//! Error taxonomy shared across the workspace

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConductorError {
    /// Transport could not be constructed (unresolvable command, bad URL)
    #[error("transport creation failed for '{provider_id}': {reason}")]
    TransportCreation { provider_id: String, reason: String },

    /// Provider rejected the connection for lack of valid credentials
    #[error("authentication required for provider '{0}'")]
    AuthRequired(String),

    #[error("connection to '{provider_id}' timed out after {timeout:?}")]
    ConnectionTimeout {
        provider_id: String,
        timeout: Duration,
    },

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Provider rejected the arguments as not matching the tool schema
    #[error("argument schema mismatch: {0}")]
    ArgumentSchema(String),

    #[error("tool call denied by user")]
    ApprovalDenied,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConductorError {
    pub fn is_auth_required(&self) -> bool {
        matches!(self, Self::AuthRequired(_))
    }
}

/// Whether an error message indicates missing or invalid credentials.
///
/// Transports and the executor use this to classify opaque protocol errors.
pub fn is_auth_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("401")
        || lower.contains("unauthorized")
        || lower.contains("invalid_token")
        || lower.contains("token expired")
        || lower.contains("authentication required")
        || lower.contains("access token")
}

/// Whether an error message indicates an argument-schema mismatch that is
/// worth a repaired retry.
pub fn is_schema_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("missing field")
        || lower.contains("required property")
        || lower.contains("invalid arguments")
        || lower.contains("invalid_params")
        || lower.contains("invalid params")
        || lower.contains("invalid type")
        || lower.contains("unknown field")
}
