//! Tool entities and qualified-name handling

use serde::{Deserialize, Serialize};

/// Separator between provider id and tool name in a qualified name
pub const QUALIFIED_NAME_SEPARATOR: char = ':';

/// Split a qualified tool name into `(provider_id, tool_name)`.
///
/// Returns `None` for bare names (built-in tools use bare names).
pub fn split_qualified(name: &str) -> Option<(&str, &str)> {
    let (provider, tool) = name.split_once(QUALIFIED_NAME_SEPARATOR)?;
    if provider.is_empty() || tool.is_empty() {
        return None;
    }
    Some((provider, tool))
}

/// A discoverable tool, either provider-backed (qualified name) or built-in
/// (bare name)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tool {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool arguments
    pub input_schema: serde_json::Value,
}

impl Tool {
    /// Build a provider-backed tool with a qualified name
    pub fn qualified(
        provider_id: &str,
        tool_name: &str,
        description: Option<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: format!("{provider_id}{QUALIFIED_NAME_SEPARATOR}{tool_name}"),
            description,
            input_schema,
        }
    }

    /// Provider id prefix, if the name is qualified
    pub fn provider_id(&self) -> Option<&str> {
        split_qualified(&self.name).map(|(provider, _)| provider)
    }

    /// Name without the provider prefix
    pub fn short_name(&self) -> &str {
        split_qualified(&self.name)
            .map(|(_, tool)| tool)
            .unwrap_or(&self.name)
    }
}

/// A tool invocation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// One content item in a tool result
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl ToolContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text".to_string(),
            text: text.into(),
        }
    }
}

/// Normalized tool invocation outcome.
///
/// User-facing failures are expressed as `is_error: true` results, never as
/// errors propagated to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResult {
    pub content: Vec<ToolContent>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(text)],
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::text(message)],
            is_error: true,
        }
    }

    /// All text content joined with newlines
    pub fn combined_text(&self) -> String {
        self.content
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Progress counters published during provider bring-up
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct InitializationProgress {
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_provider: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_qualified() {
        assert_eq!(split_qualified("github:create_issue"), Some(("github", "create_issue")));
        assert_eq!(split_qualified("make_snippet"), None);
        assert_eq!(split_qualified(":create_issue"), None);
        assert_eq!(split_qualified("github:"), None);
    }

    #[test]
    fn test_qualified_tool() {
        let tool = Tool::qualified("github", "create_issue", None, serde_json::json!({}));
        assert_eq!(tool.name, "github:create_issue");
        assert_eq!(tool.provider_id(), Some("github"));
        assert_eq!(tool.short_name(), "create_issue");
    }

    #[test]
    fn test_bare_tool_short_name() {
        let tool = Tool {
            name: "make_snippet".to_string(),
            description: None,
            input_schema: serde_json::json!({}),
        };
        assert_eq!(tool.provider_id(), None);
        assert_eq!(tool.short_name(), "make_snippet");
    }

    #[test]
    fn test_tool_result_error() {
        let result = ToolResult::error("Tool not found");
        assert!(result.is_error);
        assert_eq!(result.combined_text(), "Tool not found");
    }
}
