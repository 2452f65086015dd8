//! # Conductor Engine
//!
//! Provider lifecycle, transports, OAuth, and tool execution on top of the
//! `conductor-core` domain layer.
//!
//! ## Modules
//!
//! - `transport` - Stdio / websocket / streamable-HTTP transports
//! - `client` - MCP client handler (elicitation, sampling, server logs)
//! - `oauth` - OAuth 2.1 with PKCE for authenticated providers
//! - `registry` - Tool discovery, visibility, and enable/disable state
//! - `lifecycle` - Provider bring-up, restart, and teardown
//! - `executor` - Tool dispatch with argument repair
//! - `facade` - Top-level [`Conductor`] assembler

pub mod client;
pub mod executor;
pub mod facade;
pub mod lifecycle;
pub mod oauth;
pub mod registry;
pub mod transport;

pub use executor::{ExecuteOptions, ToolExecutor};
pub use facade::{Conductor, ConductorBuilder, ToolListing};
pub use lifecycle::{InitializationSummary, ServerLifecycleManager};
pub use oauth::{OAuthCompletion, OAuthManager};
pub use registry::ToolManager;
