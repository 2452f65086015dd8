//! # Conductor Core Library
//!
//! Domain types, collaborator traits, and bookkeeping services for the
//! Conductor tool-invocation layer.
//!
//! ## Modules
//!
//! - `domain` - Core entities (provider config, tools, log entries)
//! - `error` - Error taxonomy shared across crates
//! - `repository` - Data access traits (config and OAuth token storage)
//! - `collaborators` - Traits for host-supplied behavior (built-in tools,
//!   approval, response processing, elicitation, sampling)
//! - `service` - Domain services (server logger, resource tracker,
//!   server state)

pub mod collaborators;
pub mod domain;
pub mod error;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use collaborators::*;
pub use domain::*;
pub use error::ConductorError;
pub use repository::*;
pub use service::*;
