//! Domain services

pub mod resource_tracker;
pub mod server_logger;
pub mod state;

pub use resource_tracker::{ResourceTracker, ResourceType, TrackedResource};
pub use server_logger::{ServerLogger, MAX_LOG_ENTRIES};
pub use state::ServerStateManager;
