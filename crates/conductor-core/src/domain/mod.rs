//! Core domain entities

pub mod config;
pub mod server_log;
pub mod tool;

pub use config::*;
pub use server_log::*;
pub use tool::*;
