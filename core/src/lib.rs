//! Bunny Core - Foundational Types
//!
//! This module provides the error taxonomy, configuration and platform
//! types shared by the bunny frontend and its command-line entry point.

pub mod config;
pub mod error;
pub mod platform;

// Re-export commonly used types
pub use config::{FrontendConfig, LogLevel};
pub use error::{BunnyError, FetchPhase, Result};
pub use platform::Platform;

/// Bunny version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
