//! # Core Module
//!
//! Configuration and time handling shared by every layer of the bot.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add clock module with the fixed UTC+7 local offset
//! - 1.0.0: Initial creation with config module

pub mod clock;
pub mod config;

// Re-export commonly used items
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConnectorKind, StoreKind};
