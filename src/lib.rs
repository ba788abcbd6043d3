// Core layer - shared configuration and time handling
pub mod core;

// Features layer - all feature modules
pub mod features;

// Infrastructure - chat platforms and persistence
pub mod connectors;
pub mod store;

// Re-export core config for convenience
pub use core::Config;

// Re-export feature items
pub use features::{ReminderScheduler, ReminderService, SchedulerHandle};
