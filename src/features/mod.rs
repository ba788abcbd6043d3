//! # Features
//!
//! - **Toggleable** features are wired up by the binary and can be left out
//!   without touching the core layer.

pub mod reminders;

pub use reminders::{ReminderScheduler, ReminderService, SchedulerHandle};
