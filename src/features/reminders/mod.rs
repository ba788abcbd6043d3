//! # Feature: Reminders
//!
//! Timed reminders with a three-step escalation: a reminder fires once per due
//! minute, opens a cycle, and nags at +10 and +20 minutes until someone replies
//! with the cycle key or 30 minutes pass.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 2.0.0: Escalation cycles, acknowledgment tokens, whole-document store
//! - 1.0.0: Initial single-shot reminders

pub mod ack;
pub mod cycle;
pub mod intent;
pub mod model;
pub mod scheduler;
pub mod service;
pub mod templates;

pub use intent::{CreateIntent, Intent, IntentRepeat};
pub use model::{Cycle, Reminder, RepeatMode, Step, TimeOfDay};
pub use scheduler::{ReminderScheduler, SchedulerConfig, SchedulerHandle, TemplateSource, TickReport};
pub use service::{AckOutcome, ReminderService};
pub use templates::TemplateSet;
