//! # Reminder Scheduler
//!
//! Background tick loop. Each tick is one read-modify-write of the whole
//! reminder document:
//!
//! 1. Load the document
//! 2. Fire reminders whose target minute is in the due window
//! 3. Advance every cycle through the escalation rules, then drop expired ones
//! 4. Remove spent one-shot reminders that have no cycle left
//! 5. Save the document
//!
//! The scheduler and the command path both write the document with no
//! coordination, so the last writer wins.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: true
//!
//! ## Changelog
//! - 2.0.0: Injected store, sink and clock; explicit start/stop handle
//! - 1.1.0: Step 3 cycles expire on later ticks, one-shot deletion waits for the cycle
//! - 1.0.0: Initial release

use super::cycle::{evaluate, is_due, ExpiryReason, Transition};
use super::model::{cycle_key, Cycle, Step};
use super::templates::TemplateSet;
use crate::connectors::MessageSink;
use crate::core::clock::Clock;
use crate::core::config::Config;
use crate::store::{Document, StateStore};
use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Where notification templates come from
#[derive(Debug, Clone)]
pub enum TemplateSource {
    /// Fixed set, never reloaded
    Fixed(TemplateSet),
    /// Re-read from this directory on every tick, so edits apply without a restart
    Directory(PathBuf),
}

impl TemplateSource {
    async fn resolve(&self) -> TemplateSet {
        match self {
            TemplateSource::Fixed(set) => set.clone(),
            TemplateSource::Directory(dir) => TemplateSet::load(dir).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub templates: TemplateSource,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(30),
            templates: TemplateSource::Fixed(TemplateSet::identity()),
        }
    }
}

impl SchedulerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_interval: config.tick_interval,
            templates: TemplateSource::Directory(config.template_dir.clone()),
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// New cycles created (step 1 attempted)
    pub fired: usize,
    /// Step 2 and step 3 transitions
    pub escalated: usize,
    /// Cycles removed after acknowledgment or timeout
    pub expired: usize,
    /// Cycles removed because their reminder is gone
    pub orphaned: usize,
    /// Older live cycles replaced by a new firing of the same reminder
    pub superseded: usize,
    /// Spent one-shot reminders deleted
    pub reminders_removed: usize,
    pub send_failures: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        *self == TickReport::default()
    }
}

pub struct ReminderScheduler {
    store: Arc<dyn StateStore>,
    sink: Arc<dyn MessageSink>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn StateStore>,
        sink: Arc<dyn MessageSink>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            sink,
            clock,
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one complete evaluation pass
    ///
    /// Fails only when the document cannot be loaded or saved; send failures
    /// are logged and counted in the report.
    pub async fn tick(&self) -> Result<TickReport> {
        let mut doc = self
            .store
            .load()
            .await
            .with_context(|| format!("Failed to load reminders from {} store", self.store.name()))?;

        let now = self.clock.now_local();
        let templates = self.config.templates.resolve().await;
        let mut report = TickReport::default();

        self.fire_due(&mut doc, now, &templates, &mut report).await;
        self.advance_cycles(&mut doc, now, &templates, &mut report).await;
        remove_spent(&mut doc, now, &mut report);

        self.store
            .save(&doc)
            .await
            .with_context(|| format!("Failed to save reminders to {} store", self.store.name()))?;

        if report.is_idle() {
            debug!("Reminder tick at {now}: nothing to do");
        } else {
            debug!("Reminder tick at {now}: {report:?}");
        }
        Ok(report)
    }

    async fn fire_due(
        &self,
        doc: &mut Document,
        now: NaiveDateTime,
        templates: &TemplateSet,
        report: &mut TickReport,
    ) {
        let today = now.date();
        let ids: Vec<String> = doc.reminders.keys().cloned().collect();

        for rid in ids {
            let Some(reminder) = doc.reminders.get(&rid) else {
                continue;
            };
            if reminder.is_spent(today) {
                continue;
            }
            let Some(target) = reminder.target_datetime(today) else {
                continue;
            };
            if !is_due(target, now) {
                continue;
            }

            let key = cycle_key(&rid, target);
            if doc.cycles.contains_key(&key) {
                continue;
            }

            let thread_id = reminder.thread_id.clone();
            let text = reminder.message_text.clone();
            let previous = reminder.active_cycle_id.clone();

            if let Some(old_key) = previous.filter(|old| *old != key) {
                if doc.cycles.remove(&old_key).is_some() {
                    info!("Reminder {rid}: cycle {old_key} superseded by {key}");
                    report.superseded += 1;
                }
            }

            let message = compose_message(templates, Step::First, &text, &key);
            match self.sink.send_message(&thread_id, &message).await {
                Ok(()) => info!("Reminder {rid} fired in {thread_id} (cycle {key})"),
                Err(e) => {
                    // The cycle is still recorded, so this step-1 send is not retried
                    warn!("Reminder {rid}: step 1 send to {thread_id} failed: {e:#}");
                    report.send_failures += 1;
                }
            }

            doc.cycles
                .insert(key.clone(), Cycle::start(&rid, &thread_id, target));
            if let Some(reminder) = doc.reminders.get_mut(&rid) {
                reminder.last_fired_date = Some(today);
                reminder.active_cycle_id = Some(key);
            }
            report.fired += 1;
        }
    }

    async fn advance_cycles(
        &self,
        doc: &mut Document,
        now: NaiveDateTime,
        templates: &TemplateSet,
        report: &mut TickReport,
    ) {
        let keys: Vec<String> = doc.cycles.keys().cloned().collect();
        let mut removals: Vec<(String, ExpiryReason)> = Vec::new();

        for key in keys {
            let Some(cycle) = doc.cycles.get(&key) else {
                continue;
            };
            let owner = doc
                .reminders
                .get(&cycle.reminder_id)
                .map(|r| (r.thread_id.clone(), r.message_text.clone()));

            let mut transition = evaluate(cycle, owner.is_some(), now);

            if let (Transition::Escalate(step), Some((thread_id, text))) = (transition, owner) {
                let message = compose_message(templates, step, &text, &key);
                match self.sink.send_message(&thread_id, &message).await {
                    Ok(()) => info!("Cycle {key} escalated to step {step}"),
                    Err(e) => {
                        warn!("Cycle {key}: step {step} send to {thread_id} failed: {e:#}");
                        report.send_failures += 1;
                    }
                }

                transition = Transition::Hold;
                if let Some(cycle) = doc.cycles.get_mut(&key) {
                    cycle.escalate(step);
                    if step == Step::Third {
                        transition = evaluate(cycle, true, now);
                    }
                }
                report.escalated += 1;
            }

            if let Transition::Expire(reason) = transition {
                removals.push((key, reason));
            }
        }

        for (key, reason) in removals {
            let Some(cycle) = doc.cycles.remove(&key) else {
                continue;
            };
            if let Some(reminder) = doc.reminders.get_mut(&cycle.reminder_id) {
                if reminder.active_cycle_id.as_deref() == Some(key.as_str()) {
                    reminder.active_cycle_id = None;
                }
            }

            match reason {
                ExpiryReason::Orphaned => {
                    debug!("Cycle {key} removed: reminder {} no longer exists", cycle.reminder_id);
                    report.orphaned += 1;
                }
                ExpiryReason::Acknowledged => {
                    info!("Cycle {key} closed after acknowledgment");
                    report.expired += 1;
                }
                ExpiryReason::TimedOut => {
                    info!("Cycle {key} timed out without acknowledgment");
                    report.expired += 1;
                }
            }
        }
    }

    /// Spawn the tick loop
    ///
    /// The first tick runs immediately. Errors from a tick are logged and the
    /// loop carries on at the next interval.
    pub fn start(self: &Arc<Self>) -> Result<SchedulerHandle> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(anyhow!("Reminder scheduler is already running"));
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

        info!(
            "Reminder scheduler started (tick every {}s)",
            self.config.tick_interval.as_secs()
        );

        Ok(SchedulerHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
            running: Arc::clone(&self.running),
        })
    }

    async fn run(self: Arc<Self>, mut shutdown_rx: oneshot::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    // A started tick always runs to completion
                    if let Err(e) = self.tick().await {
                        error!("Reminder tick failed: {e:#}");
                    }
                }
                _ = &mut shutdown_rx => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Reminder scheduler stopped");
    }
}

/// Owner's handle on a running scheduler loop
pub struct SchedulerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Ask the loop to exit and wait up to `grace` for the in-flight tick
    ///
    /// Returns `false` if the loop had to be aborted.
    pub async fn stop(&mut self, grace: Duration) -> bool {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        let Some(mut task) = self.task.take() else {
            return true;
        };

        match tokio::time::timeout(grace, &mut task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!("Reminder scheduler task ended abnormally: {e}");
                self.running.store(false, Ordering::SeqCst);
                false
            }
            Err(_) => {
                warn!("Reminder scheduler did not stop within {grace:?}, aborting");
                task.abort();
                self.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }
}

/// Rendered step text plus the cycle key on its own line, for reply matching
fn compose_message(templates: &TemplateSet, step: Step, text: &str, key: &str) -> String {
    format!("{}\n{}", templates.render(step, text), key)
}

fn remove_spent(doc: &mut Document, now: NaiveDateTime, report: &mut TickReport) {
    let today = now.date();
    let spent: Vec<String> = doc
        .reminders
        .iter()
        .filter(|(_, r)| r.is_spent(today))
        .map(|(id, _)| id.clone())
        .collect();

    for rid in spent {
        // Keep the reminder until its escalation has finished
        if doc.has_cycles_for(&rid) {
            continue;
        }
        doc.remove_reminder(&rid);
        info!("One-shot reminder {rid} completed and removed");
        report.reminders_removed += 1;
    }
}
