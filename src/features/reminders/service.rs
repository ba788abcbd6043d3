//! Command path: create, cancel and acknowledge reminders from chat messages
//!
//! Each operation is its own load-modify-save of the whole document and can
//! race with a scheduler tick; the later save wins.

use super::ack::find_cycle_token;
use super::intent::{parse, CreateIntent, Intent, IntentRepeat};
use super::model::{key_belongs_to, RepeatMode, Reminder, TimeOfDay, DEFAULT_MESSAGE_TEXT};
use crate::connectors::InboundMessage;
use crate::core::clock::{Clock, LOCAL_TZ_NAME};
use crate::store::StateStore;
use anyhow::{Context, Result};
use log::{debug, info};
use std::sync::Arc;

pub const ACK_REPLY: &str = "Đã ghi nhận, cảm ơn bạn!";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    Acknowledged,
    /// Already acknowledged; the stored reply text was kept
    AlreadyAcknowledged,
    /// No live cycle with that key
    UnknownCycle,
}

pub struct ReminderService {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Store a new reminder built from a parsed create intent
    pub async fn create_reminder(
        &self,
        platform: &str,
        owner_id: &str,
        thread_id: &str,
        intent: CreateIntent,
    ) -> Result<Reminder> {
        let now = self.clock.now_local();

        let (repeat_mode, fire_date) = match intent.repeat {
            IntentRepeat::Daily => (RepeatMode::Daily, intent.date),
            IntentRepeat::Once => (RepeatMode::Once, intent.date),
            IntentRepeat::OnceToday => (RepeatMode::Once, Some(now.date())),
        };

        let message_text = if intent.text.trim().is_empty() {
            DEFAULT_MESSAGE_TEXT.to_string()
        } else {
            intent.text
        };

        let reminder = Reminder {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            platform: platform.to_string(),
            thread_id: thread_id.to_string(),
            fire_time: intent.time,
            fire_date,
            repeat_mode,
            message_text,
            created_at: Some(now),
            last_fired_date: None,
            active_cycle_id: None,
            tz: LOCAL_TZ_NAME.to_string(),
        };

        let mut doc = self.store.load().await.context("Failed to load reminders")?;
        doc.reminders.insert(reminder.id.clone(), reminder.clone());
        self.store.save(&doc).await.context("Failed to save new reminder")?;

        info!(
            "Created {} reminder {} for {} at {}",
            reminder.repeat_mode, reminder.id, owner_id, reminder.fire_time
        );
        Ok(reminder)
    }

    /// Delete every reminder of `owner_id` on `platform` at `time`, with their cycles
    ///
    /// Returns the ids removed.
    pub async fn cancel_reminders(
        &self,
        platform: &str,
        owner_id: &str,
        time: TimeOfDay,
    ) -> Result<Vec<String>> {
        let mut doc = self.store.load().await.context("Failed to load reminders")?;

        let ids: Vec<String> = doc
            .reminders
            .iter()
            .filter(|(_, r)| r.platform == platform && r.owner_id == owner_id && r.fire_time == time)
            .map(|(id, _)| id.clone())
            .collect();

        doc.reminders.retain(|id, _| !ids.contains(id));
        doc.cycles
            .retain(|key, _| !ids.iter().any(|id| key_belongs_to(key, id)));

        self.store.save(&doc).await.context("Failed to save after cancel")?;

        info!("Cancelled {} reminder(s) of {} at {}", ids.len(), owner_id, time);
        Ok(ids)
    }

    /// Mark a live cycle acknowledged; re-acknowledging is a no-op
    pub async fn acknowledge(&self, cycle_id: &str, reply_text: &str) -> Result<AckOutcome> {
        let mut doc = self.store.load().await.context("Failed to load reminders")?;

        let Some(cycle) = doc.cycles.get_mut(cycle_id) else {
            debug!("Acknowledgment for unknown cycle {cycle_id}");
            return Ok(AckOutcome::UnknownCycle);
        };

        if !cycle.acknowledge(reply_text) {
            return Ok(AckOutcome::AlreadyAcknowledged);
        }

        self.store
            .save(&doc)
            .await
            .context("Failed to save acknowledgment")?;
        info!("Cycle {cycle_id} acknowledged");
        Ok(AckOutcome::Acknowledged)
    }

    /// Route one inbound chat message; returns the reply to send, if any
    pub async fn handle_message(
        &self,
        platform: &str,
        message: &InboundMessage,
    ) -> Result<Option<String>> {
        let today = self.clock.now_local().date();

        match parse(&message.text, today) {
            Intent::Create(intent) => {
                let reminder = self
                    .create_reminder(platform, &message.sender_id, &message.thread_id, intent)
                    .await?;
                Ok(Some(creation_reply(&reminder)))
            }
            Intent::Cancel { time } => {
                self.cancel_reminders(platform, &message.sender_id, time)
                    .await?;
                Ok(Some(format!("Đã tắt mọi nhắc nhở lúc {time} của bạn.")))
            }
            Intent::None => {
                let Some(token) = find_cycle_token(&message.text) else {
                    return Ok(None);
                };
                match self.acknowledge(token, &message.text).await? {
                    AckOutcome::Acknowledged => Ok(Some(ACK_REPLY.to_string())),
                    AckOutcome::AlreadyAcknowledged | AckOutcome::UnknownCycle => Ok(None),
                }
            }
        }
    }
}

fn creation_reply(reminder: &Reminder) -> String {
    let mut when = format!("lúc {}", reminder.fire_time);
    if let Some(date) = reminder.fire_date {
        when.push_str(&format!(" ngày {}", date.format("%Y-%m-%d")));
    }
    if reminder.repeat_mode == RepeatMode::Daily {
        when.push_str(" (lặp mỗi ngày)");
    }
    format!("Đã tạo nhắc nhở {}: “{}”", when, reminder.message_text)
}
