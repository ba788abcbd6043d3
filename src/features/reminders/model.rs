//! # Reminder Data Model
//!
//! Reminders, notification cycles, and the cycle key that ties them together.
//!
//! Records are decoded leniently: the remote document is edited by hand and by
//! older bot versions, so a missing or malformed field falls back to a documented
//! default instead of failing the whole document.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.1.0: Lenient per-entry decoding, cycle timestamps recovered from keys
//! - 1.0.0: Initial release

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use log::warn;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Message delivered when a reminder was created without text
pub const DEFAULT_MESSAGE_TEXT: &str = "8h rồi đi chơi thôi";

/// Platform recorded when a stored reminder does not name one
pub const DEFAULT_PLATFORM: &str = "telegram";

/// Timestamp layout embedded in cycle keys (minute granularity)
const CYCLE_KEY_TIMESTAMP_LEN: usize = 12;

// ============================================================================
// Time of day
// ============================================================================

/// A wall-clock time with minute precision, rendered as `HH:MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u32,
    minute: u32,
}

impl TimeOfDay {
    /// Fire time used for stored reminders that lack one
    pub const DEFAULT: TimeOfDay = TimeOfDay { hour: 8, minute: 0 };

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(TimeOfDay { hour, minute })
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for TimeOfDay {
    type Err = anyhow::Error;

    /// Accepts `8`, `08`, `8:05`, `08:00`, `8h`, `8h30`
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let normalized = s.trim().replace(['h', 'H'], ":");
        let mut parts = normalized.splitn(2, ':');

        let hour = parts
            .next()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing hour in time '{}'", s))?
            .parse::<u32>()
            .map_err(|_| anyhow::anyhow!("Invalid hour in time '{}'", s))?;

        let minute = match parts.next().map(str::trim) {
            None | Some("") => 0,
            Some(m) => m
                .parse::<u32>()
                .map_err(|_| anyhow::anyhow!("Invalid minute in time '{}'", s))?,
        };

        TimeOfDay::new(hour, minute)
            .ok_or_else(|| anyhow::anyhow!("Time out of range: '{}'", s))
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Repeat mode
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Fires on a single day, then is removed
    Once,
    /// Fires every day at the same time
    Daily,
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepeatMode::Once => write!(f, "once"),
            RepeatMode::Daily => write!(f, "daily"),
        }
    }
}

// ============================================================================
// Escalation step
// ============================================================================

/// Escalation stage of a cycle, stored as the integer 1, 2 or 3
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    First = 1,
    Second = 2,
    Third = 3,
}

impl Step {
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Clamp an arbitrary stored number into the valid range
    pub fn from_number(n: u64) -> Step {
        match n {
            0 | 1 => Step::First,
            2 => Step::Second,
            _ => Step::Third,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl Serialize for Step {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.number())
    }
}

// ============================================================================
// Cycle keys
// ============================================================================

/// Build the key of the cycle a reminder produces for a given fire minute
///
/// Format: `{reminder_id}@{YYYYMMDDHHMM}`. The same reminder and minute always
/// yield the same key, which is what makes firing idempotent.
pub fn cycle_key(reminder_id: &str, fire_at: NaiveDateTime) -> String {
    format!("{}@{}", reminder_id, fire_at.format("%Y%m%d%H%M"))
}

/// Split a cycle key into its reminder id and fire minute
pub fn parse_cycle_key(key: &str) -> Option<(&str, NaiveDateTime)> {
    let (reminder_id, stamp) = key.rsplit_once('@')?;
    if reminder_id.is_empty()
        || stamp.len() != CYCLE_KEY_TIMESTAMP_LEN
        || !stamp.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let date = NaiveDate::parse_from_str(&stamp[..8], "%Y%m%d").ok()?;
    let hour: u32 = stamp[8..10].parse().ok()?;
    let minute: u32 = stamp[10..12].parse().ok()?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)?;

    Some((reminder_id, date.and_time(time)))
}

/// Whether a cycle key was produced by the given reminder
pub fn key_belongs_to(key: &str, reminder_id: &str) -> bool {
    key.strip_prefix(reminder_id)
        .is_some_and(|rest| rest.starts_with('@'))
}

// ============================================================================
// Reminder
// ============================================================================

/// A user-scheduled notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub id: String,

    /// User who created the reminder
    #[serde(rename = "user_id")]
    pub owner_id: String,

    /// Connector the reminder was created through
    pub platform: String,

    /// Conversation the notifications are delivered to
    #[serde(rename = "chat_id")]
    pub thread_id: String,

    #[serde(rename = "time")]
    pub fire_time: TimeOfDay,

    /// Target day for one-shot reminders, start day for daily ones
    #[serde(rename = "date")]
    pub fire_date: Option<NaiveDate>,

    #[serde(rename = "repeat")]
    pub repeat_mode: RepeatMode,

    #[serde(rename = "text")]
    pub message_text: String,

    pub created_at: Option<NaiveDateTime>,

    /// Last local date this reminder produced a cycle
    #[serde(rename = "last_fired")]
    pub last_fired_date: Option<NaiveDate>,

    /// Key of the in-flight cycle, if any (non-owning)
    #[serde(rename = "active_cycle_key")]
    pub active_cycle_id: Option<String>,

    pub tz: String,
}

impl Reminder {
    /// The day this reminder should fire on, as seen from `today`
    ///
    /// One-shot reminders without a date target today. Daily reminders target
    /// today unless their start date is still in the future.
    pub fn target_day(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self.repeat_mode {
            RepeatMode::Once => Some(self.fire_date.unwrap_or(today)),
            RepeatMode::Daily => match self.fire_date {
                Some(start) if start > today => None,
                _ => Some(today),
            },
        }
    }

    /// Local date-time the reminder should fire at, as seen from `today`
    pub fn target_datetime(&self, today: NaiveDate) -> Option<NaiveDateTime> {
        self.target_day(today)
            .map(|day| day.and_time(self.fire_time.to_naive_time()))
    }

    /// A one-shot reminder that has already fired on or after its target day
    ///
    /// Without a date the target follows today, so any firing at all spends it.
    pub fn is_spent(&self, today: NaiveDate) -> bool {
        if self.repeat_mode != RepeatMode::Once {
            return false;
        }
        match (self.last_fired_date, self.fire_date) {
            (Some(_), None) => true,
            (Some(last), Some(target)) => last >= target,
            (None, _) => false,
        }
    }

    /// Decode a stored reminder, filling gaps with defaults
    ///
    /// Returns `None` only when the entry is not a JSON object.
    pub fn from_json(key: &str, value: &Value) -> Option<Reminder> {
        if !value.is_object() {
            return None;
        }

        let fire_time = match str_field(value, "time") {
            None => TimeOfDay::DEFAULT,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!("Reminder {key}: {e}, using {}", TimeOfDay::DEFAULT);
                TimeOfDay::DEFAULT
            }),
        };

        let fire_date = str_field(value, "date").and_then(|raw| {
            let parsed = parse_date(raw);
            if parsed.is_none() {
                warn!("Reminder {key}: invalid date '{raw}', treating as today");
            }
            parsed
        });

        let repeat_mode = match str_field(value, "repeat") {
            Some(r) if r.eq_ignore_ascii_case("daily") => RepeatMode::Daily,
            _ => RepeatMode::Once,
        };

        Some(Reminder {
            id: str_field(value, "id").unwrap_or(key).to_string(),
            owner_id: id_field(value, "user_id").unwrap_or_default(),
            platform: str_field(value, "platform")
                .unwrap_or(DEFAULT_PLATFORM)
                .to_string(),
            thread_id: id_field(value, "chat_id").unwrap_or_default(),
            fire_time,
            fire_date,
            repeat_mode,
            message_text: str_field(value, "text")
                .unwrap_or(DEFAULT_MESSAGE_TEXT)
                .to_string(),
            created_at: str_field(value, "created_at").and_then(parse_datetime),
            last_fired_date: str_field(value, "last_fired").and_then(parse_date),
            active_cycle_id: str_field(value, "active_cycle_key").map(String::from),
            tz: str_field(value, "tz")
                .unwrap_or(crate::core::clock::LOCAL_TZ_NAME)
                .to_string(),
        })
    }
}

// ============================================================================
// Cycle
// ============================================================================

/// One notification episode of a reminder
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cycle {
    pub reminder_id: String,

    #[serde(rename = "chat_id")]
    pub thread_id: String,

    pub step: Step,

    /// Local time of the first notification (`t0`)
    #[serde(rename = "t0")]
    pub start_time: NaiveDateTime,

    #[serde(rename = "ack")]
    pub acknowledged: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack_text: Option<String>,

    /// Set once the final step has been sent
    pub done: bool,
}

impl Cycle {
    /// A fresh cycle at step 1
    pub fn start(reminder_id: &str, thread_id: &str, start_time: NaiveDateTime) -> Self {
        Self {
            reminder_id: reminder_id.to_string(),
            thread_id: thread_id.to_string(),
            step: Step::First,
            start_time,
            acknowledged: false,
            ack_text: None,
            done: false,
        }
    }

    pub fn elapsed(&self, now: NaiveDateTime) -> Duration {
        now - self.start_time
    }

    /// Move to a later step; never moves backwards
    ///
    /// Returns `true` if the step changed.
    pub fn escalate(&mut self, to: Step) -> bool {
        if to <= self.step {
            return false;
        }
        self.step = to;
        if to == Step::Third {
            self.done = true;
        }
        true
    }

    /// Record an acknowledgment; the first reply text wins
    ///
    /// Returns `false` if the cycle was already acknowledged.
    pub fn acknowledge(&mut self, reply_text: &str) -> bool {
        if self.acknowledged {
            return false;
        }
        self.acknowledged = true;
        self.ack_text = Some(reply_text.to_string());
        true
    }

    /// Decode a stored cycle, recovering ids and `t0` from the key when missing
    pub fn from_json(key: &str, value: &Value) -> Option<Cycle> {
        if !value.is_object() {
            return None;
        }

        let from_key = parse_cycle_key(key);

        let reminder_id = str_field(value, "reminder_id")
            .map(String::from)
            .or_else(|| from_key.map(|(rid, _)| rid.to_string()))?;

        let start_time = str_field(value, "t0")
            .and_then(parse_datetime)
            .or_else(|| from_key.map(|(_, at)| at))?;

        let step = Step::from_number(value.get("step").and_then(Value::as_u64).unwrap_or(1));

        Some(Cycle {
            reminder_id,
            thread_id: id_field(value, "chat_id").unwrap_or_default(),
            step,
            start_time,
            acknowledged: value.get("ack").and_then(Value::as_bool).unwrap_or(false),
            ack_text: value
                .get("ack_text")
                .and_then(Value::as_str)
                .map(String::from),
            done: value
                .get("done")
                .and_then(Value::as_bool)
                .unwrap_or(step == Step::Third),
        })
    }
}

// ============================================================================
// Field helpers
// ============================================================================

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Chat and user ids arrive as strings or as bare numbers
fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn day(y: i32, mo: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, mo, d).unwrap()
    }

    #[test]
    fn test_time_of_day_parse() {
        assert_eq!("08:00".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(8, 0).unwrap());
        assert_eq!("8".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(8, 0).unwrap());
        assert_eq!("8:5".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(8, 5).unwrap());
        assert_eq!("21h30".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(21, 30).unwrap());
        assert_eq!("7h".parse::<TimeOfDay>().unwrap(), TimeOfDay::new(7, 0).unwrap());
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("08:60".parse::<TimeOfDay>().is_err());
        assert!("noon".parse::<TimeOfDay>().is_err());
        assert!("".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_time_of_day_display() {
        assert_eq!(TimeOfDay::new(8, 5).unwrap().to_string(), "08:05");
        assert_eq!(TimeOfDay::DEFAULT.to_string(), "08:00");
    }

    #[test]
    fn test_cycle_key_format_and_parse() {
        let rid = "3f2b8c1e-0000-4000-8000-1234567890ab";
        let key = cycle_key(rid, at(2024, 1, 1, 8, 0));
        assert_eq!(key, format!("{rid}@202401010800"));

        let (parsed_rid, parsed_at) = parse_cycle_key(&key).unwrap();
        assert_eq!(parsed_rid, rid);
        assert_eq!(parsed_at, at(2024, 1, 1, 8, 0));

        assert!(parse_cycle_key("no-separator").is_none());
        assert!(parse_cycle_key("rid@2024010108").is_none());
        assert!(parse_cycle_key("rid@202401012500").is_none());
        assert!(parse_cycle_key("@202401010800").is_none());
    }

    #[test]
    fn test_key_belongs_to() {
        assert!(key_belongs_to("abc@202401010800", "abc"));
        assert!(!key_belongs_to("abcd@202401010800", "abc"));
        assert!(!key_belongs_to("xabc@202401010800", "abc"));
    }

    #[test]
    fn test_step_from_number_clamps() {
        assert_eq!(Step::from_number(0), Step::First);
        assert_eq!(Step::from_number(2), Step::Second);
        assert_eq!(Step::from_number(9), Step::Third);
        assert!(Step::First < Step::Second && Step::Second < Step::Third);
    }

    #[test]
    fn test_reminder_defaults_for_malformed_record() {
        let value = json!({
            "user_id": 42,
            "chat_id": "-100",
            "date": "2024-13-45",
            "repeat": "weekly",
            "text": ""
        });
        let r = Reminder::from_json("rid-1", &value).unwrap();

        assert_eq!(r.id, "rid-1");
        assert_eq!(r.owner_id, "42");
        assert_eq!(r.thread_id, "-100");
        assert_eq!(r.fire_time, TimeOfDay::DEFAULT);
        assert_eq!(r.fire_date, None);
        assert_eq!(r.repeat_mode, RepeatMode::Once);
        assert_eq!(r.message_text, DEFAULT_MESSAGE_TEXT);
        assert_eq!(r.platform, DEFAULT_PLATFORM);
        assert!(Reminder::from_json("x", &json!("not an object")).is_none());
    }

    #[test]
    fn test_reminder_serializes_with_stored_field_names() {
        let value = json!({
            "id": "r1", "user_id": "u1", "platform": "telegram", "chat_id": "c1",
            "time": "8:00", "date": "2024-01-01", "repeat": "daily", "text": "đi chơi",
            "last_fired": "2024-01-01", "active_cycle_key": "r1@202401010800"
        });
        let r = Reminder::from_json("r1", &value).unwrap();
        let out = serde_json::to_value(&r).unwrap();

        assert_eq!(out["time"], "08:00");
        assert_eq!(out["date"], "2024-01-01");
        assert_eq!(out["repeat"], "daily");
        assert_eq!(out["user_id"], "u1");
        assert_eq!(out["chat_id"], "c1");
        assert_eq!(out["last_fired"], "2024-01-01");
        assert_eq!(out["active_cycle_key"], "r1@202401010800");
    }

    #[test]
    fn test_target_day_rules() {
        let today = day(2024, 3, 10);
        let mut r = Reminder::from_json("r", &json!({"time": "09:15"})).unwrap();

        assert_eq!(r.target_datetime(today), Some(at(2024, 3, 10, 9, 15)));

        r.fire_date = Some(day(2024, 3, 12));
        assert_eq!(r.target_day(today), Some(day(2024, 3, 12)));

        r.repeat_mode = RepeatMode::Daily;
        assert_eq!(r.target_day(today), None);

        r.fire_date = Some(day(2024, 3, 1));
        assert_eq!(r.target_day(today), Some(today));
    }

    #[test]
    fn test_is_spent_only_for_fired_one_shots() {
        let mut r = Reminder::from_json("r", &json!({"date": "2024-01-01"})).unwrap();
        assert!(!r.is_spent(day(2024, 1, 1)));

        r.last_fired_date = Some(day(2024, 1, 1));
        assert!(r.is_spent(day(2024, 1, 1)));
        assert!(r.is_spent(day(2024, 1, 5)));

        r.repeat_mode = RepeatMode::Daily;
        assert!(!r.is_spent(day(2024, 1, 5)));
    }

    #[test]
    fn test_dateless_one_shot_stays_spent_after_midnight() {
        let mut r = Reminder::from_json("r", &json!({"time": "23:50", "date": null})).unwrap();
        assert!(!r.is_spent(day(2024, 1, 1)));

        r.last_fired_date = Some(day(2024, 1, 1));
        assert!(r.is_spent(day(2024, 1, 1)));
        assert!(r.is_spent(day(2024, 1, 2)));
    }

    #[test]
    fn test_cycle_escalation_is_monotonic() {
        let mut c = Cycle::start("r", "c", at(2024, 1, 1, 8, 0));
        assert!(c.escalate(Step::Second));
        assert!(!c.escalate(Step::First));
        assert_eq!(c.step, Step::Second);
        assert!(!c.done);

        assert!(c.escalate(Step::Third));
        assert!(c.done);
        assert!(!c.escalate(Step::Second));
        assert_eq!(c.step, Step::Third);
    }

    #[test]
    fn test_cycle_acknowledge_keeps_first_text() {
        let mut c = Cycle::start("r", "c", at(2024, 1, 1, 8, 0));
        assert!(c.acknowledge("ok"));
        assert!(!c.acknowledge("again"));
        assert!(c.acknowledged);
        assert_eq!(c.ack_text.as_deref(), Some("ok"));
    }

    #[test]
    fn test_cycle_recovers_fields_from_key() {
        let c = Cycle::from_json("rid@202401010800", &json!({"step": 2})).unwrap();
        assert_eq!(c.reminder_id, "rid");
        assert_eq!(c.start_time, at(2024, 1, 1, 8, 0));
        assert_eq!(c.step, Step::Second);
        assert!(!c.acknowledged);

        assert!(Cycle::from_json("garbage", &json!({"step": 1})).is_none());
    }

    #[test]
    fn test_cycle_serializes_with_stored_field_names() {
        let value = json!({
            "reminder_id": "r1", "chat_id": 12345, "step": 3,
            "t0": "2024-01-01T08:00:00", "ack": true, "ack_text": "done"
        });
        let c = Cycle::from_json("r1@202401010800", &value).unwrap();
        assert!(c.done);

        let out = serde_json::to_value(&c).unwrap();
        assert_eq!(out["t0"], "2024-01-01T08:00:00");
        assert_eq!(out["step"], 3);
        assert_eq!(out["ack"], true);
        assert_eq!(out["chat_id"], "12345");
    }
}
