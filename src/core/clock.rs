//! # Clock
//!
//! Wall-clock access for the scheduler and the command path.
//! All "local" time in the bot is a fixed UTC+7 offset (Asia/Ho_Chi_Minh, no DST).
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false

use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Offset, Utc};
use std::sync::Mutex;

/// Offset of the bot's local time from UTC, in seconds
pub const LOCAL_OFFSET_SECONDS: i32 = 7 * 60 * 60;

/// IANA name recorded on reminders for display purposes only
pub const LOCAL_TZ_NAME: &str = "Asia/Ho_Chi_Minh";

/// The fixed local offset (UTC+7)
pub fn local_offset() -> FixedOffset {
    FixedOffset::east_opt(LOCAL_OFFSET_SECONDS).unwrap_or_else(|| Utc.fix())
}

/// Convert a UTC instant to local wall-clock time
pub fn to_local(instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(&local_offset()).naive_local()
}

/// Source of the current time
///
/// Injected into the scheduler and the reminder service so ticks can be driven
/// deterministically in tests.
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current wall-clock time in the fixed local offset
    fn now_local(&self) -> NaiveDateTime {
        to_local(self.now_utc())
    }
}

/// The real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Start the clock at a local wall-clock time
    pub fn at_local(local: NaiveDateTime) -> Self {
        Self::new(local_to_utc(local))
    }

    /// Jump to a local wall-clock time
    pub fn set_local(&self, local: NaiveDateTime) {
        self.set(local_to_utc(local));
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.lock() {
            *guard = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.lock() {
            *guard += by;
        }
    }
}

impl Clock for ManualClock {
    fn now_utc(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Interpret a local wall-clock time as an instant
pub fn local_to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    (local - Duration::seconds(LOCAL_OFFSET_SECONDS as i64)).and_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn local(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_local_time_is_utc_plus_seven() {
        let utc = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(1, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(to_local(utc), local(8, 0, 0));
    }

    #[test]
    fn test_local_date_rolls_over_before_utc() {
        let utc = NaiveDate::from_ymd_opt(2023, 12, 31)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap()
            .and_utc();
        assert_eq!(to_local(utc).date(), NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }

    #[test]
    fn test_manual_clock_round_trips_local_time() {
        let clock = ManualClock::at_local(local(7, 59, 30));
        assert_eq!(clock.now_local(), local(7, 59, 30));

        clock.advance(Duration::seconds(40));
        assert_eq!(clock.now_local(), local(8, 0, 10));

        clock.set_local(local(8, 30, 0));
        assert_eq!(clock.now_local(), local(8, 30, 0));
    }
}
