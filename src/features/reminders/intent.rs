//! Reminder command parsing
//!
//! Turns free chat text into a create / cancel / nothing intent. The grammar is
//! informal Vietnamese with a few English phrases:
//!
//! - `nhắc [nhở] [vào|lúc] <time> [<day>/<month>] [hằng ngày|mỗi ngày|every day] ... "<text>"`
//! - `nhắc ... <time> ...: <text>` (text after a colon, to end of message)
//! - `tắt nhắc nhở lúc <time>`
//!
//! `<time>` is `8`, `08`, `8:30`, `8h30` or `8h`. Dates take the current local
//! year and may be written `5/3`, `5-3`, `5 th 3` or `5 tháng 3`.

use super::model::TimeOfDay;
use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const TIME_PATTERN: &str = r"(?P<hour>\d{1,2})(?:(?::|h)(?P<minute>\d{1,2})|h)?";
const DATE_PATTERN: &str = r"(?P<day>\d{1,2})\s*(?:/|-|th(?:áng)?|tháng)\s*(?P<month>\d{1,2})";

static CANCEL_RE: OnceLock<Regex> = OnceLock::new();
static CREATE_RE: OnceLock<Regex> = OnceLock::new();
static DAILY_RE: OnceLock<Regex> = OnceLock::new();

fn cancel_re() -> &'static Regex {
    CANCEL_RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)tắt\s+nhắc\s*nhở\s*lúc\s*{TIME_PATTERN}"))
            .expect("cancel pattern is valid")
    })
}

fn create_re() -> &'static Regex {
    CREATE_RE.get_or_init(|| {
        Regex::new(&format!(
            r#"(?i)nhắc(?:\s*nhở)?(?:\s+vào|\s+lúc)?\s*{TIME_PATTERN}(?:\s+{DATE_PATTERN})?(?P<gap>.*?)(?:với\s*nội\s*dung\s*)?(?:["“](?P<quoted>[^"”]+)["”]|:(?P<tail>[\s\S]+)$)"#
        ))
        .expect("create pattern is valid")
    })
}

fn daily_re() -> &'static Regex {
    DAILY_RE.get_or_init(|| {
        Regex::new(r"(?i)hằng\s*ngày|mỗi\s*ngày|every\s*day").expect("daily pattern is valid")
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentRepeat {
    Daily,
    /// Single firing on an explicit date
    Once,
    /// Single firing today
    OnceToday,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateIntent {
    pub time: TimeOfDay,
    pub date: Option<NaiveDate>,
    pub repeat: IntentRepeat,
    /// May be empty; the service substitutes the default text
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Create(CreateIntent),
    /// Cancel every reminder of the sender at this time of day
    Cancel { time: TimeOfDay },
    /// Ordinary conversation
    None,
}

/// Parse a chat message; `today` supplies the year for explicit dates
pub fn parse(text: &str, today: NaiveDate) -> Intent {
    if let Some(caps) = cancel_re().captures(text) {
        return match capture_time(&caps) {
            Some(time) => Intent::Cancel { time },
            None => Intent::None,
        };
    }

    let Some(caps) = create_re().captures(text) else {
        return Intent::None;
    };

    let Some(time) = capture_time(&caps) else {
        return Intent::None;
    };

    let date = match (caps.name("day"), caps.name("month")) {
        (Some(day), Some(month)) => {
            let parsed = day
                .as_str()
                .parse::<u32>()
                .ok()
                .zip(month.as_str().parse::<u32>().ok())
                .and_then(|(d, m)| NaiveDate::from_ymd_opt(today.year(), m, d));
            match parsed {
                Some(date) => Some(date),
                None => return Intent::None,
            }
        }
        _ => None,
    };

    let daily = caps
        .name("gap")
        .is_some_and(|gap| daily_re().is_match(gap.as_str()));

    let body = caps
        .name("quoted")
        .or_else(|| caps.name("tail"))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let repeat = if daily {
        IntentRepeat::Daily
    } else if date.is_some() {
        IntentRepeat::Once
    } else {
        IntentRepeat::OnceToday
    };

    Intent::Create(CreateIntent {
        time,
        date,
        repeat,
        text: body,
    })
}

fn capture_time(caps: &Captures<'_>) -> Option<TimeOfDay> {
    let hour = caps.name("hour")?.as_str().parse::<u32>().ok()?;
    let minute = match caps.name("minute") {
        Some(m) => m.as_str().parse::<u32>().ok()?,
        None => 0,
    };
    TimeOfDay::new(hour, minute)
}
