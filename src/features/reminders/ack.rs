//! Acknowledgment token detection
//!
//! Every notification ends with its cycle key. A reply that quotes the key
//! (Telegram's reply/quote, or a copy-paste) acknowledges that cycle.

use regex::Regex;
use std::sync::OnceLock;

static TOKEN_RE: OnceLock<Regex> = OnceLock::new();

fn token_re() -> &'static Regex {
    TOKEN_RE.get_or_init(|| {
        Regex::new(r"\w{8}-\w{4}-\w{4}-\w{4}-\w{12}@\d{12}").expect("token pattern is valid")
    })
}

/// First cycle key embedded anywhere in `text`
pub fn find_cycle_token(text: &str) -> Option<&str> {
    token_re().find(text).map(|m| m.as_str())
}
