//! # Configuration
//!
//! Runtime settings loaded from the environment (and `.env` via dotenvy in the binary).
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Added file/memory state stores and the connector canary interval
//! - 1.0.0: Initial release with Telegram and remote JSON store settings

use anyhow::{anyhow, Context, Result};
use log::warn;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PANTRY_HOST: &str = "getpantry.cloud";
const DEFAULT_STATE_FILE: &str = "reminders.json";
const DEFAULT_TEMPLATE_DIR: &str = "config";

/// Which chat connector the bot talks through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorKind {
    Telegram,
    Mock,
}

/// Where the reminder document lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKind {
    /// Remote JSON bin, read and overwritten as a whole over HTTP
    Pantry { url: String },
    /// Local JSON file
    File { path: PathBuf },
    /// Process memory only (lost on restart)
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub connector: ConnectorKind,
    pub telegram_bot_token: Option<String>,
    /// Bot API server, the public one unless a local server is configured
    pub telegram_api_base: String,
    pub store: StoreKind,
    pub store_timeout: Duration,
    pub template_dir: PathBuf,
    pub tick_interval: Duration,
    pub poll_interval: Duration,
    /// Connector health-check cadence, `None` when disabled
    pub canary_interval: Option<Duration>,
    pub shutdown_grace: Duration,
    pub log_level: String,
}

impl Config {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let connector = match get("CONNECTOR").as_deref().map(str::to_lowercase).as_deref() {
            Some("telegram") => ConnectorKind::Telegram,
            None | Some("mock") => ConnectorKind::Mock,
            Some(other) => {
                warn!("Unknown CONNECTOR '{other}', falling back to mock connector");
                ConnectorKind::Mock
            }
        };

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN");
        if connector == ConnectorKind::Telegram && telegram_bot_token.is_none() {
            return Err(anyhow!(
                "TELEGRAM_BOT_TOKEN must be set when CONNECTOR=telegram"
            ));
        }

        let store = match get("STATE_STORE")
            .map(|s| s.to_lowercase())
            .as_deref()
            .unwrap_or("pantry")
        {
            "pantry" => {
                let url = match get("STATE_STORE_URL") {
                    Some(url) => url,
                    None => {
                        let host = get("PANTRY_HOST").unwrap_or_else(|| DEFAULT_PANTRY_HOST.to_string());
                        let bin_id = get("PANTRY_BIN_ID").ok_or_else(|| {
                            anyhow!("PANTRY_BIN_ID is not set (or set STATE_STORE_URL)")
                        })?;
                        format!("https://{host}/apiv1/pantry/{bin_id}")
                    }
                };
                StoreKind::Pantry { url }
            }
            "file" => StoreKind::File {
                path: PathBuf::from(
                    get("STATE_FILE").unwrap_or_else(|| DEFAULT_STATE_FILE.to_string()),
                ),
            },
            "memory" => StoreKind::Memory,
            other => return Err(anyhow!("Unsupported STATE_STORE '{other}'")),
        };

        let tick_interval = Duration::from_secs(parse_u64(&get, "TICK_INTERVAL_SECONDS", 30)?);
        if tick_interval.is_zero() {
            return Err(anyhow!("TICK_INTERVAL_SECONDS must be greater than zero"));
        }

        let canary_minutes = parse_u64(&get, "CANARY_INTERVAL_MINUTES", 10)?;

        Ok(Config {
            connector,
            telegram_bot_token,
            telegram_api_base: get("TELEGRAM_API_BASE")
                .unwrap_or_else(|| crate::connectors::telegram::DEFAULT_API_BASE.to_string()),
            store,
            store_timeout: Duration::from_secs(parse_u64(&get, "STORE_TIMEOUT_SECONDS", 10)?),
            template_dir: PathBuf::from(
                get("TEMPLATE_DIR").unwrap_or_else(|| DEFAULT_TEMPLATE_DIR.to_string()),
            ),
            tick_interval,
            poll_interval: Duration::from_secs(parse_u64(&get, "POLL_INTERVAL_SECONDS", 3)?),
            canary_interval: (canary_minutes > 0)
                .then(|| Duration::from_secs(canary_minutes * 60)),
            shutdown_grace: Duration::from_secs(parse_u64(&get, "SHUTDOWN_GRACE_SECONDS", 5)?),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn parse_u64<G>(get: &G, key: &str, default: u64) -> Result<u64>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
        None => Ok(default),
    }
}
