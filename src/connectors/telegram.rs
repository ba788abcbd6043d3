//! # Telegram Connector
//!
//! Bot API over HTTPS: long-polled `getUpdates`, `sendMessage` with a short
//! timeout-only retry, and `getMe` as the health check.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0

use super::{Connector, InboundMessage, MessageSink};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Server-side long-poll duration passed to getUpdates
const LONG_POLL_SECONDS: u64 = 25;
/// Client timeout for getUpdates, longer than the long poll itself
const POLL_TIMEOUT: Duration = Duration::from_secs(35);
const SEND_TIMEOUT: Duration = Duration::from_secs(12);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(8);

const SEND_ATTEMPTS: u32 = 3;
const SEND_INITIAL_DELAY: Duration = Duration::from_millis(1000);
const SEND_BACKOFF_FACTOR: f64 = 1.8;

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TgMessage>,
    edited_message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

pub struct TelegramConnector {
    client: reqwest::Client,
    api_base: String,
    token: String,
    /// Highest update id seen so far, 0 before the first update
    offset: AtomicI64,
    send_timeout: Duration,
    send_initial_delay: Duration,
}

impl TelegramConnector {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Talk to a Bot API server other than the public one
    pub fn with_api_base(token: &str, api_base: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            offset: AtomicI64::new(0),
            send_timeout: SEND_TIMEOUT,
            send_initial_delay: SEND_INITIAL_DELAY,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn send_once(&self, payload: &serde_json::Value) -> reqwest::Result<ApiResponse<serde_json::Value>> {
        self.client
            .post(self.method_url("sendMessage"))
            .timeout(self.send_timeout)
            .json(payload)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }
}

/// Turn a getUpdates batch into text messages, advancing the offset
fn extract_messages(updates: Vec<Update>, offset: &AtomicI64) -> Vec<InboundMessage> {
    let mut messages = Vec::new();

    for update in updates {
        offset.fetch_max(update.update_id, Ordering::SeqCst);

        let Some(msg) = update.message.or(update.edited_message) else {
            continue;
        };
        let Some(text) = msg.text.filter(|t| !t.is_empty()) else {
            continue;
        };

        messages.push(InboundMessage {
            thread_id: msg.chat.id.to_string(),
            sender_id: msg.from.map(|u| u.id.to_string()).unwrap_or_default(),
            text,
        });
    }

    messages
}

#[async_trait]
impl MessageSink for TelegramConnector {
    async fn send_message(&self, thread_id: &str, text: &str) -> Result<()> {
        let payload = serde_json::json!({
            "chat_id": thread_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        let mut delay = self.send_initial_delay;
        let mut last_error = None;

        for attempt in 1..=SEND_ATTEMPTS {
            match self.send_once(&payload).await {
                Ok(resp) if resp.ok => return Ok(()),
                Ok(resp) => {
                    return Err(anyhow!(
                        "Telegram rejected sendMessage: {}",
                        resp.description.unwrap_or_else(|| "no description".to_string())
                    ))
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_error = Some(e);
                    if attempt == SEND_ATTEMPTS {
                        break;
                    }
                    warn!(
                        "sendMessage to {} timed out (attempt {}/{}), retrying in {:?}",
                        thread_id, attempt, SEND_ATTEMPTS, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.mul_f64(SEND_BACKOFF_FACTOR);
                }
                Err(e) => return Err(e).context("Telegram sendMessage failed"),
            }
        }

        match last_error {
            Some(e) => Err(e).context(format!(
                "Telegram sendMessage still timing out after {} attempts",
                SEND_ATTEMPTS
            )),
            None => Err(anyhow!("Telegram sendMessage failed")),
        }
    }
}

#[async_trait]
impl Connector for TelegramConnector {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn get_new_messages(&self) -> Result<Vec<InboundMessage>> {
        let mut query = vec![("timeout", LONG_POLL_SECONDS.to_string())];
        let offset = self.offset.load(Ordering::SeqCst);
        if offset > 0 {
            query.push(("offset", (offset + 1).to_string()));
        }

        let response = match self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .timeout(POLL_TIMEOUT)
            .send()
            .await
        {
            Ok(r) => r,
            // An expired long poll is routine
            Err(e) if e.is_timeout() => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Telegram getUpdates failed"),
        };

        let body: ApiResponse<Vec<Update>> = response
            .error_for_status()
            .context("Telegram getUpdates returned an error status")?
            .json()
            .await
            .context("Failed to decode getUpdates response")?;

        if !body.ok {
            warn!(
                "getUpdates not ok: {}",
                body.description.as_deref().unwrap_or("no description")
            );
            return Ok(Vec::new());
        }

        let messages = extract_messages(body.result.unwrap_or_default(), &self.offset);
        if !messages.is_empty() {
            debug!("Received {} Telegram message(s)", messages.len());
        }
        Ok(messages)
    }

    async fn health_check(&self) -> bool {
        let result = self
            .client
            .get(self.method_url("getMe"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => resp
                .json::<ApiResponse<serde_json::Value>>()
                .await
                .map(|body| body.ok)
                .unwrap_or(false),
            Ok(resp) => {
                warn!("getMe returned HTTP {}", resp.status());
                false
            }
            Err(e) => {
                warn!("getMe failed: {}", e);
                false
            }
        }
    }

    fn as_sink(self: Arc<Self>) -> Arc<dyn MessageSink> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_extract_messages_tracks_offset_and_skips_non_text() {
        let raw = r#"[
            {"update_id": 10, "message": {"chat": {"id": -100}, "from": {"id": 7}, "text": "nhắc 8h \"đi chơi\""}},
            {"update_id": 12, "message": {"chat": {"id": 5}, "from": {"id": 5}}},
            {"update_id": 11, "edited_message": {"chat": {"id": 5}, "from": {"id": 5}, "text": "sửa"}},
            {"update_id": 13, "callback_query": {}}
        ]"#;
        let updates: Vec<Update> = serde_json::from_str(raw).unwrap();
        let offset = AtomicI64::new(0);

        let messages = extract_messages(updates, &offset);

        assert_eq!(offset.load(Ordering::SeqCst), 13);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].thread_id, "-100");
        assert_eq!(messages[0].sender_id, "7");
        assert_eq!(messages[1].text, "sửa");
    }

    #[test]
    fn test_method_url() {
        let connector = TelegramConnector::new("123:abc").unwrap();
        assert_eq!(
            connector.method_url("getMe"),
            "https://api.telegram.org/bot123:abc/getMe"
        );

        let local = TelegramConnector::with_api_base("123:abc", "http://127.0.0.1:8081/").unwrap();
        assert_eq!(local.method_url("getMe"), "http://127.0.0.1:8081/bot123:abc/getMe");
    }

    #[tokio::test]
    async fn test_send_message_posts_to_chat() {
        let server = MockServer::start();
        let send = server.mock(|when, then| {
            when.method(POST)
                .path("/bottoken/sendMessage")
                .json_body_includes(json!({"chat_id": "-100", "text": "đi chơi"}).to_string());
            then.status(200).json_body(json!({"ok": true, "result": {"message_id": 1}}));
        });

        let connector = TelegramConnector::with_api_base("token", &server.base_url()).unwrap();
        connector.send_message("-100", "đi chơi").await.unwrap();

        send.assert_calls(1);
    }

    #[tokio::test]
    async fn test_send_message_rejection_is_not_retried() {
        let server = MockServer::start();
        let send = server.mock(|when, then| {
            when.method(POST).path("/bottoken/sendMessage");
            then.status(200)
                .json_body(json!({"ok": false, "description": "Bad Request: chat not found"}));
        });

        let connector = TelegramConnector::with_api_base("token", &server.base_url()).unwrap();
        let err = connector.send_message("404", "hi").await.unwrap_err();

        assert!(err.to_string().contains("chat not found"));
        send.assert_calls(1);
    }

    #[tokio::test]
    async fn test_send_message_gives_up_after_timeouts_without_final_wait() {
        let server = MockServer::start();
        let send = server.mock(|when, then| {
            when.method(POST).path("/bottoken/sendMessage");
            then.status(200)
                .delay(Duration::from_millis(500))
                .json_body(json!({"ok": true}));
        });

        let mut connector = TelegramConnector::with_api_base("token", &server.base_url()).unwrap();
        connector.send_timeout = Duration::from_millis(50);
        connector.send_initial_delay = Duration::from_millis(300);

        let started = std::time::Instant::now();
        assert!(connector.send_message("c", "hi").await.is_err());
        let elapsed = started.elapsed();

        send.assert_calls(SEND_ATTEMPTS as usize);
        // Waits of 300 ms and 540 ms between attempts, none after the last
        assert!(elapsed >= Duration::from_millis(840));
        assert!(elapsed < Duration::from_millis(1600), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_get_new_messages_advances_offset() {
        let server = MockServer::start();
        let mut first = server.mock(|when, then| {
            when.method(GET)
                .path("/bottoken/getUpdates")
                .query_param("timeout", "25");
            then.status(200).json_body(json!({
                "ok": true,
                "result": [{
                    "update_id": 41,
                    "message": {"chat": {"id": 5}, "from": {"id": 9}, "text": "danh sách"}
                }]
            }));
        });

        let connector = TelegramConnector::with_api_base("token", &server.base_url()).unwrap();

        let messages = connector.get_new_messages().await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].thread_id, "5");
        assert_eq!(messages[0].sender_id, "9");
        first.assert_calls(1);
        first.delete();

        let second = server.mock(|when, then| {
            when.method(GET)
                .path("/bottoken/getUpdates")
                .query_param("timeout", "25")
                .query_param("offset", "42");
            then.status(200).json_body(json!({"ok": true, "result": []}));
        });

        assert!(connector.get_new_messages().await.unwrap().is_empty());
        second.assert_calls(1);
    }

    #[tokio::test]
    async fn test_health_check_follows_get_me() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/botgood/getMe");
            then.status(200).json_body(json!({"ok": true, "result": {"id": 1, "is_bot": true}}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/botbad/getMe");
            then.status(401).json_body(json!({"ok": false, "description": "Unauthorized"}));
        });

        let good = TelegramConnector::with_api_base("good", &server.base_url()).unwrap();
        let bad = TelegramConnector::with_api_base("bad", &server.base_url()).unwrap();

        assert!(good.health_check().await);
        assert!(!bad.health_check().await);
    }
}
