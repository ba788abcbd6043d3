//! In-memory connector for local runs and tests

use super::{Connector, InboundMessage, MessageSink};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MockConnector {
    inbox: Mutex<Vec<InboundMessage>>,
    sent: Mutex<Vec<(String, String)>>,
    fail_sends: AtomicBool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message for the next poll
    pub async fn inject_message(&self, thread_id: &str, sender_id: &str, text: &str) {
        self.inbox
            .lock()
            .await
            .push(InboundMessage::new(thread_id, sender_id, text));
    }

    /// Every `(thread_id, text)` pair sent so far
    pub async fn sent_messages(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    /// Make subsequent sends fail, simulating a platform outage
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageSink for MockConnector {
    async fn send_message(&self, thread_id: &str, text: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(anyhow!("mock send to {} failed", thread_id));
        }
        self.sent
            .lock()
            .await
            .push((thread_id.to_string(), text.to_string()));
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn get_new_messages(&self) -> Result<Vec<InboundMessage>> {
        Ok(std::mem::take(&mut *self.inbox.lock().await))
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn as_sink(self: Arc<Self>) -> Arc<dyn MessageSink> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_are_delivered_once() {
        let mock = MockConnector::new();
        mock.inject_message("t1", "u1", "hello").await;
        mock.inject_message("t2", "u2", "xin chào").await;

        let first = mock.get_new_messages().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[1], InboundMessage::new("t2", "u2", "xin chào"));
        assert!(mock.get_new_messages().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sends_are_recorded_unless_failing() {
        let mock = MockConnector::new();
        mock.send_message("t1", "one").await.unwrap();

        mock.set_fail_sends(true);
        assert!(mock.send_message("t1", "two").await.is_err());

        assert_eq!(
            mock.sent_messages().await,
            vec![("t1".to_string(), "one".to_string())]
        );
    }
}
