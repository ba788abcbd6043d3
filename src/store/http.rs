//! Remote JSON document store (Pantry-style bin: GET returns it, PUT replaces it)

use super::{Document, StateStore};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use std::time::Duration;

pub struct HttpStore {
    client: reqwest::Client,
    url: String,
}

impl HttpStore {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client for state store")?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl StateStore for HttpStore {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn load(&self) -> Result<Document> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("State store GET failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("State store GET returned HTTP {}", status));
        }

        let body = response
            .text()
            .await
            .context("Failed to read state store response body")?;
        debug!("Loaded state document ({} bytes)", body.len());

        // An invalid body must not be treated as empty, or the next save would
        // wipe the remote document.
        Document::from_json_str(&body)
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        let response = self
            .client
            .put(&self.url)
            .json(doc)
            .send()
            .await
            .context("State store PUT failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("State store PUT returned HTTP {}", status));
        }

        debug!(
            "Saved state document ({} reminders, {} cycles)",
            doc.reminders.len(),
            doc.cycles.len()
        );
        Ok(())
    }
}
