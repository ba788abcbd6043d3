//! Local JSON file store

use super::{Document, StateStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl StateStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self) -> Result<Document> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => Document::from_json_str(&raw)
                .with_context(|| format!("Failed to parse {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Document::default()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(doc)?;
        // Write-then-rename so a crash never leaves a truncated document
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
