//! In-process store, used by the mock setup and by tests

use super::{Document, StateStore};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    doc: RwLock<Document>,
    saves: AtomicUsize,
    fail_loads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: Document) -> Self {
        Self {
            doc: RwLock::new(doc),
            ..Self::default()
        }
    }

    /// Current stored document
    pub async fn snapshot(&self) -> Document {
        self.doc.read().await.clone()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make subsequent loads fail, simulating an unreachable backend
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<Document> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(anyhow!("memory store is unavailable"));
        }
        Ok(self.doc.read().await.clone())
    }

    async fn save(&self, doc: &Document) -> Result<()> {
        *self.doc.write().await = doc.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
