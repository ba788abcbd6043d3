//! # State Store
//!
//! Whole-document persistence for reminders and cycles. Every load returns the
//! complete document and every save overwrites it; there are no partial updates.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: File and in-memory backends
//! - 1.0.0: Remote JSON bin over HTTP

pub mod document;
pub mod file;
pub mod http;
pub mod memory;

pub use document::Document;
pub use file::FileStore;
pub use http::HttpStore;
pub use memory::MemoryStore;

use crate::core::config::{Config, StoreKind};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Backend holding the single reminder document
///
/// Concurrent writers are last-writer-wins: the scheduler and the command path
/// each load, modify and save the whole document without coordination.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Fetch the full document
    async fn load(&self) -> Result<Document>;

    /// Overwrite the full document
    async fn save(&self, doc: &Document) -> Result<()>;
}

/// Build the store selected by configuration
pub fn from_config(config: &Config) -> Result<Arc<dyn StateStore>> {
    let store: Arc<dyn StateStore> = match &config.store {
        StoreKind::Pantry { url } => Arc::new(HttpStore::new(url, config.store_timeout)?),
        StoreKind::File { path } => Arc::new(FileStore::new(path.clone())),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}
