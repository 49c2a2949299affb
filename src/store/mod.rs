// src/store/mod.rs
//! Blob namespace the stages read raw records from and publish dated
//! documents to. Backends are built from explicit `StoreConfig` values.

pub mod fs;
pub mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::artifact;
use crate::error::Result;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Where a container lives. One directory per container under `root`.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub container: String,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Write `bytes` under `name`, replacing any previous blob. Readers never
    /// observe a partially written blob.
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    async fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// All blob names, sorted.
    async fn list(&self) -> Result<Vec<String>>;

    /// Blob names carrying exactly `date`.
    async fn list_for_date(&self, date: NaiveDate) -> Result<Vec<String>> {
        let names = self.list().await?;
        Ok(names
            .into_iter()
            .filter(|n| artifact::matches_date(n, date))
            .collect())
    }

    fn describe(&self) -> String;
}
