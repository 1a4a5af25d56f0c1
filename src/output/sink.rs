//! Durable record sinks
//!
//! A sink receives each item that survives the item pipeline, once. The
//! canonical format is an append-only file of self-describing MessagePack
//! maps, one per item, readable with [`RecordReader`](crate::output::RecordReader).

use crate::state::lock;
use crate::{Item, SinkError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Destination for processed items
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Durably appends one item
    async fn save(&self, item: &Item) -> Result<(), SinkError>;

    /// Flushes buffered records; called once when the run ends
    async fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Append-only MessagePack record file
#[derive(Debug)]
pub struct MessagePackSink {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
}

impl MessagePackSink {
    /// Creates the file, truncating any previous content
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    /// Opens the file for appending, creating it if missing
    pub async fn append(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: tokio::sync::Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for MessagePackSink {
    async fn save(&self, item: &Item) -> Result<(), SinkError> {
        // Encode outside the lock; only the append is serialized
        let record = rmp_serde::to_vec_named(item)?;

        let mut file = self.file.lock().await;
        file.write_all(&record).await?;
        file.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let mut file = self.file.lock().await;
        file.flush().await?;
        file.sync_data().await?;
        Ok(())
    }
}

/// In-memory sink that keeps items in arrival order
#[derive(Debug, Default)]
pub struct MemorySink {
    items: Mutex<Vec<Item>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the received items
    pub fn items(&self) -> Vec<Item> {
        lock(&self.items).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.items).is_empty()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn save(&self, item: &Item) -> Result<(), SinkError> {
        lock(&self.items).push(item.clone());
        Ok(())
    }
}
