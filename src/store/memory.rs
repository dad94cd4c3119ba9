use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{paginate, ChangeRecord, LogEntry, LogStore, StoredEntry};
use crate::error::StoreError;

/// Log store that lives only as long as the process
#[derive(Default)]
pub struct MemoryLogStore {
    entries: RwLock<Vec<StoredEntry>>,
    closed: AtomicBool,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn write(&self, details: ChangeRecord) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        self.entries
            .write()
            .await
            .push(StoredEntry::new(details, Utc::now()));
        Ok(())
    }

    async fn read_logs_paginated(&self, limit: i64, offset: u64) -> Result<Vec<LogEntry>, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        let entries = self.entries.read().await;
        Ok(paginate(&entries, limit, offset))
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_newest_first() {
        let store = MemoryLogStore::new();
        for name in ["a", "b", "c"] {
            let details = ChangeRecord::from([("target_path".to_string(), name.to_string())]);
            store.write(details).await.unwrap();
        }

        let logs = store.read_logs_paginated(2, 0).await.unwrap();
        let paths: Vec<&str> = logs.iter().map(|l| l.details["target_path"].as_str()).collect();
        assert_eq!(paths, vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_closed_store_rejects_writes() {
        let store = MemoryLogStore::new();
        store.close().await.unwrap();
        assert!(matches!(store.write(ChangeRecord::new()).await, Err(StoreError::Closed)));
    }
}
