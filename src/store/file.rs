use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use super::{paginate, ChangeRecord, LogEntry, LogStore, StoredEntry};
use crate::error::StoreError;

/// Append-only JSON-lines log store
///
/// The whole file is loaded on open; each write appends one line.
pub struct FileLogStore {
    path: PathBuf,
    entries: RwLock<Vec<StoredEntry>>,
    file: Mutex<Option<File>>,
}

impl FileLogStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| StoreError::Open {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(open_err)?;
        }

        let mut entries = Vec::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                for (i, line) in content.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let entry: StoredEntry = serde_json::from_str(line)
                        .map_err(|source| StoreError::Corrupt { line: i + 1, source })?;
                    entries.push(entry);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(open_err(e)),
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(open_err)?;

        tracing::info!("Opened log store {} ({} entries)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            file: Mutex::new(Some(file)),
        })
    }
}

#[async_trait]
impl LogStore for FileLogStore {
    async fn write(&self, details: ChangeRecord) -> Result<(), StoreError> {
        let stored = StoredEntry::new(details, Utc::now());
        let mut line = serde_json::to_string(&stored).map_err(|e| StoreError::Write(e.to_string()))?;
        line.push('\n');

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(StoreError::Closed)?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| StoreError::Write(e.to_string()))?;
        file.flush().await.map_err(|e| StoreError::Write(e.to_string()))?;

        // Push while still holding the file lock so memory and disk agree on order
        self.entries.write().await.push(stored);
        Ok(())
    }

    async fn read_logs_paginated(&self, limit: i64, offset: u64) -> Result<Vec<LogEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(paginate(&entries, limit, offset))
    }

    async fn close(&self) -> Result<(), StoreError> {
        if let Some(file) = self.file.lock().await.take() {
            file.sync_all()
                .await
                .map_err(|e| StoreError::Write(e.to_string()))?;
            tracing::debug!("Closed log store {}", self.path.display());
        }
        Ok(())
    }
}
