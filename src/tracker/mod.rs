//! File change tracker
//!
//! A timer task asks the change source for everything newer than the last
//! processed timestamp and writes each change to the log store.

pub mod source;

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{SourceError, TrackerError};
use crate::store::{LogEntry, LogStore};
use source::ChangeSource;

/// Grace period on top of the check frequency before the timer counts as dead
const HEARTBEAT_GRACE: Duration = Duration::from_secs(30);

pub struct FileChangesTracker {
    directory: String,
    check_frequency: Duration,
    source: Arc<dyn ChangeSource>,
    store: Arc<dyn LogStore>,
    last_processed: tokio::sync::Mutex<i64>,
    heartbeat: Mutex<Option<Instant>>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl FileChangesTracker {
    pub fn new(
        directory: impl Into<String>,
        check_frequency: Duration,
        source: Arc<dyn ChangeSource>,
        store: Arc<dyn LogStore>,
    ) -> Self {
        Self {
            directory: directory.into(),
            check_frequency,
            source,
            store,
            last_processed: tokio::sync::Mutex::new(chrono::Utc::now().timestamp()),
            heartbeat: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Spawn the timer task; it runs until `stop` or until `parent` is cancelled
    pub fn start(self: &Arc<Self>, parent: &CancellationToken) {
        let token = parent.child_token();
        let tracker = Arc::clone(self);
        let timer_token = token.clone();
        let handle = tokio::spawn(async move { tracker.timer_loop(timer_token).await });

        if let Ok(mut task) = self.task.lock() {
            *task = Some((token, handle));
        }
    }

    /// Cancel the timer task, wait for it and close the change source
    pub async fn stop(&self) {
        let task = self.task.lock().ok().and_then(|mut t| t.take());
        if let Some((token, handle)) = task {
            token.cancel();
            if let Err(e) = handle.await {
                tracing::warn!("File watcher task ended abnormally: {}", e);
            }
        }
        self.source.close();
    }

    async fn timer_loop(&self, token: CancellationToken) {
        self.beat();
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!("file-watcher-shutdown");
                    return;
                }
                _ = tokio::time::sleep(self.check_frequency) => {
                    self.beat();
                    if let Err(e) = self.check_file_changes().await {
                        tracing::error!("error-checking-file-changes: {}", e);
                    }
                }
            }
        }
    }

    fn beat(&self) {
        if let Ok(mut heartbeat) = self.heartbeat.lock() {
            *heartbeat = Some(Instant::now());
        }
    }

    /// Record every change since the last processed second; the source skips
    /// versions it already reported
    pub async fn check_file_changes(&self) -> Result<(), TrackerError> {
        let mut last_processed = self.last_processed.lock().await;

        let rows = match self.source.query(&self.directory, *last_processed).await {
            Ok(rows) => rows,
            Err(SourceError::NoChanges) => return Ok(()),
            Err(e) => return Err(TrackerError::Query(e)),
        };

        for row in rows {
            tracing::debug!(
                target_path = row.get("target_path").map(String::as_str).unwrap_or(""),
                "new change detected"
            );

            let change_time = row.get("time").and_then(|t| t.parse::<i64>().ok());
            self.store.write(row).await.map_err(TrackerError::Write)?;

            if let Some(change_time) = change_time {
                if change_time > *last_processed {
                    *last_processed = change_time;
                }
            }
        }

        Ok(())
    }

    pub fn is_timer_thread_alive(&self) -> bool {
        let deadline = self.check_frequency + HEARTBEAT_GRACE;
        self.heartbeat
            .lock()
            .ok()
            .and_then(|h| *h)
            .map(|beat| beat.elapsed() < deadline)
            .unwrap_or(false)
    }

    pub async fn get_logs(&self, limit: i64, offset: u64) -> Result<Vec<LogEntry>, TrackerError> {
        self.store.read_logs_paginated(limit, offset).await.map_err(|e| {
            tracing::error!("error-loading-from-log-store: {}", e);
            TrackerError::Read(e)
        })
    }
}
