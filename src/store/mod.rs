//! Log entry storage
//!
//! Every detected file change becomes one `LogEntry`. Entries are read back
//! newest first, ordered by the full-precision write time.

mod file;
mod memory;

pub use file::FileLogStore;
pub use memory::MemoryLogStore;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::StoreError;

/// Page size used when the caller asks for fewer than one entry
pub const DEFAULT_PAGE_SIZE: i64 = 10;

/// Flat key/value description of one change
pub type ChangeRecord = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    pub details: ChangeRecord,
    #[serde(rename = "logTime")]
    pub log_time: String,
}

/// On-disk form of an entry; `created_at` never leaves the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredEntry {
    #[serde(flatten)]
    pub entry: LogEntry,
    pub created_at: DateTime<Utc>,
}

impl StoredEntry {
    /// Build a new entry for `details`, taking `logTime` from the `time`
    /// detail (unix seconds) when it parses
    pub fn new(details: ChangeRecord, now: DateTime<Utc>) -> Self {
        let log_time = details
            .get("time")
            .and_then(|t| t.parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(now);

        Self {
            entry: LogEntry {
                id: uuid::Uuid::new_v4().to_string(),
                details,
                log_time: log_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            created_at: now,
        }
    }
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn write(&self, details: ChangeRecord) -> Result<(), StoreError>;

    async fn read_logs_paginated(&self, limit: i64, offset: u64) -> Result<Vec<LogEntry>, StoreError>;

    async fn close(&self) -> Result<(), StoreError>;
}

/// Newest-first page of `entries`
pub(crate) fn paginate(entries: &[StoredEntry], limit: i64, offset: u64) -> Vec<LogEntry> {
    let limit = if limit < 1 { DEFAULT_PAGE_SIZE } else { limit };

    let mut sorted: Vec<&StoredEntry> = entries.iter().collect();
    // Stable sort keeps insertion order for equal timestamps; reverse it so
    // later writes still come first.
    sorted.reverse();
    sorted.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    sorted
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .map(|s| s.entry.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn details(path: &str, time: &str) -> ChangeRecord {
        BTreeMap::from([
            ("target_path".to_string(), path.to_string()),
            ("time".to_string(), time.to_string()),
        ])
    }

    #[test]
    fn test_log_time_from_change_time() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let stored = StoredEntry::new(details("/tmp/a", "1700000000"), now);
        assert_eq!(stored.entry.log_time, "2023-11-14T22:13:20Z");

        let stored = StoredEntry::new(details("/tmp/a", "soon"), now);
        assert_eq!(stored.entry.log_time, "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_entry_json_shape() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let stored = StoredEntry::new(details("/tmp/a", "1700000000"), now);
        let json = serde_json::to_value(&stored.entry).unwrap();

        assert!(json.get("id").is_some());
        assert_eq!(json["logTime"], "2023-11-14T22:13:20Z");
        assert_eq!(json["details"]["target_path"], "/tmp/a");
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn test_paginate_newest_first() {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let entries: Vec<StoredEntry> = (0..15)
            .map(|i| StoredEntry::new(details(&format!("/f{i}"), "x"), base + chrono::Duration::seconds(i)))
            .collect();

        let page = paginate(&entries, 2, 0);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].details["target_path"], "/f14");
        assert_eq!(page[1].details["target_path"], "/f13");

        let page = paginate(&entries, 3, 13);
        assert_eq!(page.len(), 2);
        assert_eq!(page[1].details["target_path"], "/f0");

        assert_eq!(paginate(&entries, 0, 0).len(), DEFAULT_PAGE_SIZE as usize);
        assert!(paginate(&entries, 5, 100).is_empty());
    }
}
