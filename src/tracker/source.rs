//! Where file changes come from
//!
//! `DirectoryScanner` polls the tracked directory and reports every regular
//! file modified in or after the given unix second, once per distinct
//! (mtime, size) version.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::UNIX_EPOCH;
use walkdir::WalkDir;

use crate::error::SourceError;
use crate::store::ChangeRecord;

#[async_trait]
pub trait ChangeSource: Send + Sync {
    /// Changes under `directory` modified at or after `since` (unix seconds)
    /// that have not been reported before.
    /// Returns `SourceError::NoChanges` when there are none.
    async fn query(&self, directory: &str, since: i64) -> Result<Vec<ChangeRecord>, SourceError>;

    fn close(&self);
}

struct ScannedFile {
    path: PathBuf,
    modified: i64,
    size: u64,
    version: Version,
}

/// Full-precision mtime plus size; a file is reported again only when this changes
type Version = (u128, u64);

#[derive(Default)]
pub struct DirectoryScanner {
    seen: Mutex<HashMap<PathBuf, Version>>,
}

impl DirectoryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember the files already present so later reports say UPDATED
    pub async fn prime(&self, directory: &str) -> Result<(), SourceError> {
        let files = scan(directory.to_string(), i64::MIN).await?;
        if let Ok(mut seen) = self.seen.lock() {
            seen.extend(files.into_iter().map(|f| (f.path, f.version)));
        }
        Ok(())
    }
}

#[async_trait]
impl ChangeSource for DirectoryScanner {
    async fn query(&self, directory: &str, since: i64) -> Result<Vec<ChangeRecord>, SourceError> {
        let mut files = scan(directory.to_string(), since).await?;
        files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));

        let mut seen = self.seen.lock().map_err(|_| SourceError::Scan {
            directory: directory.to_string(),
            message: "scanner state poisoned".to_string(),
        })?;

        let records: Vec<ChangeRecord> = files
            .into_iter()
            .filter_map(|file| {
                let action = match seen.insert(file.path.clone(), file.version) {
                    None => "CREATED",
                    Some(previous) if previous != file.version => "UPDATED",
                    // Same version already reported from the watermark second
                    Some(_) => return None,
                };
                Some(ChangeRecord::from([
                    ("target_path".to_string(), file.path.to_string_lossy().to_string()),
                    ("action".to_string(), action.to_string()),
                    ("time".to_string(), file.modified.to_string()),
                    ("size".to_string(), file.size.to_string()),
                ]))
            })
            .collect();

        if records.is_empty() {
            return Err(SourceError::NoChanges);
        }
        Ok(records)
    }

    fn close(&self) {
        if let Ok(mut seen) = self.seen.lock() {
            seen.clear();
        }
    }
}

/// Walk `directory` on the blocking pool, keeping files modified in or after `since`
async fn scan(directory: String, since: i64) -> Result<Vec<ScannedFile>, SourceError> {
    let dir = directory.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&dir).follow_links(false) {
            let entry = entry.map_err(|e| e.to_string())?;
            if !entry.file_type().is_file() {
                continue;
            }
            // Files can vanish between listing and stat
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .unwrap_or_default();
            let modified = mtime.as_secs() as i64;
            if modified >= since {
                files.push(ScannedFile {
                    path: entry.into_path(),
                    modified,
                    size: meta.len(),
                    version: (mtime.as_nanos(), meta.len()),
                });
            }
        }
        Ok::<_, String>(files)
    })
    .await;

    match result {
        Ok(Ok(files)) => Ok(files),
        Ok(Err(message)) => Err(SourceError::Scan { directory, message }),
        Err(e) => Err(SourceError::Scan {
            directory,
            message: format!("scan task failed: {}", e),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_new_files_then_updates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("b.txt"), "hi").unwrap();

        let scanner = DirectoryScanner::new();
        let records = scanner.query(&root, 0).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r["action"] == "CREATED"));
        assert!(records.iter().any(|r| r["target_path"].ends_with("a.txt") && r["size"] == "5"));

        // Nothing changed since the last report
        let err = scanner.query(&root, 0).await.unwrap_err();
        assert!(matches!(err, SourceError::NoChanges));

        std::fs::write(dir.path().join("a.txt"), "hello again").unwrap();
        let records = scanner.query(&root, 0).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["action"], "UPDATED");
        assert_eq!(records[0]["size"], "11");
    }

    #[tokio::test]
    async fn test_same_second_rewrite_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, "one").unwrap();

        let scanner = DirectoryScanner::new();
        let records = scanner.query(&root, 0).await.unwrap();
        let watermark: i64 = records[0]["time"].parse().unwrap();

        // Rewrite with a different size and pin the mtime to the watermark second
        std::fs::write(&file, "three").unwrap();
        let same_second = UNIX_EPOCH + std::time::Duration::from_secs(watermark as u64);
        std::fs::File::options()
            .write(true)
            .open(&file)
            .unwrap()
            .set_modified(same_second)
            .unwrap();

        let records = scanner.query(&root, watermark).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["action"], "UPDATED");
        assert_eq!(records[0]["size"], "5");
    }

    #[tokio::test]
    async fn test_nothing_newer_is_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let scanner = DirectoryScanner::new();
        let far_future = i64::MAX;
        let err = scanner
            .query(&dir.path().to_string_lossy(), far_future)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NoChanges));
    }

    #[tokio::test]
    async fn test_primed_files_are_updates() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().to_string();
        std::fs::write(dir.path().join("a.txt"), "hello").unwrap();

        let scanner = DirectoryScanner::new();
        scanner.prime(&root).await.unwrap();
        assert!(matches!(scanner.query(&root, 0).await, Err(SourceError::NoChanges)));

        std::fs::write(dir.path().join("a.txt"), "hello, world").unwrap();
        let records = scanner.query(&root, 0).await.unwrap();
        assert_eq!(records[0]["action"], "UPDATED");
    }

    #[tokio::test]
    async fn test_missing_directory_is_scan_error() {
        let scanner = DirectoryScanner::new();
        let err = scanner.query("/definitely/not/here", 0).await.unwrap_err();
        assert!(matches!(err, SourceError::Scan { .. }));
    }
}
