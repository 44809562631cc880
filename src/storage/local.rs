//! Local filesystem storage implementation.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── subscribers.json      # Subscriber records
//! ├── settings.json         # {"offset": <cursor>}
//! └── snapshots/            # Append-only history
//!     └── YYYY/
//!         └── MM.json
//! ```
//!
//! Every file is rewritten atomically (temp file, then rename) and all
//! read-modify-write sequences hold the instance lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{Snapshot, Subscriber};
use crate::storage::Storage;

const SUBSCRIBERS: &str = "subscribers.json";
const SETTINGS: &str = "settings.json";
const SNAPSHOTS: &str = "snapshots";

#[derive(Debug, Default, Serialize, Deserialize)]
struct Settings {
    #[serde(default)]
    offset: Option<i64>,
}

/// Local filesystem storage backend.
#[derive(Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| AppError::storage(format!("{}: {}", key, e))),
            None => Ok(None),
        }
    }

    /// Archive key for a given year/month.
    fn month_key(year: i32, month: u32) -> String {
        format!("{}/{}/{:02}.json", SNAPSHOTS, year, month)
    }

    async fn read_month(&self, year: i32, month: u32) -> Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .read_json(&Self::month_key(year, month))
            .await?
            .unwrap_or_default();
        snapshots.sort_by_key(|s| s.taken_at);
        Ok(snapshots)
    }

    /// Every `(year, month)` with a snapshot file, oldest first.
    async fn months(&self) -> Result<Vec<(i32, u32)>> {
        let mut months = Vec::new();
        for (year, year_dir) in numbered_entries(&self.path(SNAPSHOTS), None).await? {
            for (month, _) in numbered_entries(&year_dir, Some("json")).await? {
                months.push((year as i32, month));
            }
        }
        months.sort_unstable();
        Ok(months)
    }
}

/// Entries of `dir` whose stem is a number, with an optional extension filter.
async fn numbered_entries(dir: &Path, extension: Option<&str>) -> Result<Vec<(u32, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(AppError::Io(e)),
    };

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != extension {
            continue;
        }
        if let Some(n) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        {
            found.push((n, path));
        }
    }
    Ok(found)
}

#[async_trait]
impl Storage for LocalStorage {
    async fn subscriber(&self, chat_id: i64) -> Result<Option<Subscriber>> {
        Ok(self
            .subscribers()
            .await?
            .into_iter()
            .find(|s| s.chat_id == chat_id))
    }

    async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self.read_json(SUBSCRIBERS).await?.unwrap_or_default())
    }

    async fn put_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut all: Vec<Subscriber> = self.read_json(SUBSCRIBERS).await?.unwrap_or_default();
        match all.iter_mut().find(|s| s.chat_id == subscriber.chat_id) {
            Some(existing) => *existing = subscriber.clone(),
            None => all.push(subscriber.clone()),
        }
        self.write_json(SUBSCRIBERS, &all).await
    }

    async fn cursor(&self) -> Result<Option<i64>> {
        Ok(self
            .read_json::<Settings>(SETTINGS)
            .await?
            .and_then(|s| s.offset))
    }

    async fn set_cursor(&self, cursor: i64) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut settings: Settings = self.read_json(SETTINGS).await?.unwrap_or_default();
        if settings.offset.is_some_and(|current| current >= cursor) {
            return Ok(());
        }
        settings.offset = Some(cursor);
        self.write_json(SETTINGS, &settings).await
    }

    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let _guard = self.lock.lock().await;
        let (year, month) = (snapshot.taken_at.year(), snapshot.taken_at.month());
        let mut snapshots = self.read_month(year, month).await?;
        snapshots.push(snapshot.clone());
        self.write_json(&Self::month_key(year, month), &snapshots).await?;
        log::debug!(
            "Stored snapshot {} in {}",
            snapshot.short_digest(),
            Self::month_key(year, month)
        );
        Ok(())
    }

    async fn latest_snapshots(&self, n: usize) -> Result<Vec<Snapshot>> {
        let mut latest = Vec::new();
        for (year, month) in self.months().await?.into_iter().rev() {
            if latest.len() >= n {
                break;
            }
            let snapshots = self.read_month(year, month).await?;
            latest.extend(snapshots.into_iter().rev().take(n - latest.len()));
        }
        Ok(latest)
    }

    async fn snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>> {
        let first = (from.year(), from.month());
        let last = (to.year(), to.month());

        let mut found = Vec::new();
        for (year, month) in self.months().await? {
            if (year, month) < first || (year, month) > last {
                continue;
            }
            found.extend(
                self.read_month(year, month)
                    .await?
                    .into_iter()
                    .filter(|s| s.taken_at >= from && s.taken_at <= to),
            );
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("nested/test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("nested/test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(!tmp.path().join("nested/test.tmp").exists());
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.read_bytes("nope.txt").await.unwrap().is_none());
        assert!(storage.subscribers().await.unwrap().is_empty());
        assert_eq!(storage.cursor().await.unwrap(), None);
        assert!(storage.latest_snapshots(3).await.unwrap().is_empty());
        assert_eq!(storage.latest_data().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_subscribers_upsert_in_creation_order() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.put_subscriber(&Subscriber::new(10)).await.unwrap();
        storage.put_subscriber(&Subscriber::new(20)).await.unwrap();

        let mut updated = storage.subscriber(10).await.unwrap().unwrap();
        updated.flags = "1111".parse().unwrap();
        storage.put_subscriber(&updated).await.unwrap();

        let all = storage.subscribers().await.unwrap();
        assert_eq!(all.iter().map(|s| s.chat_id).collect::<Vec<_>>(), [10, 20]);
        assert_eq!(all[0].flags.to_string(), "1111");

        let raw = std::fs::read_to_string(tmp.path().join(SUBSCRIBERS)).unwrap();
        assert!(raw.contains("\"1111\""));
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backward() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.set_cursor(41).await.unwrap();
        storage.set_cursor(40).await.unwrap();
        assert_eq!(storage.cursor().await.unwrap(), Some(41));

        storage.set_cursor(45).await.unwrap();
        assert_eq!(LocalStorage::new(tmp.path()).cursor().await.unwrap(), Some(45));
    }

    #[tokio::test]
    async fn test_snapshots_partitioned_by_month() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        for (when, data) in [
            (at(2025, 12, 30), "a"),
            (at(2026, 1, 2), "b"),
            (at(2026, 1, 20), "c"),
            (at(2026, 2, 1), "d"),
        ] {
            storage
                .append_snapshot(&Snapshot::at(when, data.to_string()))
                .await
                .unwrap();
        }

        assert!(tmp.path().join("snapshots/2025/12.json").exists());
        assert!(tmp.path().join("snapshots/2026/01.json").exists());

        let latest = storage.latest_snapshots(3).await.unwrap();
        let data: Vec<_> = latest.iter().map(|s| s.data.as_str()).collect();
        assert_eq!(data, ["d", "c", "b"]);
        assert_eq!(storage.latest_data().await.unwrap(), "d");

        let range = storage
            .snapshots_between(at(2025, 12, 31), at(2026, 1, 20))
            .await
            .unwrap();
        let data: Vec<_> = range.iter().map(|s| s.data.as_str()).collect();
        assert_eq!(data, ["b", "c"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_storage_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SUBSCRIBERS), "{not json").unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(matches!(
            storage.subscribers().await,
            Err(AppError::Storage(_))
        ));
    }
}
