//! In-process storage for tests and dry runs.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Snapshot, Subscriber};
use crate::storage::Storage;

#[derive(Default)]
struct State {
    subscribers: Vec<Subscriber>,
    cursor: Option<i64>,
    snapshots: Vec<Snapshot>,
}

/// Storage backend that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStorage {
    state: Mutex<State>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subscribers(subscribers: Vec<Subscriber>) -> Self {
        Self {
            state: Mutex::new(State {
                subscribers,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn subscriber(&self, chat_id: i64) -> Result<Option<Subscriber>> {
        Ok(self
            .state()
            .subscribers
            .iter()
            .find(|s| s.chat_id == chat_id)
            .cloned())
    }

    async fn subscribers(&self) -> Result<Vec<Subscriber>> {
        Ok(self.state().subscribers.clone())
    }

    async fn put_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
        let mut state = self.state();
        match state
            .subscribers
            .iter_mut()
            .find(|s| s.chat_id == subscriber.chat_id)
        {
            Some(existing) => *existing = subscriber.clone(),
            None => state.subscribers.push(subscriber.clone()),
        }
        Ok(())
    }

    async fn cursor(&self) -> Result<Option<i64>> {
        Ok(self.state().cursor)
    }

    async fn set_cursor(&self, cursor: i64) -> Result<()> {
        let mut state = self.state();
        state.cursor = Some(state.cursor.map_or(cursor, |current| current.max(cursor)));
        Ok(())
    }

    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let mut state = self.state();
        let idx = state
            .snapshots
            .partition_point(|s| s.taken_at <= snapshot.taken_at);
        state.snapshots.insert(idx, snapshot.clone());
        Ok(())
    }

    async fn latest_snapshots(&self, n: usize) -> Result<Vec<Snapshot>> {
        Ok(self.state().snapshots.iter().rev().take(n).cloned().collect())
    }

    async fn snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>> {
        Ok(self
            .state()
            .snapshots
            .iter()
            .filter(|s| s.taken_at >= from && s.taken_at <= to)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[tokio::test]
    async fn test_cursor_is_monotonic() {
        let storage = MemoryStorage::new();
        storage.set_cursor(5).await.unwrap();
        storage.set_cursor(3).await.unwrap();
        assert_eq!(storage.cursor().await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_snapshots_ordered_by_timestamp() {
        let storage = MemoryStorage::new();
        let now = Utc::now();
        storage
            .append_snapshot(&Snapshot::at(now, "late".into()))
            .await
            .unwrap();
        storage
            .append_snapshot(&Snapshot::at(now - Duration::hours(1), "early".into()))
            .await
            .unwrap();

        let latest = storage.latest_snapshots(5).await.unwrap();
        assert_eq!(latest[0].data, "late");
        assert_eq!(latest[1].data, "early");

        let range = storage
            .snapshots_between(now - Duration::hours(2), now - Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(range.len(), 1);
        assert_eq!(range[0].data, "early");
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let storage = MemoryStorage::with_subscribers(vec![Subscriber::new(1)]);
        let mut s = Subscriber::new(1);
        s.flags = "1000".parse().unwrap();
        storage.put_subscriber(&s).await.unwrap();

        let all = storage.subscribers().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].flags.authenticated);
    }
}
