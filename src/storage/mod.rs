//! Storage abstractions for subscribers, the poll cursor and snapshots.
//!
//! Snapshots follow an append-only monthly layout in the local backend:
//!
//! ```text
//! instance/
//! ├── subscribers.json      # Every subscriber, in creation order
//! ├── settings.json         # Long-poll cursor
//! └── snapshots/            # Append-only history
//!     └── YYYY/
//!         └── MM.json
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Snapshot, Subscriber};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Trait for persistence backends.
///
/// Each read-modify-write operation is atomic per store instance.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Subscriber registered for `chat_id`, if any.
    async fn subscriber(&self, chat_id: i64) -> Result<Option<Subscriber>>;

    /// All subscribers in creation order.
    async fn subscribers(&self) -> Result<Vec<Subscriber>>;

    /// Insert or replace the subscriber with the same `chat_id`.
    async fn put_subscriber(&self, subscriber: &Subscriber) -> Result<()>;

    /// Id of the last consumed inbound event.
    async fn cursor(&self) -> Result<Option<i64>>;

    /// Advance the cursor; values at or below the stored one are ignored.
    async fn set_cursor(&self, cursor: i64) -> Result<()>;

    async fn append_snapshot(&self, snapshot: &Snapshot) -> Result<()>;

    /// Up to `n` snapshots, newest first.
    async fn latest_snapshots(&self, n: usize) -> Result<Vec<Snapshot>>;

    /// Snapshots taken in `[from, to]`, oldest first.
    async fn snapshots_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>>;

    /// Data of the most recent snapshot, or an empty string before the first.
    async fn latest_data(&self) -> Result<String> {
        Ok(self
            .latest_snapshots(1)
            .await?
            .into_iter()
            .next()
            .map(|s| s.data)
            .unwrap_or_default())
    }
}
