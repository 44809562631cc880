// src/pipeline/listen.rs

//! Inbound long-poll loop.

use crate::error::Result;
use crate::models::{InboundEvent, Subscriber};
use crate::pipeline::broadcast::{Broadcaster, split_message};
use crate::pipeline::cycle::{CycleOutcome, run_cycle};
use crate::pipeline::extract::Extractor;
use crate::services::commands::format_status;
use crate::services::{Action, CommandRouter, Transport};
use crate::storage::Storage;

/// Consumes inbound events and answers commands.
pub struct Listener<'a> {
    pub transport: &'a dyn Transport,
    pub storage: &'a dyn Storage,
    pub router: &'a CommandRouter,
    pub extractor: &'a Extractor,
    pub broadcaster: &'a Broadcaster,
    pub max_message_len: usize,
}

impl Listener<'_> {
    /// Poll forever. Errors end the current batch only.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.poll_once().await {
                log::error!("Inbound batch failed: {}", e);
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        }
    }

    /// Fetch and handle one batch, then advance the cursor past it.
    ///
    /// A failing event is logged and skipped; the cursor still moves past the
    /// whole batch so no command is applied twice. Returns the number of
    /// events in the batch.
    pub async fn poll_once(&self) -> Result<usize> {
        let cursor = self.storage.cursor().await?;
        let events = self.transport.pending_events(cursor).await?;
        let Some(last) = events.iter().map(|e| e.id).max() else {
            return Ok(0);
        };

        for event in &events {
            if let Err(e) = self.handle(event).await {
                log::error!("Event {} failed: {}", event.id, e);
            }
        }

        self.storage.set_cursor(last).await?;
        log::debug!("Cursor advanced to {}", last);
        Ok(events.len())
    }

    /// Register unknown senders and dispatch their text.
    pub async fn handle(&self, event: &InboundEvent) -> Result<()> {
        let Some(chat_id) = event.chat_id else {
            return Ok(());
        };

        let mut subscriber = match self.storage.subscriber(chat_id).await? {
            Some(existing) => existing,
            None => {
                let fresh = Subscriber::new(chat_id);
                self.storage.put_subscriber(&fresh).await?;
                log::info!("New subscriber {}", chat_id);
                fresh
            }
        };

        let Some(text) = event.text.as_deref() else {
            return Ok(());
        };
        log::info!("Message from {}: {}", chat_id, text);

        let before = subscriber.flags;
        let action = self.router.dispatch(&mut subscriber, text.trim());
        if subscriber.flags != before {
            self.storage.put_subscriber(&subscriber).await?;
        }

        match action {
            Action::Reply(reply) => self.reply(chat_id, &reply).await,
            Action::ListSubscribers => {
                let all = self.storage.subscribers().await?;
                self.reply(chat_id, &format_status(&all)).await;
            }
            Action::RunCycle => {
                log::info!("Refresh requested by {}", chat_id);
                match run_cycle(self.extractor, self.storage, self.broadcaster).await {
                    Ok(CycleOutcome::NoData) => log::warn!("Requested refresh produced no data"),
                    Ok(CycleOutcome::Broadcast { report, .. }) => {
                        log::info!("Requested refresh sent {} messages", report.sent);
                    }
                    Err(e) => log::error!("Requested refresh failed: {}", e),
                }
            }
        }
        Ok(())
    }

    /// Multi-chunk replies are spaced by the broadcast send delay.
    async fn reply(&self, chat_id: i64, text: &str) {
        let chunks = split_message(text, self.max_message_len);
        let count = chunks.len();
        for (idx, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.transport.deliver(chat_id, chunk).await {
                log::error!("Failed to reply to {}: {}", chat_id, e);
            }
            if idx + 1 < count {
                tokio::time::sleep(self.broadcaster.send_delay()).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use serde_json::json;
    use tokio::time::Instant;

    use super::*;
    use crate::error::AppError;
    use crate::models::{BotConfig, BroadcastConfig, Snapshot, SourceConfig};
    use crate::services::{FetchError, PageFailure, PageFetcher, PageResult};
    use crate::storage::MemoryStorage;

    #[derive(Default)]
    struct ChatStub {
        inbound: Mutex<Vec<InboundEvent>>,
        polled_with: Mutex<Vec<Option<i64>>>,
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Transport for ChatStub {
        async fn pending_events(&self, cursor: Option<i64>) -> Result<Vec<InboundEvent>> {
            self.polled_with.lock().unwrap().push(cursor);
            Ok(std::mem::take(&mut *self.inbound.lock().unwrap()))
        }

        async fn deliver(&self, chat_id: i64, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
    }

    struct NoPages;

    #[async_trait]
    impl PageFetcher for NoPages {
        fn name(&self) -> &'static str {
            "none"
        }

        async fn fetch(&self, page: u32) -> PageResult {
            Err(PageFailure {
                page,
                attempts: 1,
                error: FetchError::Status(500),
            })
        }
    }

    /// Always serves one active program.
    struct OnePage;

    #[async_trait]
    impl PageFetcher for OnePage {
        fn name(&self) -> &'static str {
            "one"
        }

        async fn fetch(&self, _page: u32) -> PageResult {
            Ok(json!({
                "items": [{"title": "Acme", "public": true, "status": "V", "bounty": true}],
                "pagination": {"nb_pages": 1}
            }))
        }
    }

    /// Memory storage whose snapshot writes always fail.
    #[derive(Default)]
    struct DiskFull {
        inner: MemoryStorage,
    }

    #[async_trait]
    impl Storage for DiskFull {
        async fn subscriber(&self, chat_id: i64) -> Result<Option<Subscriber>> {
            self.inner.subscriber(chat_id).await
        }

        async fn subscribers(&self) -> Result<Vec<Subscriber>> {
            self.inner.subscribers().await
        }

        async fn put_subscriber(&self, subscriber: &Subscriber) -> Result<()> {
            self.inner.put_subscriber(subscriber).await
        }

        async fn cursor(&self) -> Result<Option<i64>> {
            self.inner.cursor().await
        }

        async fn set_cursor(&self, cursor: i64) -> Result<()> {
            self.inner.set_cursor(cursor).await
        }

        async fn append_snapshot(&self, _snapshot: &Snapshot) -> Result<()> {
            Err(AppError::storage("disk full"))
        }

        async fn latest_snapshots(&self, n: usize) -> Result<Vec<Snapshot>> {
            self.inner.latest_snapshots(n).await
        }

        async fn snapshots_between(
            &self,
            from: DateTime<Utc>,
            to: DateTime<Utc>,
        ) -> Result<Vec<Snapshot>> {
            self.inner.snapshots_between(from, to).await
        }
    }

    struct Fixture<S: Storage = MemoryStorage> {
        chat: Arc<ChatStub>,
        storage: S,
        router: CommandRouter,
        extractor: Extractor,
        broadcaster: Broadcaster,
    }

    impl Fixture {
        fn new(events: Vec<InboundEvent>) -> Self {
            Fixture::build(events, MemoryStorage::new(), Arc::new(NoPages), 0)
        }
    }

    impl<S: Storage> Fixture<S> {
        fn build(
            events: Vec<InboundEvent>,
            storage: S,
            pages: Arc<dyn PageFetcher>,
            send_delay_ms: u64,
        ) -> Self {
            let chat = Arc::new(ChatStub {
                inbound: Mutex::new(events),
                ..ChatStub::default()
            });
            let bot = BotConfig {
                send_delay_ms,
                ..BotConfig::default()
            };
            Self {
                broadcaster: Broadcaster::new(chat.clone(), BroadcastConfig::default(), &bot),
                extractor: Extractor::new(pages, None, &SourceConfig::default()),
                router: CommandRouter::new("s3cret", "subscribe first"),
                storage,
                chat,
            }
        }

        fn listener(&self) -> Listener<'_> {
            Listener {
                transport: self.chat.as_ref(),
                storage: &self.storage,
                router: &self.router,
                extractor: &self.extractor,
                broadcaster: &self.broadcaster,
                max_message_len: 4096,
            }
        }

        fn sent(&self) -> Vec<(i64, String)> {
            self.chat.sent.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn test_batch_registers_and_advances_cursor() {
        let fx = Fixture::new(vec![
            InboundEvent::message(11, 7, "secret:s3cret"),
            InboundEvent::message(12, 8, "hello"),
            InboundEvent {
                id: 13,
                chat_id: None,
                text: None,
            },
        ]);

        assert_eq!(fx.listener().poll_once().await.unwrap(), 3);
        assert_eq!(fx.storage.cursor().await.unwrap(), Some(13));

        let subs = fx.storage.subscribers().await.unwrap();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].flags.to_string(), "1111");
        assert_eq!(subs[1].flags.to_string(), "0000");

        assert_eq!(
            fx.sent(),
            vec![
                (7, "Flags updated to 1111".to_string()),
                (8, "❌ Unknown command".to_string()),
            ]
        );

        assert_eq!(fx.listener().poll_once().await.unwrap(), 0);
        assert_eq!(
            fx.chat.polled_with.lock().unwrap().as_slice(),
            [None, Some(13)]
        );
    }

    #[tokio::test]
    async fn test_status_lists_subscribers_for_members_only() {
        let fx = Fixture::new(vec![
            InboundEvent::message(1, 7, "status"),
            InboundEvent::message(2, 7, "secret:s3cret"),
            InboundEvent::message(3, 7, "status"),
        ]);
        fx.listener().poll_once().await.unwrap();

        let sent = fx.sent();
        assert_eq!(sent[0].1, "subscribe first");
        assert!(sent[2].1.starts_with("1:\n7\n1111\n"));
    }

    #[tokio::test]
    async fn test_refresh_without_data_sends_nothing() {
        let fx = Fixture::new(vec![
            InboundEvent::message(1, 7, "secret:s3cret"),
            InboundEvent::message(2, 7, "new"),
        ]);
        fx.listener().poll_once().await.unwrap();

        assert_eq!(fx.sent().len(), 1);
        assert!(fx.storage.latest_snapshots(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_refresh_does_not_replay_batch() {
        let fx = Fixture::build(
            vec![
                InboundEvent::message(1, 7, "secret:s3cret"),
                InboundEvent::message(2, 7, "added"),
                InboundEvent::message(3, 7, "new"),
            ],
            DiskFull::default(),
            Arc::new(OnePage),
            0,
        );

        assert_eq!(fx.listener().poll_once().await.unwrap(), 3);
        assert_eq!(fx.storage.cursor().await.unwrap(), Some(3));
        assert_eq!(fx.listener().poll_once().await.unwrap(), 0);
        assert_eq!(fx.listener().poll_once().await.unwrap(), 0);

        let subs = fx.storage.subscribers().await.unwrap();
        assert_eq!(subs[0].flags.to_string(), "1101");
        assert_eq!(
            fx.sent(),
            vec![
                (7, "Flags updated to 1111".to_string()),
                (7, "Flags updated to 1101".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_event_does_not_block_the_rest() {
        let fx = Fixture::build(
            vec![
                InboundEvent::message(1, 7, "secret:s3cret"),
                InboundEvent::message(2, 7, "new"),
                InboundEvent::message(3, 8, "hello"),
            ],
            DiskFull::default(),
            Arc::new(OnePage),
            0,
        );

        fx.listener().poll_once().await.unwrap();
        assert_eq!(fx.storage.cursor().await.unwrap(), Some(3));
        assert_eq!(fx.sent().last(), Some(&(8, "❌ Unknown command".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_chunk_reply_waits_between_chunks() {
        let mut member = Subscriber::new(7);
        member.flags = "1111".parse().unwrap();
        let mut subscribers: Vec<_> = (1..=3).map(Subscriber::new).collect();
        subscribers.push(member);
        let fx = Fixture::build(
            vec![InboundEvent::message(1, 7, "status")],
            MemoryStorage::with_subscribers(subscribers),
            Arc::new(NoPages),
            1500,
        );
        let mut listener = fx.listener();
        listener.max_message_len = 10;
        let start = Instant::now();

        listener.poll_once().await.unwrap();

        let chunks = fx.sent().len();
        assert!(chunks > 1);
        assert_eq!(start.elapsed(), Duration::from_millis(1500 * (chunks as u64 - 1)));
    }
}
