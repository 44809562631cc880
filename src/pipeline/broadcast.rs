// src/pipeline/broadcast.rs

//! Fan-out of one cycle's result to every subscriber.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::models::{BotConfig, BroadcastConfig, Subscriber};
use crate::pipeline::compile::compile;
use crate::pipeline::diff::{DiffResult, diff};
use crate::services::Transport;

/// Delivery counts for one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Messages (chunks) accepted by the transport
    pub sent: usize,
    /// Messages (chunks) the transport rejected
    pub failed: usize,
    /// Subscribers with nothing to receive
    pub skipped: usize,
}

/// Sends per-subscriber payloads under a fixed per-send delay.
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    options: BroadcastConfig,
    send_delay: Duration,
    max_message_len: usize,
}

impl Broadcaster {
    pub fn new(transport: Arc<dyn Transport>, options: BroadcastConfig, bot: &BotConfig) -> Self {
        Self {
            transport,
            options,
            send_delay: bot.send_delay(),
            max_message_len: bot.max_message_len,
        }
    }

    /// Pause after every message sent.
    pub fn send_delay(&self) -> Duration {
        self.send_delay
    }

    /// What `subscriber` should receive for this cycle, if anything.
    pub fn payload_for(&self, subscriber: &Subscriber, current: &str, changes: &DiffResult) -> Option<String> {
        if !self.options.auth {
            return Some(current.to_string());
        }
        if !subscriber.flags.authenticated {
            return Some(format!("{}\n{}", current.chars().count(), subscriber.flags));
        }
        if !self.options.use_diff {
            return Some(current.to_string());
        }
        compile(&subscriber.flags, changes, self.options.max_entry_width).into_message()
    }

    /// Send `current` (or its diff against `previous`) to every subscriber,
    /// in list order.
    pub async fn broadcast(
        &self,
        current: &str,
        previous: &str,
        subscribers: &[Subscriber],
    ) -> BroadcastReport {
        let changes = diff(previous, current);
        let mut report = BroadcastReport::default();
        log::info!(
            "Broadcasting to {} subscribers ({} changed lines)",
            subscribers.len(),
            changes.change_count()
        );

        for subscriber in subscribers {
            let Some(text) = self.payload_for(subscriber, current, &changes) else {
                log::debug!("Nothing to send to chat {}", subscriber.chat_id);
                report.skipped += 1;
                continue;
            };

            for chunk in split_message(&text, self.max_message_len) {
                match self.transport.deliver(subscriber.chat_id, &chunk).await {
                    Ok(()) => report.sent += 1,
                    Err(e) => {
                        log::error!("Failed to send to chat {}: {}", subscriber.chat_id, e);
                        report.failed += 1;
                    }
                }
                tokio::time::sleep(self.send_delay).await;
            }
        }

        log::info!(
            "Broadcast done: {} sent, {} failed, {} skipped",
            report.sent,
            report.failed,
            report.skipped
        );
        report
    }
}

/// Split `text` into chunks of at most `limit` UTF-16 code units at line
/// boundaries, the unit Telegram measures message length in.
///
/// Only a single line longer than `limit` is ever cut, and never inside a
/// character. Empty chunks are never produced.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut started = false;

    for line in text.split('\n') {
        let line_len = line.encode_utf16().count();

        if line_len > limit {
            push_chunk(&mut chunks, &mut current);
            started = false;
            current_len = 0;
            cut_line(line, limit, &mut chunks);
            continue;
        }

        if started && current_len + 1 + line_len <= limit {
            current.push('\n');
            current.push_str(line);
            current_len += 1 + line_len;
        } else {
            push_chunk(&mut chunks, &mut current);
            current.push_str(line);
            current_len = line_len;
            started = true;
        }
    }
    push_chunk(&mut chunks, &mut current);
    chunks
}

/// Cut an overlong line into pieces of at most `limit` code units. A single
/// character wider than `limit` becomes a piece of its own.
fn cut_line(line: &str, limit: usize, chunks: &mut Vec<String>) {
    let mut piece = String::new();
    let mut units = 0;
    for c in line.chars() {
        if units + c.len_utf16() > limit && !piece.is_empty() {
            chunks.push(std::mem::take(&mut piece));
            units = 0;
        }
        piece.push(c);
        units += c.len_utf16();
    }
    if !piece.is_empty() {
        chunks.push(piece);
    }
}

fn push_chunk(chunks: &mut Vec<String>, current: &mut String) {
    let chunk = std::mem::take(current);
    if !chunk.trim().is_empty() {
        chunks.push(chunk);
    }
}
