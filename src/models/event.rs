//! Inbound chat events.

use serde::{Deserialize, Serialize};

/// A message received from the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Monotonically increasing transport id
    pub id: i64,

    /// Sender chat, absent for updates that are not chat messages
    pub chat_id: Option<i64>,

    /// Message text, absent for stickers, photos and the like
    pub text: Option<String>,
}

impl InboundEvent {
    pub fn message(id: i64, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            chat_id: Some(chat_id),
            text: Some(text.into()),
        }
    }
}
