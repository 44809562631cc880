// src/services/commands.rs

//! Inbound command routing and flag authorization.
//!
//! Routing is a pure function of the sender's record and the message text.
//! Commands that need the store or the watcher (`status`, `new`) come back as
//! an [`Action`] for the listener to carry out.

use crate::models::{Category, Flags, Subscriber};

pub const UNKNOWN_COMMAND: &str = "❌ Unknown command";
pub const INVALID_SECRET: &str = "❌ Invalid secret";

/// A recognized command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Secret,
    Toggle(Category),
    Help,
    New,
    Status,
}

impl Command {
    fn requires_auth(self) -> bool {
        matches!(self, Self::New | Self::Status)
    }
}

/// What the listener should do in response to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send this text back to the sender.
    Reply(String),
    /// Send the sender a listing of all subscribers.
    ListSubscribers,
    /// Run an extraction/broadcast cycle now.
    RunCycle,
}

/// Ordered keyword table; the first keyword prefixing the text wins.
pub struct CommandRouter {
    table: Vec<(&'static str, Command)>,
    secret: String,
    unauthenticated_reply: String,
}

impl CommandRouter {
    pub fn new(secret: impl Into<String>, unauthenticated_reply: impl Into<String>) -> Self {
        Self {
            table: vec![
                ("secret", Command::Secret),
                ("removed", Command::Toggle(Category::Removed)),
                ("added", Command::Toggle(Category::Added)),
                ("common", Command::Toggle(Category::Common)),
                ("help", Command::Help),
                ("new", Command::New),
                ("status", Command::Status),
            ],
            secret: secret.into(),
            unauthenticated_reply: unauthenticated_reply.into(),
        }
    }

    /// All keywords, sorted and deduplicated.
    pub fn keywords(&self) -> Vec<&'static str> {
        let mut keywords: Vec<_> = self.table.iter().map(|(k, _)| *k).collect();
        keywords.sort_unstable();
        keywords.dedup();
        keywords
    }

    pub fn route(&self, text: &str) -> Option<Command> {
        self.table
            .iter()
            .find(|(keyword, _)| text.starts_with(keyword))
            .map(|(_, command)| *command)
    }

    /// Handle `text` from `subscriber`, updating its flags in place.
    ///
    /// The caller persists the subscriber when its flags changed.
    pub fn dispatch(&self, subscriber: &mut Subscriber, text: &str) -> Action {
        let Some(command) = self.route(text) else {
            return Action::Reply(UNKNOWN_COMMAND.to_string());
        };

        if command.requires_auth() && !subscriber.flags.authenticated {
            log::info!("Rejected {:?} from unauthenticated chat {}", command, subscriber.chat_id);
            return Action::Reply(self.unauthenticated_reply.clone());
        }

        match command {
            Command::Secret => {
                if self.secret_matches(text) {
                    subscriber.flags = Flags::all();
                    log::info!("Chat {} authenticated", subscriber.chat_id);
                    flags_updated(subscriber.flags)
                } else {
                    log::warn!("Invalid secret from chat {}", subscriber.chat_id);
                    Action::Reply(INVALID_SECRET.to_string())
                }
            }
            Command::Toggle(category) => {
                subscriber.flags.toggle(category);
                flags_updated(subscriber.flags)
            }
            Command::Help => Action::Reply(self.keywords().join("\n")),
            Command::Status => Action::ListSubscribers,
            Command::New => Action::RunCycle,
        }
    }

    fn secret_matches(&self, text: &str) -> bool {
        !self.secret.is_empty()
            && text
                .strip_prefix("secret:")
                .is_some_and(|phrase| phrase == self.secret)
    }
}

fn flags_updated(flags: Flags) -> Action {
    Action::Reply(format!("Flags updated to {}", flags))
}

/// Render subscriber records for the `status` reply.
pub fn format_status(subscribers: &[Subscriber]) -> String {
    subscribers
        .iter()
        .enumerate()
        .map(|(i, s)| {
            format!(
                "{}:\n{}\n{}\n{}",
                i + 1,
                s.chat_id,
                s.flags,
                s.created_at.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
