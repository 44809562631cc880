//! Subscriber records and their visibility flags.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Diff category a subscriber can show or hide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Removed,
    Added,
    Common,
}

impl Category {
    /// Render order of categories in a compiled message.
    pub const ALL: [Category; 3] = [Category::Removed, Category::Added, Category::Common];

    /// Command keyword and message label.
    pub fn label(self) -> &'static str {
        match self {
            Category::Removed => "removed",
            Category::Added => "added",
            Category::Common => "common",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Category::Removed => "🔴",
            Category::Added => "🟢",
            Category::Common => "🔵",
        }
    }
}

/// Per-subscriber authentication and visibility switches.
///
/// Stored as a four character string of `0`/`1` in the order
/// authenticated, removed, added, common (e.g. `"1101"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Flags {
    pub authenticated: bool,
    pub show_removed: bool,
    pub show_added: bool,
    pub show_common: bool,
}

impl Flags {
    /// Everything on: what a correct secret grants.
    pub fn all() -> Self {
        Self {
            authenticated: true,
            show_removed: true,
            show_added: true,
            show_common: true,
        }
    }

    pub fn shows(&self, category: Category) -> bool {
        match category {
            Category::Removed => self.show_removed,
            Category::Added => self.show_added,
            Category::Common => self.show_common,
        }
    }

    pub fn toggle(&mut self, category: Category) {
        let slot = match category {
            Category::Removed => &mut self.show_removed,
            Category::Added => &mut self.show_added,
            Category::Common => &mut self.show_common,
        };
        *slot = !*slot;
    }

    /// True when no category is visible.
    pub fn is_muted(&self) -> bool {
        Category::ALL.iter().all(|c| !self.shows(*c))
    }
}

impl FromStr for Flags {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits = s
            .chars()
            .map(|c| match c {
                '0' => Some(false),
                '1' => Some(true),
                _ => None,
            })
            .collect::<Option<Vec<bool>>>()
            .ok_or_else(|| AppError::InvalidFlags(s.to_string()))?;

        match bits.as_slice() {
            [authenticated, show_removed, show_added, show_common] => Ok(Self {
                authenticated: *authenticated,
                show_removed: *show_removed,
                show_added: *show_added,
                show_common: *show_common,
            }),
            _ => Err(AppError::InvalidFlags(s.to_string())),
        }
    }
}

impl TryFrom<String> for Flags {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Flags> for String {
    fn from(flags: Flags) -> Self {
        flags.to_string()
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in [
            self.authenticated,
            self.show_removed,
            self.show_added,
            self.show_common,
        ] {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// A chat that talks to the bot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscriber {
    /// Transport recipient handle
    pub chat_id: i64,

    pub flags: Flags,

    pub created_at: DateTime<Utc>,
}

impl Subscriber {
    /// A first-contact subscriber with every flag off.
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            flags: Flags::default(),
            created_at: Utc::now(),
        }
    }
}
