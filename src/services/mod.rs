//! Service layer for the watcher application.
//!
//! This module contains the collaborators the pipeline drives:
//! - Listing fetch strategies (`ApiFetcher`, `BrowserFetcher`)
//! - The chat transport (`TelegramTransport`)
//! - Inbound command routing (`CommandRouter`)

mod api;
mod browser;
pub mod commands;
pub mod fetcher;
mod transport;

pub use api::ApiFetcher;
#[cfg(feature = "browser")]
pub use browser::ChromiumRenderer;
pub use browser::{BrowserFetcher, HttpRenderer, PageRenderer};
pub use commands::{Action, Command, CommandRouter};
pub use fetcher::{FetchError, PageFailure, PageFetcher, PageResult, fetch_with_retry};
pub use transport::{TELEGRAM_MAX_MESSAGE_LEN, TelegramTransport, Transport};
