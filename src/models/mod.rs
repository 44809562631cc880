// src/models/mod.rs

//! Domain models for the watcher application.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod snapshot;
mod subscriber;

// Re-export all public types
pub use config::{
    BotConfig, BroadcastConfig, BrowserConfig, Config, FieldSpec, LoggingConfig, PathsConfig,
    RetryPolicy, ScrapeField, SourceConfig, ValidationRule,
};
pub use event::InboundEvent;
pub use snapshot::{Record, Snapshot, render_snapshot, render_value};
pub use subscriber::{Category, Flags, Subscriber};
