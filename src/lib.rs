// src/lib.rs

//! bountywatch: bug-bounty listing watcher with Telegram notifications

pub mod app;
pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

pub use app::App;
