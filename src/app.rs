// src/app.rs

//! Application context.
//!
//! Everything the loops need is built once from [`Config`] and borrowed from
//! here; nothing is global.

use std::sync::Arc;
use std::time::Duration;

use crate::config::load_credentials;
use crate::error::Result;
use crate::models::Config;
use crate::pipeline::{Broadcaster, CycleOutcome, Extractor, Listener, run_cycle, watch};
use crate::services::{CommandRouter, TelegramTransport, Transport};
use crate::storage::{LocalStorage, Storage};

pub struct App {
    config: Config,
    storage: Arc<dyn Storage>,
    transport: Arc<dyn Transport>,
    extractor: Extractor,
    broadcaster: Broadcaster,
    router: CommandRouter,
}

impl App {
    /// Assemble from explicit collaborators.
    pub fn new(
        config: Config,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
        extractor: Extractor,
        secret: &str,
    ) -> Self {
        let broadcaster =
            Broadcaster::new(transport.clone(), config.broadcast.clone(), &config.bot);
        let router = CommandRouter::new(secret, config.bot.unauthenticated_reply.clone());
        Self {
            config,
            storage,
            transport,
            extractor,
            broadcaster,
            router,
        }
    }

    /// Local store, Telegram transport and the API/browser extractor.
    pub fn from_config(config: Config) -> Result<Self> {
        let credentials = load_credentials(&config.bot)?;
        let storage = Arc::new(LocalStorage::new(&config.paths.storage));
        let transport = Arc::new(TelegramTransport::new(&config.bot, &credentials.token)?);
        let extractor = Extractor::from_config(&config.source, &config.browser)?;
        Ok(Self::new(config, storage, transport, extractor, &credentials.secret))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn listener(&self) -> Listener<'_> {
        Listener {
            transport: self.transport.as_ref(),
            storage: self.storage.as_ref(),
            router: &self.router,
            extractor: &self.extractor,
            broadcaster: &self.broadcaster,
            max_message_len: self.config.bot.max_message_len,
        }
    }

    /// One extraction/broadcast cycle.
    pub async fn cycle(&self) -> Result<CycleOutcome> {
        run_cycle(&self.extractor, self.storage.as_ref(), &self.broadcaster).await
    }

    /// Periodic cycles until Ctrl-C.
    pub async fn watch(&self) {
        let interval = Duration::from_secs(self.config.broadcast.interval_secs);
        tokio::select! {
            _ = watch(&self.extractor, self.storage.as_ref(), &self.broadcaster, interval) => {}
            _ = shutdown_signal() => {}
        }
    }

    /// Inbound loop until Ctrl-C.
    pub async fn listen(&self) {
        let listener = self.listener();
        tokio::select! {
            _ = listener.run() => {}
            _ = shutdown_signal() => {}
        }
    }

    /// Inbound loop and periodic cycles side by side until Ctrl-C.
    pub async fn run(&self) {
        let listener = self.listener();
        let interval = Duration::from_secs(self.config.broadcast.interval_secs);
        tokio::select! {
            _ = listener.run() => {}
            _ = watch(&self.extractor, self.storage.as_ref(), &self.broadcaster, interval) => {}
            _ = shutdown_signal() => {}
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown requested"),
        Err(e) => {
            log::error!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
