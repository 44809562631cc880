// src/pipeline/extract.rs

//! Extraction orchestrator.
//!
//! Pages through the primary fetch strategy and falls back to the secondary
//! one when the primary yields no records at all.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;
use crate::models::{BrowserConfig, FieldSpec, Record, SourceConfig, ValidationRule};
use crate::pipeline::normalize::{is_active_bounty, normalize};
use crate::pipeline::validate::validate_page;
use crate::services::{ApiFetcher, BrowserFetcher, PageFetcher};

/// Drives fetch strategies across all pages of the listing.
pub struct Extractor {
    primary: Arc<dyn PageFetcher>,
    fallback: Option<Arc<dyn PageFetcher>>,
    fields: Vec<FieldSpec>,
    rules: Vec<ValidationRule>,
    include_all: bool,
    rate_limit: Duration,
}

impl Extractor {
    pub fn new(
        primary: Arc<dyn PageFetcher>,
        fallback: Option<Arc<dyn PageFetcher>>,
        source: &SourceConfig,
    ) -> Self {
        Self {
            primary,
            fallback,
            fields: source.fields.clone(),
            rules: source.validation.clone(),
            include_all: source.include_all,
            rate_limit: source.rate_limit(),
        }
    }

    /// API first, browser scrape as the fallback when enabled.
    pub fn from_config(source: &SourceConfig, browser: &BrowserConfig) -> Result<Self> {
        let primary: Arc<dyn PageFetcher> = Arc::new(ApiFetcher::new(source)?);
        let fallback: Option<Arc<dyn PageFetcher>> = if browser.enabled {
            let renderer = BrowserFetcher::default_renderer(source)?;
            Some(Arc::new(BrowserFetcher::new(
                renderer,
                browser,
                source.retry_policy(),
            )?))
        } else {
            None
        };
        Ok(Self::new(primary, fallback, source))
    }

    pub fn include_all(mut self, include_all: bool) -> Self {
        self.include_all = include_all;
        self
    }

    /// Records from the first strategy that yields any, or `None` when no
    /// strategy does.
    pub async fn extract(&self) -> Option<Vec<Record>> {
        let strategies = std::iter::once(&self.primary).chain(self.fallback.as_ref());
        for fetcher in strategies {
            let records = self.fetch_all_pages(fetcher.as_ref()).await;
            if !records.is_empty() {
                log::info!("Extracted {} records via {}", records.len(), fetcher.name());
                return Some(records);
            }
            log::warn!("No records from the {} strategy", fetcher.name());
        }
        None
    }

    /// Page through one strategy until the listing ends or a page is unusable.
    pub async fn fetch_all_pages(&self, fetcher: &dyn PageFetcher) -> Vec<Record> {
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let data = match fetcher.fetch(page).await {
                Ok(data) => data,
                Err(failure) => {
                    log::warn!("[{}] {}", fetcher.name(), failure);
                    break;
                }
            };

            if let Err(e) = validate_page(&data, &self.rules) {
                log::warn!("[{}] page {} rejected: {}", fetcher.name(), page, e);
                break;
            }

            let items = data
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            if items.is_empty() {
                log::debug!("[{}] page {} has no items", fetcher.name(), page);
                break;
            }

            let before = records.len();
            records.extend(
                items
                    .iter()
                    .filter(|item| self.include_all || is_active_bounty(item))
                    .map(|item| normalize(item, &self.fields)),
            );
            log::debug!(
                "[{}] page {}: kept {}/{} items",
                fetcher.name(),
                page,
                records.len() - before,
                items.len()
            );

            if u64::from(page) >= page_count(&data) {
                break;
            }

            page += 1;
            tokio::time::sleep(self.rate_limit).await;
        }

        records
    }
}

/// `pagination.nb_pages`, defaulting to a single page.
fn page_count(data: &Value) -> u64 {
    data.get("pagination")
        .and_then(|p| p.get("nb_pages"))
        .and_then(Value::as_u64)
        .unwrap_or(1)
}
