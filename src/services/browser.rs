// src/services/browser.rs

//! Browser scrape fetch strategy.
//!
//! Renders the public program listing and scrapes its cards into the same
//! `{items, pagination: {nb_pages}}` shape the API returns, so the
//! orchestrator can treat both strategies alike.

use std::sync::Arc;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value, json};
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{BrowserConfig, RetryPolicy, ScrapeField, SourceConfig};
use crate::services::fetcher::{FetchError, PageFailure, PageFetcher, PageResult, fetch_with_retry};
use crate::utils::{http, resolve_url, with_query_param};

/// Produces the HTML of a page after it has been rendered.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> std::result::Result<String, FetchError>;
}

/// Renders by plain HTTP GET, for listings that are server-side rendered.
pub struct HttpRenderer {
    client: reqwest::Client,
}

impl HttpRenderer {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        Ok(Self {
            client: http::create_source_client(config)?,
        })
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str) -> std::result::Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Renders with a headless Chromium instance per page.
#[cfg(feature = "browser")]
pub struct ChromiumRenderer {
    timeout: std::time::Duration,
}

#[cfg(feature = "browser")]
impl ChromiumRenderer {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            timeout: config.timeout(),
        }
    }

    async fn render_page(&self, url: &str) -> std::result::Result<String, AppError> {
        use chromiumoxide::browser::{Browser, BrowserConfig as ChromeConfig};
        use futures::StreamExt;

        let chrome = ChromeConfig::builder()
            .request_timeout(self.timeout)
            .build()
            .map_err(AppError::Browser)?;
        let (mut browser, mut handler) = Browser::launch(chrome)
            .await
            .map_err(|e| AppError::Browser(e.to_string()))?;

        let events = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let html = async {
            let page = browser.new_page(url).await?;
            page.wait_for_navigation().await?;
            page.content().await
        }
        .await
        .map_err(|e| AppError::Browser(e.to_string()));

        if let Err(e) = browser.close().await {
            log::warn!("Failed to close browser: {}", e);
        }
        events.abort();
        html
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render(&self, url: &str) -> std::result::Result<String, FetchError> {
        match tokio::time::timeout(self.timeout, self.render_page(url)).await {
            Ok(Ok(html)) => Ok(html),
            Ok(Err(e)) => Err(FetchError::Other(e.to_string())),
            Err(_) => Err(FetchError::Timeout(format!("rendering {url}"))),
        }
    }
}

/// Compiled selectors for one card layout.
struct CardSelectors {
    card: Selector,
    pagination: Option<Selector>,
    fields: Vec<(ScrapeField, Selector)>,
}

impl CardSelectors {
    fn compile(config: &BrowserConfig) -> Result<Self> {
        Ok(Self {
            card: parse_selector(&config.card_selector)?,
            pagination: config
                .pagination_selector
                .as_deref()
                .map(parse_selector)
                .transpose()?,
            fields: config
                .fields
                .iter()
                .map(|field| Ok((field.clone(), parse_selector(&field.selector)?)))
                .collect::<Result<Vec<_>>>()?,
        })
    }
}

/// Scrapes rendered listing pages into API-shaped JSON.
pub struct BrowserFetcher {
    renderer: Arc<dyn PageRenderer>,
    page_url: String,
    page_param: String,
    listed_are_active: bool,
    selectors: CardSelectors,
    policy: RetryPolicy,
}

impl BrowserFetcher {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        config: &BrowserConfig,
        policy: RetryPolicy,
    ) -> Result<Self> {
        Url::parse(&config.page_url)?;
        Ok(Self {
            renderer,
            page_url: config.page_url.clone(),
            page_param: config.page_param.clone(),
            listed_are_active: config.listed_are_active,
            selectors: CardSelectors::compile(config)?,
            policy,
        })
    }

    /// The renderer this build provides: Chromium with the `browser`
    /// feature, plain HTTP otherwise.
    pub fn default_renderer(config: &SourceConfig) -> Result<Arc<dyn PageRenderer>> {
        #[cfg(feature = "browser")]
        {
            Ok(Arc::new(ChromiumRenderer::new(config)))
        }
        #[cfg(not(feature = "browser"))]
        {
            Ok(Arc::new(HttpRenderer::new(config)?))
        }
    }

    fn url_for(&self, page: u32) -> std::result::Result<Url, FetchError> {
        if page == 1 {
            return Url::parse(&self.page_url).map_err(|e| FetchError::Other(e.to_string()));
        }
        with_query_param(&self.page_url, &self.page_param, &page.to_string())
            .map_err(|e| FetchError::Other(e.to_string()))
    }

    /// Turn one rendered page into `{items, pagination}`.
    fn scrape(&self, html: &str, base: &Url) -> Value {
        let document = Html::parse_document(html);

        let items: Vec<Value> = document
            .select(&self.selectors.card)
            .map(|card| Value::Object(self.scrape_card(&card, base)))
            .collect();

        let nb_pages = self
            .selectors
            .pagination
            .as_ref()
            .and_then(|sel| {
                document
                    .select(sel)
                    .filter_map(|el| el.text().collect::<String>().trim().parse::<u64>().ok())
                    .max()
            })
            .unwrap_or(1);

        json!({
            "items": items,
            "pagination": { "nb_pages": nb_pages },
        })
    }

    fn scrape_card(&self, card: &ElementRef, base: &Url) -> Map<String, Value> {
        let mut item = Map::new();
        for (field, selector) in &self.selectors.fields {
            let text = card.select(selector).next().and_then(|el| match &field.attr {
                Some(attr) => el.value().attr(attr).map(|raw| {
                    if attr == "href" {
                        resolve_url(base, raw)
                    } else {
                        raw.to_string()
                    }
                }),
                None => Some(normalize_whitespace(&el.text().collect::<String>())),
            });
            let text = text
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| field.default.clone());
            item.insert(field.key.clone(), Value::String(text));
        }

        if self.listed_are_active {
            item.insert("public".into(), Value::Bool(true));
            item.insert("status".into(), Value::from("V"));
            item.insert("bounty".into(), Value::Bool(true));
        }
        item
    }

    async fn attempt(&self, url: &Url) -> std::result::Result<Value, FetchError> {
        let html = self.renderer.render(url.as_str()).await?;
        Ok(self.scrape(&html, url))
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    fn name(&self) -> &'static str {
        "browser"
    }

    async fn fetch(&self, page: u32) -> PageResult {
        let url = match self.url_for(page) {
            Ok(url) => url,
            Err(error) => {
                return Err(PageFailure {
                    page,
                    attempts: 0,
                    error,
                });
            }
        };
        log::debug!("Rendering {}", url);
        fetch_with_retry(&self.policy, page, || self.attempt(&url)).await
    }
}

fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
