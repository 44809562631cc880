// src/services/api.rs

//! Direct listing API fetch strategy.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::Result;
use crate::models::{RetryPolicy, SourceConfig};
use crate::services::fetcher::{FetchError, PageFailure, PageFetcher, PageResult, fetch_with_retry};
use crate::utils::{http, with_query_param};

/// Fetches listing pages from the JSON API.
pub struct ApiFetcher {
    client: Client,
    base_url: String,
    page_param: String,
    policy: RetryPolicy,
}

impl ApiFetcher {
    /// Create a fetcher with its own client built from the source settings.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = http::create_source_client(config)?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &SourceConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.clone(),
            page_param: config.page_param.clone(),
            policy: config.retry_policy(),
        }
    }

    fn page_url(&self, page: u32) -> std::result::Result<String, FetchError> {
        with_query_param(&self.base_url, &self.page_param, &page.to_string())
            .map(String::from)
            .map_err(|e| FetchError::Other(e.to_string()))
    }

    async fn attempt(&self, url: &str) -> std::result::Result<Value, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Other(format!("invalid JSON body: {e}")))
    }
}

#[async_trait]
impl PageFetcher for ApiFetcher {
    fn name(&self) -> &'static str {
        "api"
    }

    async fn fetch(&self, page: u32) -> PageResult {
        let url = match self.page_url(page) {
            Ok(url) => url,
            Err(error) => {
                return Err(PageFailure {
                    page,
                    attempts: 0,
                    error,
                });
            }
        };
        log::debug!("GET {}", url);
        fetch_with_retry(&self.policy, page, || self.attempt(&url)).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(base_url: String) -> SourceConfig {
        SourceConfig {
            base_url,
            max_attempts: 2,
            retry_delay_ms: 1,
            ..SourceConfig::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_sends_page_param() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/programs"))
            .and(query_param("page[number]", "2"))
            .and(query_param("resultsPerPage", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [1]})))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher =
            ApiFetcher::new(&config(format!("{}/programs?resultsPerPage=42", server.uri())))
                .unwrap();
        let page = fetcher.fetch(2).await.unwrap();
        assert_eq!(page, json!({"items": [1]}));
    }

    #[tokio::test]
    async fn test_non_success_status_is_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = ApiFetcher::new(&config(format!("{}/programs", server.uri()))).unwrap();
        let failure = fetcher.fetch(1).await.unwrap_err();
        assert_eq!(failure.attempts, 2);
        assert_eq!(failure.error, FetchError::Status(503));
    }

    #[tokio::test]
    async fn test_invalid_json_is_other_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let fetcher = ApiFetcher::new(&config(format!("{}/programs", server.uri()))).unwrap();
        let failure = fetcher.fetch(1).await.unwrap_err();
        assert!(matches!(failure.error, FetchError::Other(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        let mut cfg = config("http://127.0.0.1:9/programs".into());
        cfg.max_attempts = 1;
        let fetcher = ApiFetcher::new(&cfg).unwrap();
        let failure = fetcher.fetch(1).await.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert!(matches!(
            failure.error,
            FetchError::Connection(_) | FetchError::Other(_)
        ));
    }
}
