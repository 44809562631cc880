//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Program listing API and extraction rules
    #[serde(default)]
    pub source: SourceConfig,

    /// Fallback browser scrape settings
    #[serde(default)]
    pub browser: BrowserConfig,

    /// Telegram bot settings
    #[serde(default)]
    pub bot: BotConfig,

    /// Outbound broadcast settings
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Filesystem locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration, or defaults together with the reason loading failed.
    pub fn load_or_default(path: impl AsRef<Path>) -> (Self, Option<AppError>) {
        match Self::load(path) {
            Ok(config) => (config, None),
            Err(e) => (Self::default(), Some(e)),
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.source.base_url.trim().is_empty() {
            return Err(AppError::validation("source.base_url is empty"));
        }
        url::Url::parse(&self.source.base_url)?;
        if self.source.page_param.trim().is_empty() {
            return Err(AppError::validation("source.page_param is empty"));
        }
        if self.source.user_agent.trim().is_empty() {
            return Err(AppError::validation("source.user_agent is empty"));
        }
        if self.source.timeout_secs == 0 {
            return Err(AppError::validation("source.timeout_secs must be > 0"));
        }
        if self.source.max_attempts == 0 {
            return Err(AppError::validation("source.max_attempts must be > 0"));
        }
        if self.source.fields.is_empty() {
            return Err(AppError::validation("No extraction fields defined"));
        }
        if let Some(field) = self.source.fields.iter().find(|f| f.path.is_empty()) {
            return Err(AppError::validation(format!(
                "source.fields '{}' has an empty path",
                field.name
            )));
        }
        if self.browser.enabled && self.browser.card_selector.trim().is_empty() {
            return Err(AppError::validation("browser.card_selector is empty"));
        }
        if self.bot.max_message_len == 0 {
            return Err(AppError::validation("bot.max_message_len must be > 0"));
        }
        if self.broadcast.max_entry_width == 0 {
            return Err(AppError::validation(
                "broadcast.max_entry_width must be > 0",
            ));
        }
        if self.broadcast.interval_secs == 0 {
            return Err(AppError::validation("broadcast.interval_secs must be > 0"));
        }
        Ok(())
    }
}

/// Paginated API source and extraction rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Listing endpoint, without the page parameter
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Query parameter carrying the page number
    #[serde(default = "defaults::page_param")]
    pub page_param: String,

    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Per-attempt request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Attempts per page before giving up
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds (doubled after each failure)
    #[serde(default = "defaults::retry_delay")]
    pub retry_delay_ms: u64,

    /// Upper bound for the backoff delay; unset means plain doubling
    #[serde(default)]
    pub max_retry_delay_ms: Option<u64>,

    /// Delay between page fetches in milliseconds
    #[serde(default = "defaults::rate_limit")]
    pub rate_limit_ms: u64,

    /// Keep every program instead of only active bounties
    #[serde(default)]
    pub include_all: bool,

    /// Output fields, in snapshot column order
    #[serde(default = "defaults::fields")]
    pub fields: Vec<FieldSpec>,

    /// Shape rules every page must satisfy
    #[serde(default = "defaults::validation")]
    pub validation: Vec<ValidationRule>,
}

impl SourceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.retry_delay_ms),
            max_delay: self.max_retry_delay_ms.map(Duration::from_millis),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            page_param: defaults::page_param(),
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_attempts: defaults::max_attempts(),
            retry_delay_ms: defaults::retry_delay(),
            max_retry_delay_ms: None,
            rate_limit_ms: defaults::rate_limit(),
            include_all: false,
            fields: defaults::fields(),
            validation: defaults::validation(),
        }
    }
}

/// Retry and backoff settings for a single page fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    /// Delay to use after the current one has elapsed.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let doubled = current.checked_mul(2).unwrap_or(Duration::MAX);
        match self.max_delay {
            Some(cap) => doubled.min(cap),
            None => doubled,
        }
    }
}

/// One output field of an extracted record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldSpec {
    /// Output column name
    pub name: String,

    /// Key path into the raw item
    pub path: Vec<String>,

    /// Value used when the path does not resolve
    #[serde(default)]
    pub default: Value,
}

impl FieldSpec {
    pub fn new(name: &str, path: &[&str], default: Value) -> Self {
        Self {
            name: name.to_string(),
            path: path.iter().map(|s| s.to_string()).collect(),
            default,
        }
    }
}

/// A required key in a fetched page, dotted for nested paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationRule {
    pub key: String,
}

/// Fallback scrape of the rendered program listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Whether the scrape fallback runs when the API yields nothing
    #[serde(default = "defaults::enabled")]
    pub enabled: bool,

    /// Listing page URL, without the page parameter
    #[serde(default = "defaults::page_url")]
    pub page_url: String,

    /// Query parameter carrying the page number
    #[serde(default = "defaults::browser_page_param")]
    pub page_param: String,

    /// CSS selector matching one program card
    #[serde(default = "defaults::card_selector")]
    pub card_selector: String,

    /// CSS selector for pagination links; the largest number found is the page count
    #[serde(default)]
    pub pagination_selector: Option<String>,

    /// Mark scraped programs as public, validated bounties
    #[serde(default = "defaults::enabled")]
    pub listed_are_active: bool,

    /// Card fields to scrape
    #[serde(default = "defaults::scrape_fields")]
    pub fields: Vec<ScrapeField>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::enabled(),
            page_url: defaults::page_url(),
            page_param: defaults::browser_page_param(),
            card_selector: defaults::card_selector(),
            pagination_selector: None,
            listed_are_active: defaults::enabled(),
            fields: defaults::scrape_fields(),
        }
    }
}

/// Maps a CSS selector inside a card to an item key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapeField {
    /// Item key the scraped text is stored under
    pub key: String,

    /// CSS selector relative to the card
    pub selector: String,

    /// Read this attribute instead of the element text; `href` values are
    /// resolved against the page URL
    #[serde(default)]
    pub attr: Option<String>,

    /// Text used when the selector matches nothing
    #[serde(default = "defaults::not_available")]
    pub default: String,
}

/// Telegram bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Bot API root
    #[serde(default = "defaults::api_base")]
    pub api_base: String,

    /// File holding the bot token
    #[serde(default = "defaults::token_file")]
    pub token_file: PathBuf,

    /// File holding the shared subscription secret
    #[serde(default = "defaults::secret_file")]
    pub secret_file: PathBuf,

    /// Long-poll duration for inbound updates in seconds
    #[serde(default = "defaults::poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Minimum delay after every outbound message in milliseconds
    #[serde(default = "defaults::send_delay")]
    pub send_delay_ms: u64,

    /// Transport limit for a single message, in UTF-16 code units
    #[serde(default = "defaults::max_message_len")]
    pub max_message_len: usize,

    /// Reply for unauthenticated senders of restricted commands
    #[serde(default = "defaults::unauthenticated_reply")]
    pub unauthenticated_reply: String,
}

impl BotConfig {
    pub fn send_delay(&self) -> Duration {
        Duration::from_millis(self.send_delay_ms)
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::api_base(),
            token_file: defaults::token_file(),
            secret_file: defaults::secret_file(),
            poll_timeout_secs: defaults::poll_timeout(),
            send_delay_ms: defaults::send_delay(),
            max_message_len: defaults::max_message_len(),
            unauthenticated_reply: defaults::unauthenticated_reply(),
        }
    }
}

/// Outbound broadcast settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Send per-subscriber diffs; when off the raw snapshot is sent
    #[serde(default = "defaults::enabled")]
    pub use_diff: bool,

    /// Gate content on subscriber flags; when off everyone gets raw data
    #[serde(default = "defaults::enabled")]
    pub auth: bool,

    /// Display width of one rendered diff entry, in graphemes
    #[serde(default = "defaults::max_entry_width")]
    pub max_entry_width: usize,

    /// Seconds between extraction cycles in watch mode
    #[serde(default = "defaults::interval")]
    pub interval_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            use_diff: defaults::enabled(),
            auth: defaults::enabled(),
            max_entry_width: defaults::max_entry_width(),
            interval_secs: defaults::interval(),
        }
    }
}

/// Filesystem locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root directory of the local store
    #[serde(default = "defaults::storage")]
    pub storage: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            storage: defaults::storage(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "defaults::level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use serde_json::Value;

    use super::{FieldSpec, ScrapeField, ValidationRule};

    pub fn enabled() -> bool {
        true
    }

    // Source defaults
    pub fn base_url() -> String {
        "https://api.yeswehack.com/programs?resultsPerPage=100&filter%5Btype%5D%5B%5D=bug-bounty"
            .into()
    }
    pub fn page_param() -> String {
        "page[number]".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; bountywatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        15
    }
    pub fn max_attempts() -> u32 {
        3
    }
    pub fn retry_delay() -> u64 {
        5_000
    }
    pub fn rate_limit() -> u64 {
        1_000
    }
    pub fn fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::new("title", &["title"], Value::from("N/A")),
            FieldSpec::new("last_update_at", &["last_update_at"], Value::Null),
        ]
    }
    pub fn validation() -> Vec<ValidationRule> {
        vec![ValidationRule {
            key: "items".into(),
        }]
    }

    // Browser defaults
    pub fn page_url() -> String {
        "https://yeswehack.com/programs".into()
    }
    pub fn browser_page_param() -> String {
        "page".into()
    }
    pub fn card_selector() -> String {
        "div.program-card".into()
    }
    pub fn not_available() -> String {
        "N/A".into()
    }
    pub fn scrape_fields() -> Vec<ScrapeField> {
        vec![
            ScrapeField {
                key: "title".into(),
                selector: "h2".into(),
                attr: None,
                default: not_available(),
            },
            ScrapeField {
                key: "country".into(),
                selector: ".country".into(),
                attr: None,
                default: not_available(),
            },
            ScrapeField {
                key: "reward_range".into(),
                selector: ".reward".into(),
                attr: None,
                default: not_available(),
            },
        ]
    }

    // Bot defaults
    pub fn api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn token_file() -> PathBuf {
        PathBuf::from("instance/token.txt")
    }
    pub fn secret_file() -> PathBuf {
        PathBuf::from("instance/secret.txt")
    }
    pub fn poll_timeout() -> u64 {
        60
    }
    pub fn send_delay() -> u64 {
        2_000
    }
    pub fn max_message_len() -> usize {
        crate::services::TELEGRAM_MAX_MESSAGE_LEN
    }
    pub fn unauthenticated_reply() -> String {
        "You must subscribe to use this robot.".into()
    }

    // Broadcast defaults
    pub fn max_entry_width() -> usize {
        40
    }
    pub fn interval() -> u64 {
        3_600
    }

    // Path defaults
    pub fn storage() -> PathBuf {
        PathBuf::from("instance")
    }

    // Logging defaults
    pub fn level() -> String {
        "info".into()
    }
}
