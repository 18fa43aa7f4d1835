use serde::{Deserialize, Serialize};
use std::{env, str::FromStr, time::Duration};
use tracing::warn;

use crate::types::QueryKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimits {
    pub requests_per_second: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_second: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScrapingConfig {
    pub base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.vlr.gg".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            request_timeout_secs: 10,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

impl ScrapingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl_results_secs: u64,
    pub ttl_upcoming_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_results_secs: 300,
            ttl_upcoming_secs: 300,
            capacity: 256,
        }
    }
}

impl CacheConfig {
    /// Team and tournament views mix live results in, so they age like results.
    pub fn ttl_for(&self, kind: QueryKind) -> Duration {
        match kind {
            QueryKind::Upcoming => Duration::from_secs(self.ttl_upcoming_secs),
            QueryKind::Results | QueryKind::Team | QueryKind::Tournament => {
                Duration::from_secs(self.ttl_results_secs)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthConfig {
    pub failure_threshold: u32,
    pub alert_cooldown_secs: u64,
    pub check_interval_secs: u64,
    pub alert_webhook_url: Option<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            alert_cooldown_secs: 1800,
            check_interval_secs: 600,
            alert_webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryConfig {
    pub max_count: usize,
    pub default_count: usize,
    pub min_filter_len: usize,
    pub team_aliases_path: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_count: 10,
            default_count: 5,
            min_filter_len: 3,
            team_aliases_path: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScraperConfig {
    pub scraping: ScrapingConfig,
    pub rate_limits: RateLimits,
    pub cache: CacheConfig,
    pub health: HealthConfig,
    pub query: QueryConfig,
}

/// Unset variables keep the default; unparsable ones are logged and ignored.
fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", name, raw);
            None
        }
    }
}

impl ScraperConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(base_url) = env::var("VLR_BASE_URL") {
            config.scraping.base_url = base_url.trim_end_matches('/').to_string();
        }
        if let Ok(user_agent) = env::var("SCRAPER_USER_AGENT") {
            config.scraping.user_agent = user_agent;
        }
        if let Some(timeout) = parse_env("SCRAPER_TIMEOUT_SECS") {
            config.scraping.request_timeout_secs = timeout;
        }
        if let Some(retries) = parse_env("FETCH_MAX_RETRIES") {
            config.scraping.max_retries = retries;
        }
        if let Some(backoff) = parse_env("FETCH_RETRY_BACKOFF_MS") {
            config.scraping.retry_backoff_ms = backoff;
        }
        if let Some(rps) = parse_env::<u32>("RATE_LIMIT_RPS") {
            if rps > 0 {
                config.rate_limits.requests_per_second = rps;
            }
        }

        if let Some(ttl) = parse_env("CACHE_TTL_RESULTS_SECS") {
            config.cache.ttl_results_secs = ttl;
        }
        if let Some(ttl) = parse_env("CACHE_TTL_UPCOMING_SECS") {
            config.cache.ttl_upcoming_secs = ttl;
        }
        if let Some(capacity) = parse_env::<usize>("CACHE_CAPACITY") {
            if capacity > 0 {
                config.cache.capacity = capacity;
            }
        }

        if let Some(threshold) = parse_env::<u32>("FAILURE_THRESHOLD") {
            if threshold > 0 {
                config.health.failure_threshold = threshold;
            }
        }
        if let Some(cooldown) = parse_env("ALERT_COOLDOWN_SECS") {
            config.health.alert_cooldown_secs = cooldown;
        }
        if let Some(interval) = parse_env("HEALTH_CHECK_INTERVAL_SECS") {
            config.health.check_interval_secs = interval;
        }
        if let Ok(webhook) = env::var("ALERT_WEBHOOK_URL") {
            if !webhook.trim().is_empty() {
                config.health.alert_webhook_url = Some(webhook);
            }
        }

        if let Some(max_count) = parse_env::<usize>("MAX_COUNT") {
            if max_count > 0 {
                config.query.max_count = max_count;
            }
        }
        if let Some(default_count) = parse_env("DEFAULT_COUNT") {
            config.query.default_count = default_count;
        }
        if let Some(min_len) = parse_env("MIN_FILTER_LEN") {
            config.query.min_filter_len = min_len;
        }
        if let Ok(path) = env::var("TEAM_ALIASES_PATH") {
            config.query.team_aliases_path = Some(path);
        }

        // A default above the maximum would make the bare command invalid.
        config.query.default_count = config.query.default_count.clamp(1, config.query.max_count);

        config
    }
}
