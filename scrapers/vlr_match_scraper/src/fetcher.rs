use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use nonzero_ext::nonzero;
use std::{num::NonZeroU32, sync::Arc, time::Duration, time::Instant};
use tracing::{debug, info, warn};

use crate::{
    config::ScraperConfig,
    error::FetchError,
    metrics::{FetchMetrics, MetricsCollector},
};

#[async_trait]
pub trait HtmlFetcher: Send + Sync {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError>;

    /// Request counters, for fetchers that keep them.
    fn fetch_metrics(&self) -> Option<FetchMetrics> {
        None
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `max_retries` extra attempts are spent. The delay doubles after each try.
pub async fn retry_with_backoff<F, Fut, T>(
    max_retries: u32,
    initial_delay: Duration,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, FetchError>>,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                attempt += 1;
                info!("Retry attempt {} after error: {}", attempt, e);
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct WebHtmlFetcher {
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    metrics: MetricsCollector,
    max_retries: u32,
    retry_backoff: Duration,
}

impl WebHtmlFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(&config.scraping.user_agent)
            .timeout(config.scraping.request_timeout())
            .build()
            .map_err(|e| FetchError::Network {
                url: config.scraping.base_url.clone(),
                message: format!("failed to create HTTP client: {}", e),
            })?;

        let rps = NonZeroU32::new(config.rate_limits.requests_per_second).unwrap_or(nonzero!(2u32));
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rps)));

        Ok(Self {
            client,
            rate_limiter,
            metrics: MetricsCollector::new(),
            max_retries: config.scraping.max_retries,
            retry_backoff: config.scraping.retry_backoff(),
        })
    }

    pub fn metrics(&self) -> FetchMetrics {
        self.metrics.get_metrics()
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let wait_start = Instant::now();
        self.rate_limiter.until_ready().await;
        self.metrics.record_rate_limit_wait(wait_start.elapsed());

        let tracker = self.metrics.record_request_start();
        let result = self.send(url).await;
        tracker.finish(result.as_ref().err().map(|e| e.to_string()));
        result
    }

    async fn send(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "text/html,application/xhtml+xml")
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify(url, e))
    }
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl HtmlFetcher for WebHtmlFetcher {
    fn fetch_metrics(&self) -> Option<FetchMetrics> {
        Some(self.metrics())
    }

    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        info!("Fetching {}", url);
        let result = retry_with_backoff(self.max_retries, self.retry_backoff, |attempt| {
            if attempt > 0 {
                self.metrics.record_retry();
            }
            self.fetch_once(url)
        })
        .await;

        match &result {
            Ok(html) => debug!("Got {} bytes from {}", html.len(), url),
            Err(e) => warn!("Giving up on {}: {}", url, e),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn timeout() -> FetchError {
        FetchError::Timeout {
            url: "https://www.vlr.gg/matches".to_string(),
        }
    }

    #[tokio::test]
    async fn test_retry_stops_after_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(2, Duration::from_millis(1), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(timeout()) }
        })
        .await;

        assert_eq!(result, Err(timeout()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_skips_client_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(2, Duration::from_millis(1), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(FetchError::HttpStatus {
                    url: "https://www.vlr.gg/matches".to_string(),
                    status: 404,
                })
            }
        })
        .await;

        assert!(matches!(result, Err(FetchError::HttpStatus { status: 404, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let result = retry_with_backoff(2, Duration::from_millis(1), |attempt| async move {
            if attempt == 0 {
                Err(timeout())
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result, Ok(1));
    }
}
