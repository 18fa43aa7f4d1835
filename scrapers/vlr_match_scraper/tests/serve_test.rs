use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

use vlr_match_scraper::{
    cache::MatchCache,
    config::ScraperConfig,
    fetcher::HtmlFetcher,
    health::{HealthMonitor, LogAlertSink},
    normalizer::Normalizer,
    router::QueryRouter,
    serve::serve_lines,
    teams::TeamDirectory,
    FetchError,
};

const BASE_URL: &str = "https://www.vlr.gg";
const RESULTS_PAGE: &str = include_str!("fixtures/results_page.html");
const UPCOMING_PAGE: &str = include_str!("fixtures/upcoming_page.html");

/// Answers both listings, slowly enough that replies land after input ends.
struct SlowSite {
    delay: Duration,
}

#[async_trait]
impl HtmlFetcher for SlowSite {
    async fn fetch_html(&self, url: &str) -> Result<String, FetchError> {
        tokio::time::sleep(self.delay).await;
        match url.strip_prefix(BASE_URL) {
            Some("/matches/results") => Ok(RESULTS_PAGE.to_string()),
            Some("/matches") => Ok(UPCOMING_PAGE.to_string()),
            _ => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            }),
        }
    }
}

fn router(delay: Duration) -> Arc<QueryRouter<SlowSite>> {
    let config = ScraperConfig::default();
    let normalizer = Normalizer::new(Arc::new(TeamDirectory::with_builtin_teams()), BASE_URL);
    let cache = Arc::new(MatchCache::new(config.cache.capacity));
    let health = Arc::new(HealthMonitor::from_config(&config.health, Arc::new(LogAlertSink)));
    Arc::new(QueryRouter::new(SlowSite { delay }, normalizer, cache, health, config))
}

async fn run(input: &str, delay: Duration) -> (usize, Vec<String>) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handled = serve_lines(router(delay), input.as_bytes(), tx).await.unwrap();
    let mut replies = Vec::new();
    while let Some(reply) = rx.recv().await {
        replies.push(reply);
    }
    (handled, replies)
}

#[test_log::test(tokio::test)]
async fn test_queries_in_flight_are_answered_before_quit_returns() {
    let input = "results 5\nupcoming 3\nstandings\nstatus\nquit\nresults 2\n";
    let (handled, replies) = run(input, Duration::from_millis(50)).await;

    assert_eq!(handled, 4);
    assert_eq!(replies.len(), 4);

    let pages: Vec<_> = replies.iter().filter(|r| r.contains("\"total_records\"")).collect();
    assert_eq!(pages.len(), 2);
    assert!(pages.iter().any(|r| r.contains("\"total_records\": 12")));
    assert!(pages.iter().any(|r| r.contains("\"total_records\": 4")));

    assert!(replies.iter().any(|r| r.starts_with("invalid request")));
    assert!(replies.iter().any(|r| r.contains("\"cached_queries\"")));
}

#[tokio::test]
async fn test_end_of_input_waits_for_queries() {
    let (handled, replies) = run("\nresults 2\nupcoming 1 2", Duration::from_millis(30)).await;

    assert_eq!(handled, 2);
    assert_eq!(replies.len(), 2);
    assert!(replies.iter().all(|r| r.contains("\"page_index\"")));
}
