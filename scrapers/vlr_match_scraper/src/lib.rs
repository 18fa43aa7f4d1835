pub mod cache;
pub mod command;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod health;
pub mod metrics;
pub mod normalizer;
pub mod parser;
pub mod router;
pub mod scheduler;
pub mod serve;
pub mod teams;
pub mod types;

use anyhow::{Context, Result};
use std::{path::Path, sync::Arc};
use tracing::info;

use cache::MatchCache;
use config::ScraperConfig;
use fetcher::WebHtmlFetcher;
use health::{AlertSink, HealthMonitor, LogAlertSink, WebhookAlertSink};
use normalizer::Normalizer;
use router::QueryRouter;
use teams::TeamDirectory;

pub use error::{FetchError, ParseError, UserError};
pub use types::{MatchRecord, MatchRequest, MatchStatus, Page, QueryKind};

/// Wire the live service: HTTP fetcher, shared cache and health monitor, and
/// the alert sink picked from configuration.
pub fn build_router(config: ScraperConfig) -> Result<QueryRouter<WebHtmlFetcher>> {
    let directory = match &config.query.team_aliases_path {
        Some(path) => TeamDirectory::load_from_file(Path::new(path))?,
        None => TeamDirectory::with_builtin_teams(),
    };

    let sink: Arc<dyn AlertSink> = match &config.health.alert_webhook_url {
        Some(url) => {
            info!("Health alerts go to the configured webhook");
            Arc::new(WebhookAlertSink::new(url.clone()))
        }
        None => Arc::new(LogAlertSink),
    };

    let fetcher = WebHtmlFetcher::new(&config).context("Failed to build HTTP fetcher")?;
    let normalizer = Normalizer::new(Arc::new(directory), &config.scraping.base_url);
    let cache = Arc::new(MatchCache::new(config.cache.capacity));
    let health = Arc::new(HealthMonitor::from_config(&config.health, sink));

    Ok(QueryRouter::new(fetcher, normalizer, cache, health, config))
}
