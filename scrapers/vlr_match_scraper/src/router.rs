use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    cache::{CacheEntry, MatchCache},
    config::ScraperConfig,
    error::{ParseError, PipelineError, UserError},
    fetcher::HtmlFetcher,
    health::{HealthMonitor, Outcome},
    normalizer::Normalizer,
    parser::MatchListParser,
    teams::{team_key, TeamDirectory},
    types::{normalize_filter, Listing, MatchRecord, MatchRequest, Page, QueryKey, QueryKind},
};

/// Slice one page out of a cached result set. Page indexes are 1-based; an
/// empty set or an index past the last page is `NoResults`.
pub fn paginate(entry: &CacheEntry, page_index: usize, stale: bool) -> Result<Page, UserError> {
    let page_size = entry.key.page_size.max(1);
    let total_records = entry.records.len();
    let total_pages = total_records.div_ceil(page_size);

    if page_index == 0 || page_index > total_pages {
        return Err(UserError::NoResults);
    }

    let records = entry
        .records
        .iter()
        .skip((page_index - 1) * page_size)
        .take(page_size)
        .cloned()
        .collect();

    Ok(Page {
        records,
        page_index,
        total_pages,
        total_records,
        stale,
        fetched_at: entry.fetched_at,
    })
}

pub struct QueryRouter<F: HtmlFetcher> {
    fetcher: F,
    parser: MatchListParser,
    normalizer: Normalizer,
    cache: Arc<MatchCache>,
    health: Arc<HealthMonitor>,
    config: ScraperConfig,
}

impl<F: HtmlFetcher> QueryRouter<F> {
    pub fn new(
        fetcher: F,
        normalizer: Normalizer,
        cache: Arc<MatchCache>,
        health: Arc<HealthMonitor>,
        config: ScraperConfig,
    ) -> Self {
        Self {
            fetcher,
            parser: MatchListParser::new(),
            normalizer,
            cache,
            health,
            config,
        }
    }

    pub fn with_parser(mut self, parser: MatchListParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn cache(&self) -> &MatchCache {
        &self.cache
    }

    pub fn health(&self) -> &HealthMonitor {
        &self.health
    }

    pub fn directory(&self) -> &TeamDirectory {
        self.normalizer.directory()
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    pub fn listing_url(&self, listing: Listing) -> String {
        format!(
            "{}{}",
            self.config.scraping.base_url.trim_end_matches('/'),
            listing.path()
        )
    }

    /// Checks bounds without touching the network or the cache.
    pub fn validate(&self, request: &MatchRequest) -> Result<(QueryKey, usize), UserError> {
        let max_count = self.config.query.max_count;
        if request.count == 0 || request.count > max_count {
            return Err(UserError::InvalidFilter(format!(
                "count must be between 1 and {}",
                max_count
            )));
        }

        let page_index = request.page.unwrap_or(1);
        if page_index == 0 {
            return Err(UserError::InvalidFilter("page must be 1 or higher".to_string()));
        }

        let filter = if request.kind.needs_filter() {
            let filter = request
                .filter_text
                .as_deref()
                .map(normalize_filter)
                .unwrap_or_default();
            let min_len = self.config.query.min_filter_len;
            if filter.chars().count() < min_len {
                return Err(UserError::InvalidFilter(format!(
                    "{} filter must be at least {} characters",
                    request.kind, min_len
                )));
            }
            Some(filter)
        } else {
            None
        };

        Ok((QueryKey::new(request.kind, filter.as_deref(), request.count), page_index))
    }

    pub async fn handle(&self, request: &MatchRequest) -> Result<Page, UserError> {
        let (key, page_index) = self.validate(request)?;

        if let Some(entry) = self.cache.get(&key) {
            info!("Cache hit for {}", key);
            return paginate(&entry, page_index, false);
        }

        match self.refresh_key(&key, false).await {
            Ok(entry) => paginate(&entry, page_index, false),
            Err(e) => match self.cache.get_or_stale(&key) {
                Some((entry, _)) => {
                    warn!("Serving stale results for {} after error: {}", key, e);
                    paginate(&entry, page_index, true)
                }
                None => {
                    warn!("No results for {}: {}", key, e);
                    Err(UserError::NoResults)
                }
            },
        }
    }

    /// Re-run the pipeline for one listing's unfiltered default query even if
    /// it is cached. Records health for the listing and warms the cache.
    pub async fn refresh(&self, listing: Listing) -> Result<usize, PipelineError> {
        let kind = match listing {
            Listing::Results => QueryKind::Results,
            Listing::Upcoming => QueryKind::Upcoming,
        };
        let key = QueryKey::new(kind, None, self.config.query.default_count);
        let entry = self.refresh_key(&key, true).await?;
        Ok(entry.records.len())
    }

    /// Fetch under the per-key lock. Unless `force` is set, a request that
    /// waited on the lock picks up whatever the holder stored instead of
    /// fetching again.
    async fn refresh_key(
        &self,
        key: &QueryKey,
        force: bool,
    ) -> Result<Arc<CacheEntry>, PipelineError> {
        let key_lock = self.cache.key_lock(key);
        let _guard = key_lock.lock().await;

        if let Some(entry) = self.cache.get(key).filter(|_| !force) {
            debug!("{} was refreshed while waiting", key);
            return Ok(entry);
        }

        info!("Cache miss for {}, fetching", key);
        let records = self.run_pipeline(key).await?;
        Ok(self
            .cache
            .put(key.clone(), records, self.config.cache.ttl_for(key.kind)))
    }

    async fn run_pipeline(&self, key: &QueryKey) -> Result<Vec<MatchRecord>, PipelineError> {
        let listings = key.kind.listings();
        let urls: Vec<String> = listings.iter().map(|l| self.listing_url(*l)).collect();
        let pages = join_all(urls.iter().map(|url| self.fetcher.fetch_html(url))).await;
        let now = Utc::now();

        let mut records = Vec::new();
        let mut first_error = None;
        for ((listing, url), page) in listings.iter().zip(&urls).zip(pages) {
            let rows = page
                .map_err(PipelineError::from)
                .and_then(|html| self.read_listing(&html, *listing, url, now));
            match rows {
                Ok(rows) => {
                    self.health.record(listing.target(), Outcome::Success);
                    records.extend(rows);
                }
                Err(e) => {
                    warn!("Failed to read the {} listing: {}", listing.target(), e);
                    self.health.record(listing.target(), Outcome::failure(&e));
                    first_error.get_or_insert(e);
                }
            }
        }

        // A half-read team or tournament view would hide matches, so it is
        // not cached.
        if let Some(e) = first_error {
            return Err(e);
        }

        let records: Vec<MatchRecord> = records
            .into_iter()
            .filter(|record| self.matches_filter(key, record))
            .collect();
        info!("{} records for {}", records.len(), key);
        Ok(records)
    }

    /// Parsing is synchronous; the document never lives across an await.
    fn read_listing(
        &self,
        html: &str,
        listing: Listing,
        url: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<MatchRecord>, PipelineError> {
        let records: Vec<MatchRecord> = self
            .parser
            .parse(html, listing)?
            .into_iter()
            .filter_map(|raw| self.normalizer.normalize(raw, url, now))
            .collect();

        if records.is_empty() {
            return Err(ParseError::Empty.into());
        }
        Ok(records)
    }

    fn matches_filter(&self, key: &QueryKey, record: &MatchRecord) -> bool {
        match key.kind {
            QueryKind::Results | QueryKind::Upcoming => true,
            QueryKind::Team => {
                let alias = team_key(&self.normalizer.directory().canonical(&key.filter));
                [&record.team_a, &record.team_b].iter().any(|name| {
                    let name = team_key(name);
                    name.contains(&key.filter) || name.contains(&alias)
                })
            }
            QueryKind::Tournament => record.tournament.to_lowercase().contains(&key.filter),
        }
    }
}
