use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Completed,
    Live,
    Upcoming,
}

/// A normalized match row. Upcoming matches never carry scores; every other
/// status always carries both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub team_a: String,
    pub team_b: String,
    pub score_a: Option<u32>,
    pub score_b: Option<u32>,
    pub status: MatchStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub tournament: String,
    pub stage: Option<String>,
    pub match_url: String,
}

impl MatchRecord {
    pub fn has_score(&self) -> bool {
        self.score_a.is_some() && self.score_b.is_some()
    }
}

/// Fields as they were found in the page, before any cleanup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub teams: Vec<String>,
    pub scores: Vec<String>,
    pub time_text: Option<String>,
    pub date_label: Option<String>,
    pub eta_text: Option<String>,
    pub status_text: Option<String>,
    pub event_text: Option<String>,
    pub series_text: Option<String>,
    pub href: Option<String>,
}

impl RawRecord {
    /// Two non-empty team names is the minimum a parser layer must produce
    /// for a row to count.
    pub fn is_plausible(&self) -> bool {
        self.teams.iter().filter(|t| !t.trim().is_empty()).count() >= 2
    }
}

/// One page on the source site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Listing {
    Results,
    Upcoming,
}

impl Listing {
    pub const ALL: [Listing; 2] = [Listing::Results, Listing::Upcoming];

    pub fn path(&self) -> &'static str {
        match self {
            Listing::Results => "/matches/results",
            Listing::Upcoming => "/matches",
        }
    }

    /// Name the health monitor tracks this page under.
    pub fn target(&self) -> &'static str {
        match self {
            Listing::Results => "results",
            Listing::Upcoming => "upcoming",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Results,
    Upcoming,
    Team,
    Tournament,
}

impl QueryKind {
    /// Listings a query reads, in the order their rows are presented.
    pub fn listings(&self) -> &'static [Listing] {
        match self {
            QueryKind::Results => &[Listing::Results],
            QueryKind::Upcoming => &[Listing::Upcoming],
            QueryKind::Team | QueryKind::Tournament => &[Listing::Upcoming, Listing::Results],
        }
    }

    pub fn needs_filter(&self) -> bool {
        matches!(self, QueryKind::Team | QueryKind::Tournament)
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryKind::Results => "results",
            QueryKind::Upcoming => "upcoming",
            QueryKind::Team => "team",
            QueryKind::Tournament => "tournament",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for QueryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "results" | "result" | "vlr" => Ok(QueryKind::Results),
            "upcoming" | "schedule" | "matches" => Ok(QueryKind::Upcoming),
            "team" => Ok(QueryKind::Team),
            "tournament" | "event" => Ok(QueryKind::Tournament),
            other => Err(format!("unknown query kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRequest {
    pub kind: QueryKind,
    pub filter_text: Option<String>,
    pub count: usize,
    pub page: Option<usize>,
}

impl MatchRequest {
    pub fn new(kind: QueryKind, count: usize) -> Self {
        Self {
            kind,
            filter_text: None,
            count,
            page: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_text = Some(filter.into());
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }
}

/// Cache key. Requests that differ only by page number share a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueryKey {
    pub kind: QueryKind,
    pub filter: String,
    pub page_size: usize,
}

impl QueryKey {
    pub fn new(kind: QueryKind, filter: Option<&str>, page_size: usize) -> Self {
        Self {
            kind,
            filter: filter.map(normalize_filter).unwrap_or_default(),
            page_size,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.filter, self.page_size)
    }
}

/// Lowercased, whitespace-collapsed filter text.
pub fn normalize_filter(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub records: Vec<MatchRecord>,
    /// 1-based.
    pub page_index: usize,
    pub total_pages: usize,
    pub total_records: usize,
    pub stale: bool,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub fn hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamColorEntry {
    pub team_key: String,
    pub color: Rgb,
}
