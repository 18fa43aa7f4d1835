//! Match listing parser.
//!
//! The listing pages change shape without notice, so extraction is an ordered
//! list of strategies. The first one that yields at least one plausible row
//! wins; later ones never run for that document.

use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::{
    error::ParseError,
    types::{Listing, RawRecord},
};

pub type Strategy = fn(&Html) -> Vec<RawRecord>;

/// Structural selectors first, then looser link matching, then plain text.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("match-item", match_item_rows),
    ("match-link", match_link_rows),
    ("text-pattern", text_pattern_rows),
];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("hard-coded selector is valid")
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("hard-coded pattern is valid")
}

static DATE_OR_ROW: LazyLock<Selector> =
    LazyLock::new(|| selector("div.wf-label.mod-large, a.match-item"));
static ROW_TIME: LazyLock<Selector> = LazyLock::new(|| selector(".match-item-time"));
static ROW_TEAM: LazyLock<Selector> = LazyLock::new(|| selector(".match-item-vs-team-name"));
static ROW_SCORE: LazyLock<Selector> = LazyLock::new(|| selector(".match-item-vs-team-score"));
static ROW_STATUS: LazyLock<Selector> = LazyLock::new(|| selector(".ml-status"));
static ROW_ETA: LazyLock<Selector> = LazyLock::new(|| selector(".ml-eta"));
static ROW_EVENT: LazyLock<Selector> = LazyLock::new(|| selector(".match-item-event"));
static ROW_SERIES: LazyLock<Selector> = LazyLock::new(|| selector(".match-item-event-series"));
static LINK: LazyLock<Selector> = LazyLock::new(|| selector("a[href]"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));

static MATCH_HREF: LazyLock<Regex> = LazyLock::new(|| regex(r"^/\d+(/|$)"));
static TIME_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?i)^(\d{1,2}:\d{2}(\s?[ap]m)?|tbd)$"));
static SCORE_TOKEN: LazyLock<Regex> = LazyLock::new(|| regex(r"(?i)^(\d{1,3}|[–—-]|tbd)$"));
static STATUS_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?i)^(completed|final|live|upcoming|scheduled|tbd)$"));
static ETA_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?i)^(\d+\s*[wdhms]\s*)+(ago|from now)?$"));
static LETTER: LazyLock<Regex> = LazyLock::new(|| regex(r"\p{L}"));

/// Trimmed, non-empty text fragments under `element`, in document order.
fn text_tokens(element: ElementRef<'_>) -> Vec<String> {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn joined_text(element: ElementRef<'_>) -> String {
    text_tokens(element).join(" ")
}

/// Text of the element's own text children, ignoring nested tags.
fn own_text(element: ElementRef<'_>) -> String {
    element
        .children()
        .filter_map(|child| child.value().as_text().map(|t| t.trim().to_string()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_text(row: ElementRef<'_>, selector: &Selector) -> Option<String> {
    row.select(selector)
        .next()
        .map(joined_text)
        .filter(|t| !t.is_empty())
}

/// Current layout: date headers followed by `a.match-item` rows.
pub fn match_item_rows(document: &Html) -> Vec<RawRecord> {
    let mut records = Vec::new();
    let mut date_label: Option<String> = None;

    for element in document.select(&DATE_OR_ROW) {
        if element.value().name() == "div" {
            let label = own_text(element);
            date_label = (!label.is_empty()).then_some(label);
            continue;
        }

        let event_text = element
            .select(&ROW_EVENT)
            .next()
            .map(own_text)
            .filter(|t| !t.is_empty());

        records.push(RawRecord {
            teams: element.select(&ROW_TEAM).map(joined_text).collect(),
            scores: element.select(&ROW_SCORE).map(joined_text).collect(),
            time_text: first_text(element, &ROW_TIME),
            date_label: date_label.clone(),
            eta_text: first_text(element, &ROW_ETA),
            status_text: first_text(element, &ROW_STATUS),
            event_text,
            series_text: first_text(element, &ROW_SERIES),
            href: element.value().attr("href").map(str::to_string),
        });
    }

    records
}

/// Any link to a numeric match id, read positionally:
/// `[time?, team, score, team, score, status, eta?, series?, event?]`.
pub fn match_link_rows(document: &Html) -> Vec<RawRecord> {
    let mut records = Vec::new();

    for link in document.select(&LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !MATCH_HREF.is_match(href) {
            continue;
        }

        let tokens = text_tokens(link);
        let offset = match tokens.first() {
            Some(first) if TIME_TOKEN.is_match(first) => 1,
            _ => 0,
        };
        if !is_match_quad(&tokens, offset) {
            debug!("Skipping link {} with text {:?}", href, tokens);
            continue;
        }

        let mut record = RawRecord {
            teams: vec![tokens[offset].clone(), tokens[offset + 2].clone()],
            scores: vec![tokens[offset + 1].clone(), tokens[offset + 3].clone()],
            time_text: (offset == 1).then(|| tokens[0].clone()),
            href: Some(href.to_string()),
            ..Default::default()
        };

        let rest = &tokens[offset + 4..];
        if let Some(status_idx) = rest.iter().position(|t| STATUS_TOKEN.is_match(t)) {
            record.status_text = Some(rest[status_idx].clone());
            let mut tail = rest[status_idx + 1..].iter();
            let mut next = tail.next();
            if let Some(eta) = next.filter(|t| ETA_TOKEN.is_match(t)) {
                record.eta_text = Some(eta.clone());
                next = tail.next();
            }
            match (next, tail.next()) {
                (Some(series), Some(event)) => {
                    record.series_text = Some(series.clone());
                    record.event_text = Some(event.clone());
                }
                (Some(event), None) => record.event_text = Some(event.clone()),
                _ => {}
            }
        }

        records.push(record);
    }

    records
}

/// Last resort: scan the visible text for `team, score, team, score`.
pub fn text_pattern_rows(document: &Html) -> Vec<RawRecord> {
    let tokens = visible_tokens(document);
    let mut records = Vec::new();
    let mut i = 0;

    while i + 3 < tokens.len() {
        if !is_match_quad(&tokens, i) {
            i += 1;
            continue;
        }

        let mut record = RawRecord {
            teams: vec![tokens[i].clone(), tokens[i + 2].clone()],
            scores: vec![tokens[i + 1].clone(), tokens[i + 3].clone()],
            time_text: i
                .checked_sub(1)
                .map(|p| &tokens[p])
                .filter(|t| TIME_TOKEN.is_match(t))
                .cloned(),
            ..Default::default()
        };

        let mut j = i + 4;
        if let Some(status) = tokens.get(j).filter(|t| STATUS_TOKEN.is_match(t)) {
            record.status_text = Some(status.clone());
            j += 1;
        }
        if let Some(eta) = tokens.get(j).filter(|t| ETA_TOKEN.is_match(t)) {
            record.eta_text = Some(eta.clone());
            j += 1;
        }

        records.push(record);
        i = j;
    }

    records
}

fn is_team_token(token: &str) -> bool {
    let len = token.chars().count();
    (2..=48).contains(&len)
        && LETTER.is_match(token)
        && !SCORE_TOKEN.is_match(token)
        && !TIME_TOKEN.is_match(token)
        && !STATUS_TOKEN.is_match(token)
        && !ETA_TOKEN.is_match(token)
}

fn is_match_quad(tokens: &[String], at: usize) -> bool {
    tokens.len() >= at + 4
        && is_team_token(&tokens[at])
        && SCORE_TOKEN.is_match(&tokens[at + 1])
        && is_team_token(&tokens[at + 2])
        && SCORE_TOKEN.is_match(&tokens[at + 3])
}

/// Body text nodes, skipping script and style contents.
fn visible_tokens(document: &Html) -> Vec<String> {
    let Some(body) = document.select(&BODY).next() else {
        return Vec::new();
    };

    body.descendants()
        .filter_map(|node| {
            let Node::Text(text) = node.value() else {
                return None;
            };
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name()))
                .is_some_and(|name| matches!(name, "script" | "style" | "noscript"));
            let trimmed = text.trim();
            (!hidden && !trimmed.is_empty()).then(|| trimmed.to_string())
        })
        .collect()
}

pub struct MatchListParser {
    strategies: Vec<(&'static str, Strategy)>,
}

impl Default for MatchListParser {
    fn default() -> Self {
        Self::new()
    }
}

impl MatchListParser {
    pub fn new() -> Self {
        Self::with_strategies(STRATEGIES.to_vec())
    }

    pub fn with_strategies(strategies: Vec<(&'static str, Strategy)>) -> Self {
        Self { strategies }
    }

    /// Rows in page order: most recent first on the results listing,
    /// soonest first on the upcoming one.
    pub fn parse(&self, html: &str, listing: Listing) -> Result<Vec<RawRecord>, ParseError> {
        let document = Html::parse_document(html);

        for (name, strategy) in &self.strategies {
            let records: Vec<RawRecord> = strategy(&document)
                .into_iter()
                .filter(RawRecord::is_plausible)
                .collect();
            if !records.is_empty() {
                info!(
                    "Parsed {} {} rows with the {} strategy",
                    records.len(),
                    listing.target(),
                    name
                );
                return Ok(records);
            }
            debug!("Strategy {} found nothing on the {} page", name, listing.target());
        }

        if visible_tokens(&document).is_empty() {
            warn!("The {} page came back empty", listing.target());
            Err(ParseError::Empty)
        } else {
            warn!(
                "No match rows found on the {} page. Website structure might have changed.",
                listing.target()
            );
            Err(ParseError::StructureChanged)
        }
    }
}
