use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

use crate::{
    teams::{clean_name, TeamDirectory},
    types::{MatchRecord, MatchStatus, RawRecord},
};

const UNKNOWN_EVENT: &str = "Unknown Event";
const DATE_FORMATS: &[&str] = &["%a, %B %d, %Y", "%A, %B %d, %Y", "%B %d, %Y", "%Y-%m-%d"];
const TIME_FORMATS: &[&str] = &["%I:%M %p", "%I:%M%p", "%H:%M"];

static DURATION_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,4})\s*([wdhms])").expect("hard-coded pattern is valid"));

pub fn parse_score(score: &str) -> Option<u32> {
    let score = score.trim();
    if score.is_empty() || !score.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    score.parse().ok()
}

/// `"Thu, October 9, 2025"` (tags like "Today" tolerated) with `"2:00 PM"`.
/// A date without a readable time lands on midnight UTC.
pub fn parse_absolute_time(date_label: &str, time_text: Option<&str>) -> Option<DateTime<Utc>> {
    let date_text = date_label
        .split_whitespace()
        .filter(|w| !matches!(w.to_lowercase().as_str(), "today" | "yesterday" | "tomorrow"))
        .collect::<Vec<_>>()
        .join(" ");

    let date = DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&date_text, format).ok())?;

    let time = time_text
        .and_then(|t| {
            let t = t.trim().to_uppercase();
            TIME_FORMATS
                .iter()
                .find_map(|format| NaiveTime::parse_from_str(&t, format).ok())
        })
        .or_else(|| NaiveTime::from_hms_opt(0, 0, 0))?;

    Some(date.and_time(time).and_utc())
}

/// A real countdown never has more parts than `1w 2d 3h 4m 5s`.
const MAX_DURATION_PARTS: usize = 5;

/// `"1h 5m ago"` is in the past, `"3h 20m"` / `"2d from now"` in the future.
/// Text with too many parts or an out-of-range total yields `None`.
pub fn parse_relative_time(eta: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut total = Duration::zero();
    let mut parts = 0;

    for cap in DURATION_PART.captures_iter(eta) {
        parts += 1;
        if parts > MAX_DURATION_PARTS {
            debug!("Ignoring relative time with too many parts: {:.40}", eta);
            return None;
        }
        let amount: i64 = cap[1].parse().ok()?;
        let unit = match cap[2].to_ascii_lowercase().as_str() {
            "w" => Duration::try_weeks(amount)?,
            "d" => Duration::try_days(amount)?,
            "h" => Duration::try_hours(amount)?,
            "m" => Duration::try_minutes(amount)?,
            _ => Duration::try_seconds(amount)?,
        };
        total = total.checked_add(&unit)?;
    }

    if parts == 0 {
        return None;
    }
    if eta.to_lowercase().contains("ago") {
        now.checked_sub_signed(total)
    } else {
        now.checked_add_signed(total)
    }
}

/// Event text such as `"Playoffs–Upper Final"` plus the tournament name.
/// Without a separate series line, a dash in the event text splits stage from
/// tournament.
fn split_event(event: Option<&str>, series: Option<&str>) -> (String, Option<String>) {
    let event = event.map(clean_name).filter(|e| !e.is_empty());
    let series = series.map(clean_name).filter(|s| !s.is_empty());

    match (event, series) {
        (Some(event), Some(series)) => (event, Some(series)),
        (Some(event), None) => match event.split_once('–') {
            Some((stage, name)) if !name.trim().is_empty() => {
                (name.trim().to_string(), Some(stage.trim().to_string()))
            }
            _ => (event, None),
        },
        (None, Some(series)) => (UNKNOWN_EVENT.to_string(), Some(series)),
        (None, None) => (UNKNOWN_EVENT.to_string(), None),
    }
}

pub struct Normalizer {
    directory: Arc<TeamDirectory>,
    base_url: String,
}

impl Normalizer {
    pub fn new(directory: Arc<TeamDirectory>, base_url: &str) -> Self {
        Self {
            directory,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn directory(&self) -> &TeamDirectory {
        &self.directory
    }

    fn match_url(&self, href: Option<&str>, listing_url: &str) -> String {
        match href {
            Some(href) if href.starts_with("http://") || href.starts_with("https://") => {
                href.to_string()
            }
            Some(href) if href.starts_with('/') => format!("{}{}", self.base_url, href),
            _ => listing_url.to_string(),
        }
    }

    /// `None` when the row lacks two team names; the caller moves on to the
    /// next row.
    pub fn normalize(
        &self,
        raw: RawRecord,
        listing_url: &str,
        now: DateTime<Utc>,
    ) -> Option<MatchRecord> {
        let teams: Vec<String> = raw
            .teams
            .iter()
            .map(|t| self.directory.canonical(t))
            .filter(|t| !t.is_empty())
            .collect();
        if teams.len() < 2 {
            warn!("Skipping row without two team names: {:?}", raw.teams);
            return None;
        }

        let score_a = raw.scores.first().and_then(|s| parse_score(s));
        let score_b = raw.scores.get(1).and_then(|s| parse_score(s));
        let marker = raw.status_text.as_deref().unwrap_or("").to_lowercase();
        let is_live = marker.contains("live");
        let is_scheduled = ["upcoming", "scheduled", "tbd"]
            .iter()
            .any(|m| marker.contains(m));

        // Live rows always carry a pair, even before the first map ends.
        let (status, score_a, score_b) = match (score_a, score_b) {
            _ if is_live => (MatchStatus::Live, score_a.or(Some(0)), score_b.or(Some(0))),
            (Some(a), Some(b)) if !is_scheduled => (MatchStatus::Completed, Some(a), Some(b)),
            _ => (MatchStatus::Upcoming, None, None),
        };

        let start_time = raw
            .date_label
            .as_deref()
            .and_then(|label| parse_absolute_time(label, raw.time_text.as_deref()))
            .or_else(|| {
                raw.eta_text
                    .as_deref()
                    .and_then(|eta| parse_relative_time(eta, now))
            });

        let (tournament, stage) = split_event(raw.event_text.as_deref(), raw.series_text.as_deref());

        let record = MatchRecord {
            team_a: teams[0].clone(),
            team_b: teams[1].clone(),
            score_a,
            score_b,
            status,
            start_time,
            tournament,
            stage,
            match_url: self.match_url(raw.href.as_deref(), listing_url),
        };
        debug!("Normalized {} vs {} ({:?})", record.team_a, record.team_b, record.status);
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const LISTING: &str = "https://www.vlr.gg/matches/results";

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(TeamDirectory::with_builtin_teams()), "https://www.vlr.gg/")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 9, 18, 0, 0).unwrap()
    }

    fn raw(teams: &[&str], scores: &[&str], status: &str) -> RawRecord {
        RawRecord {
            teams: teams.iter().map(|t| t.to_string()).collect(),
            scores: scores.iter().map(|s| s.to_string()).collect(),
            status_text: Some(status.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(parse_score(" 13 "), Some(13));
        assert_eq!(parse_score("–"), None);
        assert_eq!(parse_score("2-1"), None);
        assert_eq!(parse_score(""), None);
    }

    #[test]
    fn test_completed_row() {
        let mut row = raw(&[" sen ", "G2  Esports"], &["2", "1"], "Completed");
        row.date_label = Some("Thu, October 9, 2025 Today".to_string());
        row.time_text = Some("2:00 PM".to_string());
        row.event_text = Some("Champions Tour 2025: Americas Stage 2".to_string());
        row.series_text = Some("Playoffs–Upper Final".to_string());
        row.href = Some("/542195/sentinels-vs-g2".to_string());

        let record = normalizer().normalize(row, LISTING, now()).unwrap();
        assert_eq!(
            record,
            MatchRecord {
                team_a: "Sentinels".to_string(),
                team_b: "G2 Esports".to_string(),
                score_a: Some(2),
                score_b: Some(1),
                status: MatchStatus::Completed,
                start_time: Some(Utc.with_ymd_and_hms(2025, 10, 9, 14, 0, 0).unwrap()),
                tournament: "Champions Tour 2025: Americas Stage 2".to_string(),
                stage: Some("Playoffs–Upper Final".to_string()),
                match_url: "https://www.vlr.gg/542195/sentinels-vs-g2".to_string(),
            }
        );
    }

    #[test]
    fn test_upcoming_row_drops_placeholder_scores() {
        let mut row = raw(&["Paper Rex", "DRX"], &["–", "–"], "Upcoming");
        row.eta_text = Some("3h 20m".to_string());
        let record = normalizer().normalize(row, LISTING, now()).unwrap();

        assert_eq!(record.status, MatchStatus::Upcoming);
        assert!(!record.has_score());
        assert_eq!(record.start_time, Some(now() + Duration::minutes(200)));
        assert_eq!(record.match_url, LISTING);
        assert_eq!(record.tournament, UNKNOWN_EVENT);
    }

    #[test]
    fn test_scheduled_marker_wins_over_zero_scores() {
        let row = raw(&["LOUD", "NRG"], &["0", "0"], "TBD");
        let record = normalizer().normalize(row, LISTING, now()).unwrap();
        assert_eq!(record.status, MatchStatus::Upcoming);
        assert_eq!((record.score_a, record.score_b), (None, None));
    }

    #[test]
    fn test_live_row_always_has_scores() {
        let row = raw(&["FNATIC", "Team Liquid"], &["1", ""], "LIVE");
        let record = normalizer().normalize(row, LISTING, now()).unwrap();
        assert_eq!(record.status, MatchStatus::Live);
        assert_eq!((record.score_a, record.score_b), (Some(1), Some(0)));
    }

    #[test]
    fn test_row_without_scores_or_marker_is_upcoming() {
        let row = raw(&["EDG", "Gen.G"], &[], "");
        let record = normalizer().normalize(row, LISTING, now()).unwrap();
        assert_eq!(record.status, MatchStatus::Upcoming);
        assert_eq!(record.team_a, "EDward Gaming");
    }

    #[test]
    fn test_single_team_is_skipped() {
        let row = raw(&["Sentinels", "   "], &["2", "0"], "Completed");
        assert!(normalizer().normalize(row, LISTING, now()).is_none());
    }

    #[test]
    fn test_event_dash_split() {
        assert_eq!(
            split_event(Some("Group Stage–Masters Toronto"), None),
            ("Masters Toronto".to_string(), Some("Group Stage".to_string()))
        );
        assert_eq!(split_event(None, None), (UNKNOWN_EVENT.to_string(), None));
    }

    #[test]
    fn test_relative_time() {
        assert_eq!(
            parse_relative_time("1h 5m ago", now()),
            Some(now() - Duration::minutes(65))
        );
        assert_eq!(parse_relative_time("1d from now", now()), Some(now() + Duration::days(1)));
        assert_eq!(parse_relative_time("LIVE", now()), None);
    }

    #[test]
    fn test_oversized_relative_time_is_dropped() {
        let garbled = "9999w ".repeat(20_000) + "ago";
        assert_eq!(parse_relative_time(&garbled, now()), None);
        assert_eq!(parse_relative_time("9999w 9999d 9999h 9999m 9999s 1s", now()), None);
        assert_eq!(
            parse_relative_time("9999w ago", now()),
            Some(now() - Duration::weeks(9999))
        );

        // The row survives without a start time.
        let mut row = raw(&["Sentinels", "LOUD"], &["2", "0"], "Completed");
        row.eta_text = Some(garbled);
        let record = normalizer().normalize(row, LISTING, now()).unwrap();
        assert_eq!(record.start_time, None);
        assert_eq!(record.status, MatchStatus::Completed);
    }

    #[test]
    fn test_absolute_time_without_time_of_day() {
        assert_eq!(
            parse_absolute_time("Sat, October 11, 2025", Some("TBD")),
            Some(Utc.with_ymd_and_hms(2025, 10, 11, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_absolute_time("not a date", None), None);
    }
}
