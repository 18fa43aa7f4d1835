use serde::Serialize;

use crate::{
    error::UserError,
    teams::TeamDirectory,
    types::{MatchRecord, MatchRequest, MatchStatus, Page, QueryKind},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Query(MatchRequest),
    Status,
    Quit,
}

/// One line of the serve protocol: `<kind> [filter words] [count] [page]`,
/// `status` or `quit`. Trailing numbers are count then page.
pub fn parse_command_line(line: &str, default_count: usize) -> Result<Command, UserError> {
    let mut words: Vec<&str> = line.split_whitespace().collect();
    let Some(first) = words.first().copied() else {
        return Err(UserError::InvalidFilter("empty command".to_string()));
    };

    match first.to_lowercase().as_str() {
        "status" => return Ok(Command::Status),
        "quit" | "exit" => return Ok(Command::Quit),
        _ => {}
    }

    let kind: QueryKind = first.parse().map_err(UserError::InvalidFilter)?;
    words.remove(0);

    let mut numbers = Vec::new();
    while numbers.len() < 2 {
        match words.last().and_then(|w| w.parse::<usize>().ok()) {
            Some(n) => {
                numbers.insert(0, n);
                words.pop();
            }
            None => break,
        }
    }

    let mut request = MatchRequest::new(kind, numbers.first().copied().unwrap_or(default_count));
    if let Some(page) = numbers.get(1) {
        request = request.with_page(*page);
    }
    if !words.is_empty() {
        request = request.with_filter(words.join(" "));
    }
    Ok(Command::Query(request))
}

#[derive(Debug, Serialize)]
pub struct MatchView {
    #[serde(flatten)]
    pub record: MatchRecord,
    pub color_a: String,
    pub color_b: String,
    pub summary: String,
}

#[derive(Debug, Serialize)]
pub struct PageView {
    pub page_index: usize,
    pub total_pages: usize,
    pub total_records: usize,
    pub stale: bool,
    pub fetched_at: String,
    pub matches: Vec<MatchView>,
}

/// `"Sentinels 2 - 1 G2 Esports"`, or `"vs"` in place of a score when the
/// match has not started.
pub fn summary(record: &MatchRecord) -> String {
    match (record.status, record.score_a, record.score_b) {
        (MatchStatus::Upcoming, _, _) | (_, None, _) | (_, _, None) => {
            format!("{} vs {}", record.team_a, record.team_b)
        }
        (status, Some(a), Some(b)) => {
            let live = if status == MatchStatus::Live { " (LIVE)" } else { "" };
            format!("{} {} - {} {}{}", record.team_a, a, b, record.team_b, live)
        }
    }
}

impl PageView {
    pub fn new(page: Page, directory: &TeamDirectory) -> Self {
        let matches = page
            .records
            .into_iter()
            .map(|record| MatchView {
                color_a: directory.color_for(&record.team_a).hex(),
                color_b: directory.color_for(&record.team_b).hex(),
                summary: summary(&record),
                record,
            })
            .collect();

        Self {
            page_index: page.page_index,
            total_pages: page.total_pages,
            total_records: page.total_records,
            stale: page.stale,
            fetched_at: page.fetched_at.to_rfc3339(),
            matches,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_plain_kinds() {
        assert_eq!(
            parse_command_line("results", 5).unwrap(),
            Command::Query(MatchRequest::new(QueryKind::Results, 5))
        );
        assert_eq!(
            parse_command_line("upcoming 3 2", 5).unwrap(),
            Command::Query(MatchRequest::new(QueryKind::Upcoming, 3).with_page(2))
        );
        assert_eq!(parse_command_line("  STATUS ", 5).unwrap(), Command::Status);
        assert_eq!(parse_command_line("quit", 5).unwrap(), Command::Quit);
    }

    #[test]
    fn test_parse_multi_word_filter() {
        assert_eq!(
            parse_command_line("team paper rex 10", 5).unwrap(),
            Command::Query(MatchRequest::new(QueryKind::Team, 10).with_filter("paper rex"))
        );
        assert_eq!(
            parse_command_line("tournament Champions Tour 2025 4 1", 5).unwrap(),
            Command::Query(
                MatchRequest::new(QueryKind::Tournament, 4)
                    .with_page(1)
                    .with_filter("Champions Tour 2025")
            )
        );
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(matches!(
            parse_command_line("standings", 5),
            Err(UserError::InvalidFilter(_))
        ));
        assert!(parse_command_line("   ", 5).is_err());
    }

    #[test]
    fn test_summary() {
        let mut record = MatchRecord {
            team_a: "Sentinels".to_string(),
            team_b: "G2 Esports".to_string(),
            score_a: Some(2),
            score_b: Some(1),
            status: MatchStatus::Completed,
            start_time: None,
            tournament: "Champions Tour 2025".to_string(),
            stage: None,
            match_url: "https://www.vlr.gg/1".to_string(),
        };
        assert_eq!(summary(&record), "Sentinels 2 - 1 G2 Esports");

        record.status = MatchStatus::Live;
        assert_eq!(summary(&record), "Sentinels 2 - 1 G2 Esports (LIVE)");

        record.status = MatchStatus::Upcoming;
        record.score_a = None;
        record.score_b = None;
        assert_eq!(summary(&record), "Sentinels vs G2 Esports");
    }
}
