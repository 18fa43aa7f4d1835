use serde::Serialize;
use std::sync::Arc;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc::UnboundedSender,
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    command::{parse_command_line, Command, PageView},
    fetcher::HtmlFetcher,
    health::HealthState,
    metrics::FetchMetrics,
    router::QueryRouter,
    types::MatchRequest,
};

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub health: Vec<HealthState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch: Option<FetchMetrics>,
    pub cached_queries: usize,
}

pub fn status_report<F: HtmlFetcher>(router: &QueryRouter<F>) -> StatusReport {
    StatusReport {
        health: router.health().snapshot(),
        fetch: router.fetcher().fetch_metrics(),
        cached_queries: router.cache().len(),
    }
}

/// A page as JSON, or the plain user-facing message.
pub async fn answer<F: HtmlFetcher>(router: &QueryRouter<F>, request: &MatchRequest) -> String {
    match router.handle(request).await {
        Ok(page) => {
            let view = PageView::new(page, router.directory());
            serde_json::to_string_pretty(&view)
                .unwrap_or_else(|e| format!("failed to render page: {}", e))
        }
        Err(e) => e.to_string(),
    }
}

fn render_status<F: HtmlFetcher>(router: &QueryRouter<F>) -> String {
    serde_json::to_string_pretty(&status_report(router))
        .unwrap_or_else(|e| format!("failed to render status: {}", e))
}

/// Answers commands from `input` until `quit` or end of input. Queries run
/// concurrently; every one that was read gets its reply on `replies` before
/// this returns. Returns how many commands were handled.
pub async fn serve_lines<F, R>(
    router: Arc<QueryRouter<F>>,
    input: R,
    replies: UnboundedSender<String>,
) -> std::io::Result<usize>
where
    F: HtmlFetcher + 'static,
    R: AsyncBufRead + Unpin,
{
    let default_count = router.config().query.default_count;
    let mut queries = JoinSet::new();
    let mut handled = 0;

    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        // Reap finished queries so the set stays small on long sessions.
        while let Some(done) = queries.try_join_next() {
            if let Err(e) = done {
                warn!("Query task failed: {}", e);
            }
        }

        let reply = match parse_command_line(&line, default_count) {
            Ok(Command::Quit) => {
                info!("Quit received");
                break;
            }
            Ok(Command::Status) => render_status(&router),
            Ok(Command::Query(request)) => {
                let router = Arc::clone(&router);
                let replies = replies.clone();
                queries.spawn(async move {
                    // The receiver only goes away when the process is exiting.
                    let _ = replies.send(answer(&router, &request).await);
                });
                handled += 1;
                continue;
            }
            Err(e) => e.to_string(),
        };
        handled += 1;
        if replies.send(reply).is_err() {
            debug!("Reply receiver closed, stopping");
            break;
        }
    }

    if !queries.is_empty() {
        info!("Waiting for {} queries in flight", queries.len());
    }
    while let Some(done) = queries.join_next().await {
        if let Err(e) = done {
            warn!("Query task failed: {}", e);
        }
    }
    Ok(handled)
}
