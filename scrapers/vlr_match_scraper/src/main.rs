use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::{sync::Arc, time::Duration};
use tokio::{io::BufReader, sync::mpsc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vlr_match_scraper::{
    build_router,
    config::ScraperConfig,
    fetcher::WebHtmlFetcher,
    router::QueryRouter,
    scheduler::{run_checks, HealthChecker},
    serve::{answer, serve_lines, status_report},
    MatchRequest, QueryKind,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Match results and schedules scraped from vlr.gg", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a single query and print the page as JSON
    Query {
        /// results, upcoming, team or tournament
        #[arg(short, long)]
        kind: QueryKind,
        /// Team or tournament name (at least MIN_FILTER_LEN characters)
        #[arg(short, long)]
        filter: Option<String>,
        /// Matches per page
        #[arg(short, long)]
        count: Option<usize>,
        /// 1-based page number
        #[arg(short, long)]
        page: Option<usize>,
    },
    /// Answer queries read line by line from stdin
    Serve,
    /// Check every listing once and print health and fetch metrics
    Status,
}

async fn serve(router: Arc<QueryRouter<WebHtmlFetcher>>) -> Result<()> {
    let interval = Duration::from_secs(router.config().health.check_interval_secs);
    let checker = HealthChecker::start(Arc::clone(&router), interval);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(reply) = rx.recv().await {
            println!("{}", reply);
        }
    });

    info!("Reading commands from stdin");
    let result = serve_lines(router, BufReader::new(tokio::io::stdin()), tx).await;
    // serve_lines dropped the last sender, so the printer drains and exits.
    printer.await?;

    if let Some(checker) = checker {
        checker.stop().await;
    }
    let handled = result?;
    info!("Answered {} commands", handled);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ScraperConfig::from_env();
    let default_count = config.query.default_count;
    let router = build_router(config)?;

    match cli.command {
        Commands::Query {
            kind,
            filter,
            count,
            page,
        } => {
            let mut request = MatchRequest::new(kind, count.unwrap_or(default_count));
            if let Some(filter) = filter {
                request = request.with_filter(filter);
            }
            if let Some(page) = page {
                request = request.with_page(page);
            }
            println!("{}", answer(&router, &request).await);
        }
        Commands::Serve => {
            if let Err(e) = serve(Arc::new(router)).await {
                error!("Serve loop failed: {}", e);
                return Err(e);
            }
        }
        Commands::Status => {
            run_checks(&router).await;
            println!("{}", serde_json::to_string_pretty(&status_report(&router))?);
        }
    }

    Ok(())
}
