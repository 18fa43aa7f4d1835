use std::{sync::Arc, time::Duration};
use tokio::{sync::oneshot, task::JoinHandle, time::MissedTickBehavior};
use tracing::{info, warn};

use crate::{fetcher::HtmlFetcher, router::QueryRouter, types::Listing};

/// Periodic re-check of every listing. Runs until [`HealthChecker::stop`] is
/// called or the handle is dropped.
pub struct HealthChecker {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl HealthChecker {
    /// `None` when `interval` is zero.
    pub fn start<F>(router: Arc<QueryRouter<F>>, interval: Duration) -> Option<Self>
    where
        F: HtmlFetcher + 'static,
    {
        if interval.is_zero() {
            info!("Periodic health checks disabled");
            return None;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; user traffic warms the cache at
            // startup, so skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => run_checks(&router).await,
                }
            }
            info!("Health checker stopped");
        });

        info!("Health checks every {:?}", interval);
        Some(Self {
            shutdown_tx: Some(shutdown_tx),
            handle,
        })
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!("Health checker task ended abnormally: {}", e);
        }
    }
}

impl Drop for HealthChecker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

pub async fn run_checks<F: HtmlFetcher>(router: &QueryRouter<F>) {
    for listing in Listing::ALL {
        match router.refresh(listing).await {
            Ok(count) => info!("Health check: {} listing returned {} records", listing.target(), count),
            Err(e) => warn!("Health check: {} listing failed: {}", listing.target(), e),
        }
    }
}
