use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retried_requests: u64,
    pub avg_response_time_ms: f64,
    pub rate_limiter_wait_time_ms: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

#[derive(Clone, Default)]
pub struct MetricsCollector {
    metrics: Arc<Mutex<FetchMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request_start(&self) -> RequestTracker {
        RequestTracker {
            start_time: Instant::now(),
            collector: self.clone(),
        }
    }

    pub fn record_rate_limit_wait(&self, duration: Duration) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.rate_limiter_wait_time_ms = duration.as_secs_f64() * 1000.0;
        }
    }

    pub fn record_retry(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.retried_requests += 1;
        }
    }

    pub fn get_metrics(&self) -> FetchMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

/// Times one HTTP attempt. Dropping it without `finish` records nothing.
pub struct RequestTracker {
    start_time: Instant,
    collector: MetricsCollector,
}

impl RequestTracker {
    pub fn finish(self, error: Option<String>) {
        let duration = self.start_time.elapsed();
        let Ok(mut metrics) = self.collector.metrics.lock() else {
            return;
        };

        metrics.total_requests += 1;
        match error {
            None => metrics.successful_requests += 1,
            Some(e) => {
                metrics.failed_requests += 1;
                metrics.last_error = Some(e);
                metrics.last_error_time = Some(Utc::now());
            }
        }

        // Exponential moving average; the first sample seeds it.
        let sample = duration.as_secs_f64() * 1000.0;
        metrics.avg_response_time_ms = if metrics.total_requests == 1 {
            sample
        } else {
            let alpha = 0.1;
            metrics.avg_response_time_ms * (1.0 - alpha) + sample * alpha
        };
    }
}
