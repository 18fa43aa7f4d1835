use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};
use tracing::{info, warn};

use crate::config::HealthConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthState {
    pub target: String,
    pub consecutive_failures: u32,
    pub degraded: bool,
    pub last_alert_at: Option<DateTime<Utc>>,
}

impl HealthState {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            consecutive_failures: 0,
            degraded: false,
            last_alert_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure { reason: String },
}

impl Outcome {
    pub fn failure(reason: impl ToString) -> Self {
        Outcome::Failure {
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    Degraded { alerted: bool },
    Recovered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthAlert {
    pub target: String,
    pub consecutive_failures: u32,
    pub last_error: String,
    pub timestamp: DateTime<Utc>,
}

impl HealthAlert {
    pub fn message(&self) -> String {
        format!(
            "Scraping {} is degraded after {} consecutive failures (last error: {}) at {}",
            self.target,
            self.consecutive_failures,
            self.last_error,
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Out-of-band notification. Implementations must not block the caller.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: HealthAlert);
}

pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: HealthAlert) {
        warn!("ALERT: {}", alert.message());
    }
}

/// Posts `{"content": ...}` to a Discord-style webhook on a spawned task.
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl AlertSink for WebhookAlertSink {
    fn notify(&self, alert: HealthAlert) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime to deliver alert: {}", alert.message());
            return;
        };

        let client = self.client.clone();
        let url = self.url.clone();
        runtime.spawn(async move {
            let payload = serde_json::json!({ "content": alert.message() });
            let result = client
                .post(&url)
                .timeout(Duration::from_secs(5))
                .json(&payload)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                warn!("Failed to deliver alert for {}: {}", alert.target, e);
            }
        });
    }
}

/// Per-target failure counting. `healthy -> degraded` once the threshold is
/// reached, `degraded -> healthy` on the next success. Only the forward
/// transition alerts, and at most once per cooldown window.
pub struct HealthMonitor {
    states: Mutex<HashMap<String, HealthState>>,
    failure_threshold: u32,
    alert_cooldown: chrono::Duration,
    sink: Arc<dyn AlertSink>,
}

impl HealthMonitor {
    pub fn new(failure_threshold: u32, alert_cooldown: Duration, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
            alert_cooldown: chrono::Duration::from_std(alert_cooldown)
                .unwrap_or_else(|_| chrono::Duration::days(1)),
            sink,
        }
    }

    pub fn from_config(config: &HealthConfig, sink: Arc<dyn AlertSink>) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.alert_cooldown_secs),
            sink,
        )
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, HealthState>> {
        self.states.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, target: &str, outcome: Outcome) -> Transition {
        self.record_at(target, outcome, Utc::now())
    }

    pub fn record_at(&self, target: &str, outcome: Outcome, now: DateTime<Utc>) -> Transition {
        let (transition, alert) = {
            let mut states = self.states();
            let state = states
                .entry(target.to_string())
                .or_insert_with(|| HealthState::new(target));

            match outcome {
                Outcome::Success => {
                    let was_degraded = state.degraded;
                    state.consecutive_failures = 0;
                    state.degraded = false;
                    if was_degraded {
                        (Transition::Recovered, None)
                    } else {
                        (Transition::Unchanged, None)
                    }
                }
                Outcome::Failure { reason } => {
                    state.consecutive_failures += 1;
                    if state.degraded || state.consecutive_failures < self.failure_threshold {
                        (Transition::Unchanged, None)
                    } else {
                        state.degraded = true;
                        let cooled_down = state
                            .last_alert_at
                            .map_or(true, |at| now.signed_duration_since(at) >= self.alert_cooldown);
                        let alert = cooled_down.then(|| {
                            state.last_alert_at = Some(now);
                            HealthAlert {
                                target: target.to_string(),
                                consecutive_failures: state.consecutive_failures,
                                last_error: reason,
                                timestamp: now,
                            }
                        });
                        (Transition::Degraded { alerted: alert.is_some() }, alert)
                    }
                }
            }
        };

        match transition {
            Transition::Degraded { alerted } => {
                warn!("Target {} is now degraded (alert sent: {})", target, alerted)
            }
            Transition::Recovered => info!("Target {} recovered", target),
            Transition::Unchanged => {}
        }
        if let Some(alert) = alert {
            self.sink.notify(alert);
        }
        transition
    }

    pub fn state(&self, target: &str) -> HealthState {
        self.states()
            .get(target)
            .cloned()
            .unwrap_or_else(|| HealthState::new(target))
    }

    pub fn is_degraded(&self, target: &str) -> bool {
        self.state(target).degraded
    }

    pub fn snapshot(&self) -> Vec<HealthState> {
        let mut states: Vec<_> = self.states().values().cloned().collect();
        states.sort_by(|a, b| a.target.cmp(&b.target));
        states
    }
}
