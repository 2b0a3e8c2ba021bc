//! Fire-and-forget load generator.
//!
//! A [`ShockPlan`] fans out into `workers` independent [`Worker`]s. Each one
//! owns a single keep-alive connection and sends the same pre-serialized
//! payload `iterations_per_worker` times. Outcomes are produced per attempt and
//! dropped on the floor: the run exists to apply pressure, not to measure
//! delivery. The only synchronization point is the join-all at the end.

use crate::config::Config;
use crate::error::{AttemptError, ConfigError};
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};
use url::Url;

/// Request body sent by every attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default = "default_agent")]
    pub agent: String,
    #[serde(default = "default_msg")]
    pub msg: String,
}

impl Default for Payload {
    fn default() -> Self {
        Self {
            agent: default_agent(),
            msg: default_msg(),
        }
    }
}

fn default_agent() -> String {
    "probe-01".to_string()
}

fn default_msg() -> String {
    "WAKE_UP".to_string()
}

/// Result of one POST. Workers discard it; it exists so the decision to
/// ignore failures is made explicitly rather than by a catch-all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Delivered(StatusCode),
    Failed(AttemptError),
}

/// A validated load run. Construction fails before any connection is opened.
#[derive(Debug, Clone)]
pub struct ShockPlan {
    target: Url,
    workers: usize,
    iterations_per_worker: u64,
    body: Bytes,
    timeout: Duration,
}

impl ShockPlan {
    pub fn new(
        target: Url,
        workers: usize,
        iterations_per_worker: u64,
        payload: &Payload,
        timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if workers == 0 {
            return Err(ConfigError::invalid("worker count must be >= 1"));
        }
        if iterations_per_worker == 0 {
            return Err(ConfigError::invalid("iterations per worker must be >= 1"));
        }
        if timeout.is_zero() {
            return Err(ConfigError::invalid("per-request timeout must be > 0"));
        }
        let body = serde_json::to_vec(payload)
            .map_err(|e| ConfigError::invalid(format!("payload is not serializable: {e}")))?;

        Ok(Self {
            target,
            workers,
            iterations_per_worker,
            body: Bytes::from(body),
            timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::new(
            config.target.kernel_url()?,
            config.shock.workers,
            config.shock.iterations_per_worker,
            &config.shock.payload,
            config.target.timeout(),
        )
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn iterations_per_worker(&self) -> u64 {
        self.iterations_per_worker
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Worst-case wall time if every single attempt times out.
    pub fn worst_case(&self) -> Duration {
        let attempts = (self.workers as u64).saturating_mul(self.iterations_per_worker);
        self.timeout
            .saturating_mul(u32::try_from(attempts).unwrap_or(u32::MAX))
    }
}

/// Shape and wall time of a finished run. Carries no delivery counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShockSummary {
    pub workers: usize,
    pub iterations_per_worker: u64,
    pub elapsed_ms: u64,
}

impl ShockSummary {
    pub fn attempts(&self) -> u64 {
        (self.workers as u64).saturating_mul(self.iterations_per_worker)
    }
}

/// One unit of load: an ordinal, its own client, and an iteration budget.
pub struct Worker {
    id: usize,
    client: reqwest::Client,
    target: Url,
    body: Bytes,
    iterations: u64,
}

impl Worker {
    pub fn new(id: usize, plan: &ShockPlan) -> Result<Self, ConfigError> {
        // A private pool capped at one idle connection: attempts are
        // sequential, so every one after the first rides the same socket.
        let client = reqwest::Client::builder()
            .timeout(plan.timeout)
            .pool_max_idle_per_host(1)
            .tcp_nodelay(true)
            .build()
            .map_err(|source| ConfigError::HttpClient { source })?;

        Ok(Self {
            id,
            client,
            target: plan.target.clone(),
            body: plan.body.clone(),
            iterations: plan.iterations_per_worker,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Send the payload once. The response body is drained so the connection
    /// goes back to the pool instead of being torn down.
    pub async fn attempt(&self) -> AttemptOutcome {
        let sent = self
            .client
            .post(self.target.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(self.body.clone())
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::Failed(e.into()),
        };

        let status = response.status();
        if let Err(e) = response.bytes().await {
            return AttemptOutcome::Failed(e.into());
        }

        if status.is_success() {
            AttemptOutcome::Delivered(status)
        } else {
            AttemptOutcome::Failed(AttemptError::Status {
                status: status.as_u16(),
            })
        }
    }

    /// Spend the whole iteration budget. Consumes the worker, which closes
    /// its connection on return.
    pub async fn run(self) {
        debug!("worker {} started ({} attempts)", self.id, self.iterations);

        for attempt in 0..self.iterations {
            match self.attempt().await {
                AttemptOutcome::Delivered(status) => {
                    trace!("worker {} attempt {}: {}", self.id, attempt, status);
                }
                AttemptOutcome::Failed(e) => {
                    trace!("worker {} attempt {} dropped: {}", self.id, attempt, e);
                }
            }
        }

        debug!("worker {} finished", self.id);
    }
}

/// Run the plan to completion. Returns only after every worker has spent its
/// full budget, even if one of them panics.
pub async fn run(plan: &ShockPlan) -> Result<ShockSummary, ConfigError> {
    // Build every client up front so a setup failure aborts before any
    // traffic is sent.
    let workers = (0..plan.workers)
        .map(|id| Worker::new(id, plan))
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "Shocking {} with {} workers x {} attempts (timeout {}ms)",
        plan.target,
        plan.workers,
        plan.iterations_per_worker,
        plan.timeout.as_millis()
    );

    let start = Instant::now();
    let tracker = TaskTracker::new();
    for worker in workers {
        tracker.spawn(worker.run());
    }
    tracker.close();
    tracker.wait().await;

    let summary = ShockSummary {
        workers: plan.workers,
        iterations_per_worker: plan.iterations_per_worker,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    info!(
        "Shock complete: {} attempts in {}ms",
        summary.attempts(),
        summary.elapsed_ms
    );

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Url {
        Url::parse("http://127.0.0.1:8080/api/kernel").unwrap()
    }

    #[test]
    fn test_plan_rejects_invalid_shape() {
        let payload = Payload::default();
        let timeout = Duration::from_secs(1);

        assert!(ShockPlan::new(target(), 0, 10, &payload, timeout).is_err());
        assert!(ShockPlan::new(target(), 10, 0, &payload, timeout).is_err());
        assert!(ShockPlan::new(target(), 10, 10, &payload, Duration::ZERO).is_err());
        assert!(ShockPlan::new(target(), 1, 1, &payload, timeout).is_ok());
    }

    #[test]
    fn test_payload_serialized_once() {
        let payload = Payload {
            agent: "probe-09".to_string(),
            msg: "PING".to_string(),
        };
        let plan = ShockPlan::new(target(), 2, 3, &payload, Duration::from_millis(100)).unwrap();

        let decoded: Payload = serde_json::from_slice(&plan.body).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_worst_case_bound() {
        let plan = ShockPlan::new(
            target(),
            3,
            4,
            &Payload::default(),
            Duration::from_millis(250),
        )
        .unwrap();
        assert_eq!(plan.worst_case(), Duration::from_secs(3));
    }

    #[test]
    fn test_plan_from_default_config() {
        let plan = ShockPlan::from_config(&Config::default()).unwrap();
        assert_eq!(plan.workers(), 10);
        assert_eq!(plan.iterations_per_worker(), 20_000);
        assert_eq!(plan.timeout(), Duration::from_secs(1));
        assert_eq!(plan.target().as_str(), "http://127.0.0.1:8080/api/kernel");
    }

    #[test]
    fn test_summary_attempts() {
        let summary = ShockSummary {
            workers: 10,
            iterations_per_worker: 20_000,
            elapsed_ms: 0,
        };
        assert_eq!(summary.attempts(), 200_000);
    }
}
