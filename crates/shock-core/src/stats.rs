use crate::config::join_under;
use crate::error::{ConfigError, PollError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// One reading of the engine's `/stats` endpoint, immutable once captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Seconds since the engine started
    pub uptime: u64,
    /// Requests handled divided by uptime, as reported (already rounded)
    pub avg_throughput: f64,
    pub active_agents: u64,
    pub sampled_at: DateTime<Utc>,
}

impl StatsSnapshot {
    pub fn new(uptime: u64, avg_throughput: f64, active_agents: u64) -> Self {
        Self {
            uptime,
            avg_throughput,
            active_agents,
            sampled_at: Utc::now(),
        }
    }

    /// Approximate total request count since engine start.
    ///
    /// The engine only exposes `total / uptime`, rounded on its side, so this
    /// product is lossy and may move backwards between polls by a few
    /// requests. The raw counter is not exposed, so this is the best
    /// available reconstruction.
    pub fn cumulative_total(&self) -> f64 {
        self.avg_throughput * self.uptime as f64
    }
}

/// Body of `GET /stats`. Every field may be missing or `null`.
#[derive(Debug, Default, Deserialize)]
struct StatsBody {
    #[serde(default)]
    uptime: Option<u64>,
    #[serde(default)]
    throughput: Option<f64>,
    #[serde(default)]
    active_agents: Option<u64>,
}

impl From<StatsBody> for StatsSnapshot {
    fn from(body: StatsBody) -> Self {
        StatsSnapshot::new(
            body.uptime.unwrap_or_default(),
            body.throughput.unwrap_or_default(),
            body.active_agents.unwrap_or_default(),
        )
    }
}

/// Where the estimator reads telemetry from.
pub trait StatsSource: Send + Sync {
    fn name(&self) -> &'static str;

    fn fetch<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<StatsSnapshot, PollError>> + Send + 'a>>;
}

/// HTTP client for the engine's `health`, `deploy` and `stats` endpoints,
/// resolved beneath the base URL's path.
///
/// Owns one client with a single pooled connection; dropping the source
/// closes it.
pub struct HttpStatsSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpStatsSource {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|source| ConfigError::HttpClient { source })?;

        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, PollError> {
        join_under(&self.base, path).map_err(|e| PollError::Malformed {
            message: format!("cannot join {path} onto {}: {e}", self.base),
        })
    }

    /// `GET /health`. Anything but a 200 is a failure.
    pub async fn health(&self) -> Result<(), PollError> {
        let response = self.client.get(self.endpoint("health")?).send().await?;
        let status = response.status();
        // Drain so the connection can be reused by the first poll.
        let _ = response.bytes().await;

        if status.as_u16() != 200 {
            return Err(PollError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    /// `POST /deploy` with `{"agent": <id>}`. One-shot registration.
    pub async fn deploy(&self, agent: &str) -> Result<(), PollError> {
        let response = self
            .client
            .post(self.endpoint("deploy")?)
            .json(&serde_json::json!({ "agent": agent }))
            .send()
            .await?;
        let status = response.status();
        let _ = response.bytes().await;

        if !status.is_success() {
            return Err(PollError::Status {
                status: status.as_u16(),
            });
        }
        debug!("deployed agent {}", agent);
        Ok(())
    }

    async fn fetch_stats(&self) -> Result<StatsSnapshot, PollError> {
        let response = self.client.get(self.endpoint("stats")?).send().await?;
        let status = response.status();
        if !status.is_success() {
            let _ = response.bytes().await;
            return Err(PollError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let stats: StatsBody =
            serde_json::from_slice(&body).map_err(|e| PollError::Malformed {
                message: e.to_string(),
            })?;
        Ok(stats.into())
    }
}

impl StatsSource for HttpStatsSource {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<StatsSnapshot, PollError>> + Send + 'a>> {
        Box::pin(self.fetch_stats())
    }
}
