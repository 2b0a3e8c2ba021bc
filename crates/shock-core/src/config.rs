use crate::error::ConfigError;
use crate::shock::Payload;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub shock: ShockConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Reject values that would make either tool misbehave. Called before any
    /// worker is spawned or any poll is issued.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.target.base_url()?;
        self.target.kernel_url()?;
        if self.target.timeout_ms == 0 {
            return Err(ConfigError::invalid("target.timeout_ms must be > 0"));
        }
        if self.shock.workers == 0 {
            return Err(ConfigError::invalid("shock.workers must be >= 1"));
        }
        if self.shock.iterations_per_worker == 0 {
            return Err(ConfigError::invalid(
                "shock.iterations_per_worker must be >= 1",
            ));
        }
        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("monitor.poll_interval_ms must be > 0"));
        }
        if self.monitor.stats_timeout_ms == 0 {
            return Err(ConfigError::invalid("monitor.stats_timeout_ms must be > 0"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Engine root, e.g. "http://127.0.0.1:8080"
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Path the load generator POSTs to
    #[serde(default = "default_kernel_path")]
    pub kernel_path: String,
    /// Per-request timeout for load attempts in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl TargetConfig {
    /// Engine root. A path prefix (e.g. behind a reverse proxy) is kept and
    /// always ends in `/`, so endpoints join underneath it.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.base_url).map_err(|e| {
            ConfigError::invalid(format!("invalid base_url {}: {e}", self.base_url))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::invalid(format!(
                "base_url must be http:// or https:// (got {})",
                self.base_url
            )));
        }
        Ok(with_trailing_slash(url))
    }

    pub fn kernel_url(&self) -> Result<Url, ConfigError> {
        join_under(&self.base_url()?, &self.kernel_path).map_err(|e| {
            ConfigError::invalid(format!("invalid kernel_path {}: {e}", self.kernel_path))
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            kernel_path: default_kernel_path(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShockConfig {
    /// Number of parallel workers, each with its own connection
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// POST attempts per worker
    #[serde(default = "default_iterations")]
    pub iterations_per_worker: u64,
    #[serde(default)]
    pub payload: Payload,
}

impl Default for ShockConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            iterations_per_worker: default_iterations(),
            payload: Payload::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Start-to-start spacing between /stats polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Upper bound on a single /stats request
    #[serde(default = "default_stats_timeout_ms")]
    pub stats_timeout_ms: u64,
    /// Agent to register through /deploy before streaming; skipped when unset
    #[serde(default)]
    pub deploy_agent: Option<String>,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn stats_timeout(&self) -> Duration {
        Duration::from_millis(self.stats_timeout_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stats_timeout_ms: default_stats_timeout_ms(),
            deploy_agent: None,
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Join `path` below `base`'s path instead of replacing it, so a leading `/`
/// on `path` does not discard a prefix in `base`.
pub(crate) fn join_under(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    with_trailing_slash(base.clone()).join(path.trim_start_matches('/'))
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_kernel_path() -> String {
    "/api/kernel".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_workers() -> usize {
    10
}

fn default_iterations() -> u64 {
    20_000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_stats_timeout_ms() -> u64 {
    5000
}
