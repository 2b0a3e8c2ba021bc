//! Startup sequence for the live monitor: health gate, optional deploy,
//! then the sample stream.

use crate::config::Config;
use crate::error::{ConfigError, PollError};
use crate::estimator::{stream, Sample};
use crate::stats::HttpStatsSource;
use futures::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// `/health` did not answer 200. The only fatal condition of a monitor run.
    #[error("Connection refused at {base}. Is the engine running? Start the engine and retry.")]
    EngineUnreachable { base: String, source: PollError },
}

/// Check `/health`, register `monitor.deploy_agent` if set, and hand back the
/// telemetry stream. A failed deploy is logged and ignored. The stream ends
/// once `cancel` fires.
pub async fn start(
    config: &Config,
    cancel: CancellationToken,
) -> Result<impl Stream<Item = Sample> + Send, MonitorError> {
    config.validate()?;
    let base = config.target.base_url()?;
    let source = HttpStatsSource::new(base.clone(), config.monitor.stats_timeout())?;

    if let Err(e) = source.health().await {
        warn!("Health check failed: {}", e);
        return Err(MonitorError::EngineUnreachable {
            base: base.to_string(),
            source: e,
        });
    }
    info!("Connection established [{}]", base);

    if let Some(agent) = config.monitor.deploy_agent.as_deref() {
        match source.deploy(agent).await {
            Ok(()) => info!("Deployed agent {}", agent),
            Err(e) => warn!("Deploy of {} failed, continuing: {}", agent, e),
        }
    }

    Ok(stream(source, config.monitor.poll_interval(), cancel))
}
