//! Live request-rate estimator.
//!
//! The engine only publishes a cumulative average (`total / uptime`). Each
//! poll multiplies it back out to an approximate total and differences that
//! against the previous poll to recover the rate over the last interval.
//! All mutable state lives in a [`RateState`] value that is threaded through
//! [`advance`] one poll at a time.

use crate::error::PollError;
use crate::stats::{StatsSource, StatsSnapshot};
use chrono::{DateTime, Utc};
use futures::Stream;
use std::fmt;
use std::time::Duration;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// No successful poll yet
    #[default]
    Connecting,
    Streaming,
    /// Last poll failed; no instantaneous rate until the next success
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Baseline {
    cumulative_total: f64,
    uptime: u64,
    sampled_at: DateTime<Utc>,
}

/// Estimator memory between polls. Owned by exactly one poll loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateState {
    baseline: Option<Baseline>,
    mode: Mode,
}

impl RateState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn prev_cumulative_total(&self) -> Option<f64> {
        self.baseline.map(|b| b.cumulative_total)
    }

    pub fn prev_sample_time(&self) -> Option<DateTime<Utc>> {
        self.baseline.map(|b| b.sampled_at)
    }
}

/// One rendered telemetry line.
#[derive(Debug, Clone, PartialEq)]
pub enum Sample {
    /// First success (or first after an engine restart): average only.
    Baseline { snapshot: StatsSnapshot },
    Rate {
        instant_rate: f64,
        snapshot: StatsSnapshot,
    },
    Degraded { error: PollError },
}

impl Sample {
    pub fn instant_rate(&self) -> Option<f64> {
        match self {
            Sample::Rate { instant_rate, .. } => Some(*instant_rate),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Option<&StatsSnapshot> {
        match self {
            Sample::Baseline { snapshot } | Sample::Rate { snapshot, .. } => Some(snapshot),
            Sample::Degraded { .. } => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Sample::Degraded { .. })
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sample::Baseline { snapshot } => write!(
                f,
                "[T+{}s] LINKED: avg {} req/s | agents {} | STATUS: CALIBRATING",
                snapshot.uptime, snapshot.avg_throughput, snapshot.active_agents
            ),
            Sample::Rate {
                instant_rate,
                snapshot,
            } => write!(
                f,
                "[T+{}s] INSTANT: {:>5} req/s | AVG: {:>4} req/s | AGENTS: {} | STATUS: FLOWING",
                snapshot.uptime,
                *instant_rate as u64,
                snapshot.avg_throughput,
                snapshot.active_agents
            ),
            Sample::Degraded { error } => {
                write!(f, "[DEGRADED] telemetry unavailable: {error}")
            }
        }
    }
}

/// Fold one poll result into the state, producing the next state and the
/// sample to display.
///
/// A shrinking reconstructed total is rounding jitter from the engine's
/// average and yields a rate of zero; the baseline still moves to the new
/// value so the jitter is not carried into the next delta. Only a shrinking
/// `uptime` is read as an engine restart, which re-baselines.
pub fn advance(state: RateState, poll: Result<StatsSnapshot, PollError>) -> (RateState, Sample) {
    let snapshot = match poll {
        Ok(snapshot) => snapshot,
        Err(error) => {
            if state.mode != Mode::Degraded {
                warn!("Telemetry degraded: {}", error);
            }
            let next = RateState {
                baseline: state.baseline,
                mode: Mode::Degraded,
            };
            return (next, Sample::Degraded { error });
        }
    };

    if state.mode == Mode::Degraded {
        info!("Telemetry recovered");
    }

    let current = Baseline {
        cumulative_total: snapshot.cumulative_total(),
        uptime: snapshot.uptime,
        sampled_at: snapshot.sampled_at,
    };

    let sample = match state.baseline {
        None => Sample::Baseline { snapshot },
        Some(prev) if current.uptime < prev.uptime => {
            info!(
                "Engine restart detected (uptime {}s -> {}s), re-baselining",
                prev.uptime, current.uptime
            );
            Sample::Baseline { snapshot }
        }
        Some(prev) => {
            let delta = current.cumulative_total - prev.cumulative_total;
            Sample::Rate {
                instant_rate: delta.max(0.0),
                snapshot,
            }
        }
    };

    let next = RateState {
        baseline: Some(current),
        mode: Mode::Streaming,
    };
    (next, sample)
}

struct PollLoop<S> {
    source: S,
    state: RateState,
    poll_interval: Duration,
    ticker: Option<Interval>,
    cancel: CancellationToken,
}

/// Poll `source` every `poll_interval` until `cancel` fires.
///
/// Polls are spaced start-to-start; a poll that overruns the interval is
/// followed immediately by the next one, with no catch-up burst. Cancellation
/// is observed between polls only, never mid-request. When the stream ends
/// the source, and with it its connection, is dropped.
pub fn stream<S>(
    source: S,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> impl Stream<Item = Sample> + Send
where
    S: StatsSource + 'static,
{
    let poll_loop = PollLoop {
        source,
        state: RateState::default(),
        poll_interval: poll_interval.max(Duration::from_millis(1)),
        ticker: None,
        cancel,
    };

    futures::stream::unfold(poll_loop, |mut lp| async move {
        let period = lp.poll_interval;
        let ticker = lp.ticker.get_or_insert_with(|| {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tokio::select! {
            _ = ticker.tick() => {}
            _ = lp.cancel.cancelled() => {}
        }

        if lp.cancel.is_cancelled() {
            debug!("Estimator on {} stopped", lp.source.name());
            return None;
        }

        let poll = lp.source.fetch().await;
        let (state, sample) = advance(std::mem::take(&mut lp.state), poll);
        lp.state = state;
        Some((sample, lp))
    })
}
