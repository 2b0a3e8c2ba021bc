pub mod config;
pub mod error;
pub mod estimator;
pub mod monitor;
pub mod shock;
pub mod stats;

pub use config::*;
pub use error::*;
pub use estimator::{advance, Mode, RateState, Sample};
pub use monitor::MonitorError;
pub use shock::{AttemptOutcome, Payload, ShockPlan, ShockSummary, Worker};
pub use stats::*;
