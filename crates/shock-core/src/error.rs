//! Error types shared by the load generator and the telemetry estimator.

/// Configuration could not be loaded or describes an unusable run.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {source}")]
    Parse {
        #[from]
        source: toml::de::Error,
    },

    #[error("Config validation error: {message}")]
    Validation { message: String },

    #[error("Failed to build HTTP client: {source}")]
    HttpClient { source: reqwest::Error },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// A single `/stats`, `/health` or `/deploy` call failed.
///
/// Cloneable so a degraded sample can carry it to the display.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("malformed response: {message}")]
    Malformed { message: String },
}

impl From<reqwest::Error> for PollError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Malformed {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}

/// Why a single load attempt did not land. Never escalated.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum AttemptError {
    #[error("timed out")]
    Timeout,

    #[error("connect failed")]
    Connect,

    #[error("HTTP {status}")]
    Status { status: u16 },

    #[error("transport: {message}")]
    Transport { message: String },
}

impl From<reqwest::Error> for AttemptError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect
        } else {
            Self::Transport {
                message: err.to_string(),
            }
        }
    }
}
