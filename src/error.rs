//! Error types shared by every stage of a scan.
//!
//! Only [`WatchError::Config`] is ever surfaced to the process entry point.
//! Everything else is logged and folded into the run report by the pipeline.

/// Errors that can occur while fetching, parsing or delivering.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// An environment value is missing or malformed.
    #[error("config error: {0}")]
    Config(String),

    /// A request could not be sent or its body could not be read.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A single attempt ran past its timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The endpoint answered with something other than 200.
    #[error("unexpected status {0}")]
    Status(u16),

    /// Every fetch attempt failed.
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The fetched body did not have the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// The push service rejected or failed a delivery.
    #[error("push error: {0}")]
    Push(String),
}

impl WatchError {
    /// Map a reqwest failure, keeping timeouts distinguishable.
    pub(crate) fn from_reqwest(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WatchError::Timeout(format!("{context}: {err}"))
        } else {
            WatchError::Http(format!("{context}: {err}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;
