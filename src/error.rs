//! Error types for the checking pipeline.

use thiserror::Error;

/// Configuration problems. These are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("concurrent must be greater than 0")]
    InvalidConcurrency,
    #[error("check-interval must be at least {min} minutes, got {actual}")]
    IntervalTooShort { min: u64, actual: u64 },
    #[error("check-interval must be at most {max} minutes, got {actual}")]
    IntervalTooLong { max: u64, actual: u64 },
    #[error("sub-urls is required")]
    MissingSubscriptions,
    #[error("{0} is required")]
    MissingSetting(&'static str),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid rename rule for {code}: {source}")]
    InvalidRule {
        code: String,
        #[source]
        source: regex::Error,
    },
}

/// Errors building a client for a proxy descriptor.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("unsupported proxy type: {0}")]
    UnsupportedType(String),
    #[error("proxy descriptor is missing field `{0}`")]
    MissingField(&'static str),
    #[error("invalid proxy address: {0}")]
    InvalidAddress(String),
    #[error("failed to build client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Errors raised by a single probe request.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe cancelled")]
    Cancelled,
    #[error("probe timed out")]
    Timeout,
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Per-task failure recorded by the worker pool.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task failed: {0}")]
    Failed(#[from] anyhow::Error),
    #[error("task panicked: {0}")]
    Panicked(String),
}
