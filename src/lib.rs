//! Subcheck - Subscription Proxy Checker
//!
//! Fetches proxy subscriptions, checks every proxy through a bounded worker
//! pool and publishes the alive ones under normalized names.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod proxy;
pub mod publish;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use error::{ClientError, ConfigError, ProbeError, TaskError};
pub use pipeline::Pipeline;
pub use pool::{run_stage, TaskResult, WorkerPool};
pub use proxy::*;
pub use publish::{FilePublisher, Publisher};

/// Application result type
pub type Result<T> = anyhow::Result<T>;
