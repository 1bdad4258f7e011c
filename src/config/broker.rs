use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pubsub::topics;

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 100;
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 1_000;

/// Broker configuration.
///
/// Durations are stored in milliseconds so the struct maps directly onto
/// `MCS_BROKER__*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Default timeout for `request()`.
    pub request_timeout_ms: u64,
    /// Pause before the dispatch loop retries after an infrastructure failure.
    pub retry_backoff_ms: u64,
    /// How long `shutdown()` waits for the dispatch loop before aborting it.
    pub shutdown_grace_ms: u64,
    /// Optional per-handler delivery timeout. `None` keeps strictly
    /// sequential delivery with no upper bound.
    pub handler_timeout_ms: Option<u64>,
    /// Topic that receives handler failure reports.
    pub error_topic: String,
    /// Allowed topics. Empty means any topic is accepted.
    pub valid_topics: Vec<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            handler_timeout_ms: None,
            error_topic: topics::ERROR.to_string(),
            valid_topics: Vec::new(),
        }
    }
}

impl BrokerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_request_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_handler_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.handler_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_shutdown_grace(
        mut self,
        grace: Duration,
    ) -> Self {
        self.shutdown_grace_ms = grace.as_millis() as u64;
        self
    }

    pub fn with_valid_topics<I, S>(
        mut self,
        topics: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_topics = topics.into_iter().map(Into::into).collect();
        self
    }
}
