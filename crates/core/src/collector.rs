//! Contracts between the Coordinator and its metric sources.
//!
//! The Coordinator depends only on these traits; the concrete adapters
//! (Prometheus, Jolokia, access-log tail) live in the collectors crate.
//! Every call is bounded by the Coordinator's per-source timeout, and a
//! failure degrades only the fields that source owns.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{JvmMetrics, NodeMetrics, RequestStats};

#[derive(Debug, Error)]
pub enum CollectorError {
    /// The call did not complete within the per-source timeout.
    #[error("collector call timed out")]
    Timeout,
    /// Connection refused, endpoint down, file missing.
    #[error("collector unavailable: {0}")]
    Unavailable(String),
    /// The endpoint answered but the payload was not usable.
    #[error("malformed collector response: {0}")]
    Decode(String),
}

/// OS-level counters, usually scraped from a Prometheus node exporter.
#[async_trait]
pub trait NodeMetricsSource: Send + Sync {
    async fn node_metrics(&self) -> Result<NodeMetrics, CollectorError>;
}

/// JVM attributes pulled from a management endpoint. Fails as a unit when
/// the endpoint is unreachable.
#[async_trait]
pub trait JvmMetricsSource: Send + Sync {
    async fn jvm_metrics(&self) -> Result<JvmMetrics, CollectorError>;
}

/// Request statistics derived from the access log.
#[async_trait]
pub trait RequestStatsSource: Send + Sync {
    async fn request_stats(&self) -> Result<RequestStats, CollectorError>;
}
