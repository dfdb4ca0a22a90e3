//! I/O adapters feeding the watchbeat core: Prometheus node metrics,
//! Jolokia-backed JVM attributes, and access-log request statistics. Each
//! implements one of the core collector contracts and degrades
//! independently on failure.

pub mod access_log;
pub mod jvm;
pub mod node;

pub use access_log::AccessLogCollector;
pub use jvm::JolokiaJvmCollector;
pub use node::PrometheusNodeCollector;
