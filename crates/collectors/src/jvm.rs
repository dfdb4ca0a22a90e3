//! JVM attributes pulled over a Jolokia (JMX-over-HTTP) endpoint.
//!
//! A single batch read fetches heap usage, old-generation pool usage,
//! request thread pool saturation, and the deadlocked-thread list. The
//! group fails as a unit: a dead endpoint or a failed MBean read marks
//! every JVM-derived field unavailable for the tick.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use watchbeat_core::collector::{CollectorError, JvmMetricsSource};
use watchbeat_core::config::JvmCollectorConfig;
use watchbeat_core::models::JvmMetrics;

#[derive(Debug, Clone)]
pub struct JolokiaJvmCollector {
    client: Client,
    base_url: String,
    oldgen_mbean: String,
    thread_pool_mbean: String,
}

impl JolokiaJvmCollector {
    pub fn new(config: &JvmCollectorConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            oldgen_mbean: config.oldgen_mbean.clone(),
            thread_pool_mbean: config.thread_pool_mbean.clone(),
        }
    }
}

#[async_trait]
impl JvmMetricsSource for JolokiaJvmCollector {
    async fn jvm_metrics(&self) -> Result<JvmMetrics, CollectorError> {
        let batch = json!([
            {
                "type": "read",
                "mbean": "java.lang:type=Memory",
                "attribute": "HeapMemoryUsage",
            },
            {
                "type": "read",
                "mbean": self.oldgen_mbean,
                "attribute": "Usage",
            },
            {
                "type": "read",
                "mbean": self.thread_pool_mbean,
                "attribute": ["currentThreadsBusy", "maxThreads"],
            },
            {
                "type": "read",
                "mbean": "java.lang:type=Threading",
                "attribute": "DeadlockedThreads",
            },
        ]);

        let responses = self
            .client
            .post(&self.base_url)
            .json(&batch)
            .send()
            .await
            .map_err(http_error)?
            .json::<Vec<JolokiaResponse>>()
            .await
            .map_err(|error| CollectorError::Decode(error.to_string()))?;

        metrics_from_responses(&responses)
    }
}

fn http_error(error: reqwest::Error) -> CollectorError {
    if error.is_timeout() {
        CollectorError::Timeout
    } else {
        CollectorError::Unavailable(error.to_string())
    }
}

fn metrics_from_responses(responses: &[JolokiaResponse]) -> Result<JvmMetrics, CollectorError> {
    let heap = read_value(responses, 0)?;
    let oldgen = read_value(responses, 1)?;
    let thread_pool = read_value(responses, 2)?;
    let deadlocked = read_value(responses, 3)?;

    Ok(JvmMetrics {
        heap_used_pct: usage_pct(heap)?,
        oldgen_used_pct: usage_pct(oldgen)?,
        thread_pool_util_pct: thread_pool_util_pct(thread_pool)?,
        stuck_thread_count: stuck_thread_count(deadlocked),
    })
}

fn read_value(responses: &[JolokiaResponse], index: usize) -> Result<&Value, CollectorError> {
    let response = responses.get(index).ok_or_else(|| {
        CollectorError::Decode(format!("jolokia batch response missing entry {index}"))
    })?;
    if response.status != 200 {
        return Err(CollectorError::Unavailable(format!(
            "jolokia read {index} returned status {}",
            response.status
        )));
    }
    Ok(&response.value)
}

/// Percentage from a JMX memory usage composite (`{used, max, ...}`).
fn usage_pct(value: &Value) -> Result<f64, CollectorError> {
    let used = value
        .get("used")
        .and_then(Value::as_f64)
        .ok_or_else(|| CollectorError::Decode("memory usage missing 'used'".to_owned()))?;
    let max = value
        .get("max")
        .and_then(Value::as_f64)
        .ok_or_else(|| CollectorError::Decode("memory usage missing 'max'".to_owned()))?;
    if max <= 0.0 {
        return Err(CollectorError::Decode(
            "memory usage reports non-positive max".to_owned(),
        ));
    }
    Ok(used / max * 100.0)
}

fn thread_pool_util_pct(value: &Value) -> Result<f64, CollectorError> {
    let busy = value
        .get("currentThreadsBusy")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            CollectorError::Decode("thread pool read missing 'currentThreadsBusy'".to_owned())
        })?;
    let max = value
        .get("maxThreads")
        .and_then(Value::as_f64)
        .ok_or_else(|| CollectorError::Decode("thread pool read missing 'maxThreads'".to_owned()))?;
    if max <= 0.0 {
        return Err(CollectorError::Decode(
            "thread pool reports non-positive maxThreads".to_owned(),
        ));
    }
    Ok(busy / max * 100.0)
}

/// `DeadlockedThreads` is null when no thread is stuck, otherwise a list of
/// thread ids.
fn stuck_thread_count(value: &Value) -> u32 {
    match value {
        Value::Array(ids) => u32::try_from(ids.len()).unwrap_or(u32::MAX),
        Value::Number(n) => n.as_u64().and_then(|v| u32::try_from(v).ok()).unwrap_or(0),
        _ => 0,
    }
}

#[derive(Debug, Deserialize)]
struct JolokiaResponse {
    #[serde(default)]
    status: u16,
    #[serde(default)]
    value: Value,
}
