//! Node-level metrics scraped from a Prometheus endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use watchbeat_core::collector::{CollectorError, NodeMetricsSource};
use watchbeat_core::config::NodeCollectorConfig;
use watchbeat_core::models::NodeMetrics;

#[derive(Debug, Clone)]
pub struct PrometheusNodeCollector {
    client: Client,
    base_url: String,
    cpu_query: String,
    mem_query: String,
    disk_query: String,
    process_count_query: String,
}

impl PrometheusNodeCollector {
    pub fn new(config: &NodeCollectorConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.clone(),
            cpu_query: config.cpu_query.clone(),
            mem_query: config.mem_query.clone(),
            disk_query: config.disk_query.clone(),
            process_count_query: config.process_count_query.clone(),
        }
    }

    async fn query_scalar(&self, query: &str) -> Result<f64, CollectorError> {
        let url = format!("{}/api/v1/query", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(http_error)?
            .json::<PrometheusQueryResponse>()
            .await
            .map_err(|error| CollectorError::Decode(error.to_string()))?;

        scalar_from_response(&response)
    }
}

#[async_trait]
impl NodeMetricsSource for PrometheusNodeCollector {
    /// Queries fail independently: one missing series degrades only its own
    /// field. The call errors only when no query succeeded at all.
    async fn node_metrics(&self) -> Result<NodeMetrics, CollectorError> {
        let cpu = self.query_scalar(&self.cpu_query).await;
        let mem = self.query_scalar(&self.mem_query).await;
        let disk = self.query_scalar(&self.disk_query).await;
        let procs = self.query_scalar(&self.process_count_query).await;

        let mut any_ok = false;
        let mut keep = |name: &str, result: Result<f64, CollectorError>| match result {
            Ok(value) => {
                any_ok = true;
                Some(value)
            }
            Err(error) => {
                warn!(query = name, error = %error, "prometheus query failed");
                None
            }
        };

        let metrics = NodeMetrics {
            cpu_pct: keep("cpu", cpu),
            mem_pct: keep("mem", mem),
            disk_pct: keep("disk", disk),
            process_count: keep("process_count", procs).map(|value| value.max(0.0) as u64),
        };

        if !any_ok {
            return Err(CollectorError::Unavailable(
                "no prometheus query succeeded".to_owned(),
            ));
        }
        Ok(metrics)
    }
}

fn http_error(error: reqwest::Error) -> CollectorError {
    if error.is_timeout() {
        CollectorError::Timeout
    } else {
        CollectorError::Unavailable(error.to_string())
    }
}

fn scalar_from_response(response: &PrometheusQueryResponse) -> Result<f64, CollectorError> {
    if response.status != "success" {
        return Err(CollectorError::Unavailable(format!(
            "prometheus returned non-success status: {}",
            response.status
        )));
    }

    let value = response
        .data
        .result
        .first()
        .and_then(|metric| metric.value.get(1))
        .and_then(|raw| raw.as_str())
        .ok_or_else(|| CollectorError::Decode("prometheus response missing value".to_owned()))?;

    value
        .parse::<f64>()
        .map_err(|error| CollectorError::Decode(error.to_string()))
}

#[derive(Debug, Deserialize)]
struct PrometheusQueryResponse {
    status: String,
    data: PrometheusData,
}

#[derive(Debug, Deserialize)]
struct PrometheusData {
    result: Vec<PrometheusResult>,
}

#[derive(Debug, Deserialize)]
struct PrometheusResult {
    value: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(raw: &str) -> Option<PrometheusQueryResponse> {
        serde_json::from_str(raw).ok()
    }

    #[test]
    fn extracts_scalar_from_instant_query_response() {
        let raw = r#"{
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [
                    {"metric": {}, "value": [1722860000.0, "42.5"]}
                ]
            }
        }"#;
        let response = decode(raw);
        assert!(response.is_some());
        let Some(response) = response else { return };
        let value = scalar_from_response(&response);
        assert!(matches!(value, Ok(v) if (v - 42.5).abs() < 1e-9));
    }

    #[test]
    fn empty_result_set_is_a_decode_error() {
        let raw = r#"{"status": "success", "data": {"result": []}}"#;
        let response = decode(raw);
        assert!(response.is_some());
        let Some(response) = response else { return };
        assert!(matches!(
            scalar_from_response(&response),
            Err(CollectorError::Decode(_))
        ));
    }

    #[test]
    fn non_success_status_is_unavailable() {
        let raw = r#"{"status": "error", "data": {"result": []}}"#;
        let response = decode(raw);
        assert!(response.is_some());
        let Some(response) = response else { return };
        assert!(matches!(
            scalar_from_response(&response),
            Err(CollectorError::Unavailable(_))
        ));
    }
}
