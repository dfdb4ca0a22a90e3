use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use watchbeat_core::collector::{
    CollectorError, JvmMetricsSource, NodeMetricsSource, RequestStatsSource,
};
use watchbeat_core::config::Config;
use watchbeat_core::coordinator::Coordinator;
use watchbeat_core::dispatch::{AlertChannel, ChannelError, Dispatcher};
use watchbeat_core::models::{
    Alert, AlertKind, AlertSeverity, HealthStatus, JvmMetrics, MetricsSnapshot, NodeMetrics,
    RequestStats, SlowRequest,
};

struct StaticNode(NodeMetrics);

#[async_trait]
impl NodeMetricsSource for StaticNode {
    async fn node_metrics(&self) -> Result<NodeMetrics, CollectorError> {
        Ok(self.0)
    }
}

struct FailingNode;

#[async_trait]
impl NodeMetricsSource for FailingNode {
    async fn node_metrics(&self) -> Result<NodeMetrics, CollectorError> {
        Err(CollectorError::Unavailable("connection refused".to_owned()))
    }
}

struct StaticJvm(JvmMetrics);

#[async_trait]
impl JvmMetricsSource for StaticJvm {
    async fn jvm_metrics(&self) -> Result<JvmMetrics, CollectorError> {
        Ok(self.0)
    }
}

struct FailingJvm;

#[async_trait]
impl JvmMetricsSource for FailingJvm {
    async fn jvm_metrics(&self) -> Result<JvmMetrics, CollectorError> {
        Err(CollectorError::Unavailable("endpoint down".to_owned()))
    }
}

/// Never completes; exercises the per-source timeout.
struct HangingJvm;

#[async_trait]
impl JvmMetricsSource for HangingJvm {
    async fn jvm_metrics(&self) -> Result<JvmMetrics, CollectorError> {
        std::future::pending::<()>().await;
        Err(CollectorError::Unavailable("unreachable".to_owned()))
    }
}

struct StaticRequests(RequestStats);

#[async_trait]
impl RequestStatsSource for StaticRequests {
    async fn request_stats(&self) -> Result<RequestStats, CollectorError> {
        Ok(self.0.clone())
    }
}

struct FailingRequests;

#[async_trait]
impl RequestStatsSource for FailingRequests {
    async fn request_stats(&self) -> Result<RequestStats, CollectorError> {
        Err(CollectorError::Unavailable("log missing".to_owned()))
    }
}

struct MemoryChannel {
    name: &'static str,
    sent: Arc<Mutex<Vec<Alert>>>,
}

#[async_trait]
impl AlertChannel for MemoryChannel {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let mut guard = match self.sent.lock() {
            Ok(guard) => guard,
            Err(_) => return Ok(()),
        };
        guard.push(alert.clone());
        Ok(())
    }
}

struct FailingChannel;

#[async_trait]
impl AlertChannel for FailingChannel {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn send(&self, _alert: &Alert) -> Result<(), ChannelError> {
        Err(ChannelError::Failed("simulated outage".to_owned()))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.agent.tick_interval_secs = 1;
    config.agent.collector_timeout_secs = 1;
    config.agent.dispatch_timeout_secs = 5;
    config
}

fn healthy_jvm() -> JvmMetrics {
    JvmMetrics {
        heap_used_pct: 55.0,
        oldgen_used_pct: 40.0,
        thread_pool_util_pct: 30.0,
        stuck_thread_count: 0,
    }
}

fn healthy_node() -> NodeMetrics {
    NodeMetrics {
        cpu_pct: Some(20.0),
        mem_pct: Some(35.0),
        disk_pct: Some(50.0),
        process_count: Some(240),
    }
}

fn request_stats() -> RequestStats {
    RequestStats {
        request_count: 120,
        slow_request_count: 1,
        avg_response_ms: 150.0,
        max_response_ms: 9000.0,
        slow_requests: vec![SlowRequest {
            at: SystemTime::UNIX_EPOCH,
            method: "GET".to_owned(),
            path: "/api/report".to_owned(),
            status: 200,
            response_time_ms: 9000,
            client: "10.0.0.1".to_owned(),
        }],
    }
}

fn sent_alerts(sink: &Arc<Mutex<Vec<Alert>>>) -> Vec<Alert> {
    match sink.lock() {
        Ok(guard) => guard.clone(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn healthy_tick_publishes_complete_snapshot() {
    let config = test_config();
    let mut coordinator = Coordinator::new(
        &config,
        Arc::new(StaticNode(healthy_node())),
        Arc::new(StaticJvm(healthy_jvm())),
        Arc::new(StaticRequests(request_stats())),
        Dispatcher::new(Duration::from_secs(1)),
    );
    let status = coordinator.status_handle();

    coordinator.run_tick(SystemTime::now()).await;

    let published = status.get_status();
    assert_eq!(published.tick, 1);
    assert_eq!(published.snapshot.heap_used_pct, Some(55.0));
    assert_eq!(published.snapshot.cpu_pct, Some(20.0));
    assert_eq!(published.snapshot.request_count, Some(120));
    assert_eq!(published.health.status, HealthStatus::Healthy);
    assert!(published.active_alerts.is_empty());
    assert_eq!(published.heap_trend.len(), 1);
    assert_eq!(status.get_slow_requests().len(), 1);
}

#[tokio::test]
async fn breach_reaches_every_channel_and_active_list() {
    let config = test_config();
    let email_sink = Arc::new(Mutex::new(Vec::new()));
    let webhook_sink = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new(Duration::from_secs(1));
    dispatcher.add_channel(Box::new(MemoryChannel {
        name: "email",
        sent: Arc::clone(&email_sink),
    }));
    dispatcher.add_channel(Box::new(MemoryChannel {
        name: "webhook",
        sent: Arc::clone(&webhook_sink),
    }));

    let mut jvm = healthy_jvm();
    jvm.heap_used_pct = 95.0;

    let mut coordinator = Coordinator::new(
        &config,
        Arc::new(StaticNode(healthy_node())),
        Arc::new(StaticJvm(jvm)),
        Arc::new(StaticRequests(request_stats())),
        dispatcher,
    );
    let status = coordinator.status_handle();

    coordinator.run_tick(SystemTime::now()).await;
    // Delivery runs on a spawned task; give it a moment.
    tokio::time::sleep(Duration::from_millis(100)).await;

    for sink in [&email_sink, &webhook_sink] {
        let sent = sent_alerts(sink);
        assert_eq!(sent.len(), 1);
        assert_eq!(
            sent.first().map(|a| (a.kind, a.severity)),
            Some((AlertKind::HeapCritical, AlertSeverity::Critical))
        );
    }

    let active = status.get_alerts();
    assert_eq!(active.len(), 1);
    assert_eq!(active.first().map(|a| a.kind), Some(AlertKind::HeapCritical));
}

#[tokio::test]
async fn all_sources_failing_still_publishes_unknown_health() {
    let config = test_config();
    let mut coordinator = Coordinator::new(
        &config,
        Arc::new(FailingNode),
        Arc::new(FailingJvm),
        Arc::new(FailingRequests),
        Dispatcher::new(Duration::from_secs(1)),
    );
    let status = coordinator.status_handle();

    coordinator.run_tick(SystemTime::now()).await;

    let published = status.get_status();
    assert_eq!(published.tick, 1);
    assert_eq!(
        *published.snapshot,
        MetricsSnapshot::unavailable(published.snapshot.captured_at)
    );
    assert_eq!(published.health.status, HealthStatus::Unknown);
    assert!(published.active_alerts.is_empty());
}

#[tokio::test]
async fn hanging_collector_degrades_only_its_own_fields() {
    let config = test_config();
    let mut coordinator = Coordinator::new(
        &config,
        Arc::new(StaticNode(healthy_node())),
        Arc::new(HangingJvm),
        Arc::new(StaticRequests(request_stats())),
        Dispatcher::new(Duration::from_secs(1)),
    );
    let status = coordinator.status_handle();

    coordinator.run_tick(SystemTime::now()).await;

    let published = status.get_status();
    assert_eq!(published.snapshot.heap_used_pct, None);
    assert_eq!(published.snapshot.stuck_thread_count, None);
    assert_eq!(published.snapshot.cpu_pct, Some(20.0));
    assert_eq!(published.snapshot.request_count, Some(120));
    // Health renormalizes over the surviving components.
    assert_eq!(published.health.status, HealthStatus::Healthy);
    assert_eq!(published.health.components.heap, None);
}

#[tokio::test]
async fn failing_channel_does_not_block_the_other() {
    let sink = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new(Duration::from_secs(1));
    dispatcher.add_channel(Box::new(FailingChannel));
    dispatcher.add_channel(Box::new(MemoryChannel {
        name: "email",
        sent: Arc::clone(&sink),
    }));

    let alert = Alert {
        kind: AlertKind::CpuHigh,
        severity: AlertSeverity::Critical,
        message: "CPU usage at 99.0% (threshold 95.0%)".to_owned(),
        raised_at: SystemTime::UNIX_EPOCH,
        value: Some(99.0),
        threshold: Some(95.0),
        suppressed_since_last: 0,
        snapshot: Arc::new(MetricsSnapshot::unavailable(SystemTime::UNIX_EPOCH)),
    };

    let delivered = dispatcher.dispatch(&alert).await;
    assert_eq!(delivered, 1);
    assert_eq!(sent_alerts(&sink).len(), 1);
}

#[tokio::test]
async fn repeated_breach_within_throttle_is_suppressed_across_ticks() {
    let mut config = test_config();
    config.alerts.throttle_secs = 900;

    let sink = Arc::new(Mutex::new(Vec::new()));
    let mut dispatcher = Dispatcher::new(Duration::from_secs(1));
    dispatcher.add_channel(Box::new(MemoryChannel {
        name: "email",
        sent: Arc::clone(&sink),
    }));

    let mut jvm = healthy_jvm();
    jvm.heap_used_pct = 95.0;

    let mut coordinator = Coordinator::new(
        &config,
        Arc::new(StaticNode(healthy_node())),
        Arc::new(StaticJvm(jvm)),
        Arc::new(StaticRequests(request_stats())),
        dispatcher,
    );

    let start = SystemTime::now();
    coordinator.run_tick(start).await;
    coordinator.run_tick(start + Duration::from_secs(30)).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    // One dispatch, the second breach suppressed by the throttle.
    assert_eq!(sent_alerts(&sink).len(), 1);
}
