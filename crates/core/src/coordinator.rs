//! The periodic driver tying collectors, trend, scoring, alerting, and
//! dispatch together.
//!
//! One tick runs at a time; readers observe the last published state
//! through [`StatusHandle`] and are never blocked by an in-progress tick.
//! Collector calls carry independent timeouts so a stalled source degrades
//! only its own fields. Dispatch runs on a spawned task and is abandoned,
//! not awaited, if it is still outstanding when the next tick starts.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alerts::AlertEngine;
use crate::collector::{CollectorError, JvmMetricsSource, NodeMetricsSource, RequestStatsSource};
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::models::{
    ActiveAlert, HealthScore, HeapTrendPoint, MetricsSnapshot, PublishedStatus, SlowRequest,
};
use crate::scorer::HealthScorer;
use crate::trend::TrendPredictor;

type Shared = Arc<RwLock<Arc<PublishedStatus>>>;

pub struct Coordinator {
    node: Arc<dyn NodeMetricsSource>,
    jvm: Arc<dyn JvmMetricsSource>,
    requests: Arc<dyn RequestStatsSource>,
    trend: TrendPredictor,
    scorer: HealthScorer,
    engine: AlertEngine,
    dispatcher: Arc<Dispatcher>,
    published: Shared,
    tick_interval: Duration,
    collector_timeout: Duration,
    dispatch_timeout: Duration,
    slow_window: usize,
    tick: u64,
    in_flight_dispatch: Option<JoinHandle<()>>,
    last_slow: Vec<SlowRequest>,
}

impl Coordinator {
    pub fn new(
        config: &Config,
        node: Arc<dyn NodeMetricsSource>,
        jvm: Arc<dyn JvmMetricsSource>,
        requests: Arc<dyn RequestStatsSource>,
        dispatcher: Dispatcher,
    ) -> Self {
        let startup = Arc::new(PublishedStatus::startup(SystemTime::now()));
        Self {
            node,
            jvm,
            requests,
            trend: TrendPredictor::new(&config.trend),
            scorer: HealthScorer::new(config.scoring.clone(), config.thresholds.clone()),
            engine: AlertEngine::new(config),
            dispatcher: Arc::new(dispatcher),
            published: Arc::new(RwLock::new(startup)),
            tick_interval: config.agent.tick_interval(),
            collector_timeout: config.agent.collector_timeout(),
            dispatch_timeout: config.agent.dispatch_timeout(),
            slow_window: config.collectors.access_log.slow_window,
            tick: 0,
            in_flight_dispatch: None,
            last_slow: Vec::new(),
        }
    }

    /// Read-only view of the published state, safe to hand to any number of
    /// concurrent readers.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle {
            inner: Arc::clone(&self.published),
        }
    }

    /// Drive ticks until the token fires. Cancellation takes effect between
    /// ticks; an in-flight dispatch is abandoned at shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_secs = self.tick_interval.as_secs(),
            "monitoring loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.run_tick(SystemTime::now()).await;
                }
            }
        }

        if let Some(handle) = self.in_flight_dispatch.take() {
            if !handle.is_finished() {
                warn!("abandoning in-flight dispatch at shutdown");
                handle.abort();
            }
        }
        info!("monitoring loop stopped");
    }

    /// One full pipeline pass. Never fails: collector errors degrade fields,
    /// and a tick with no usable metrics still publishes.
    pub async fn run_tick(&mut self, now: SystemTime) {
        if let Some(handle) = self.in_flight_dispatch.take() {
            if !handle.is_finished() {
                warn!("previous dispatch batch still outstanding, abandoning it");
                handle.abort();
            }
        }

        let limit = self.collector_timeout;
        let (node, jvm, requests) = tokio::join!(
            bounded(limit, self.node.node_metrics()),
            bounded(limit, self.jvm.jvm_metrics()),
            bounded(limit, self.requests.request_stats()),
        );

        let mut snapshot = MetricsSnapshot::unavailable(now);
        match node {
            Ok(node) => {
                snapshot.cpu_pct = node.cpu_pct;
                snapshot.mem_pct = node.mem_pct;
                snapshot.disk_pct = node.disk_pct;
            }
            Err(error) => warn!(source = "node", error = %error, "collector failed"),
        }
        match jvm {
            Ok(jvm) => {
                snapshot.heap_used_pct = Some(jvm.heap_used_pct);
                snapshot.oldgen_used_pct = Some(jvm.oldgen_used_pct);
                snapshot.thread_pool_util_pct = Some(jvm.thread_pool_util_pct);
                snapshot.stuck_thread_count = Some(jvm.stuck_thread_count);
            }
            Err(error) => warn!(source = "jvm", error = %error, "collector failed"),
        }
        match requests {
            Ok(stats) => {
                snapshot.request_count = Some(stats.request_count);
                snapshot.slow_request_count = Some(stats.slow_request_count);
                snapshot.avg_response_ms = Some(stats.avg_response_ms);
                snapshot.max_response_ms = Some(stats.max_response_ms);
                self.last_slow = stats.slow_requests;
                self.last_slow.truncate(self.slow_window);
            }
            Err(error) => warn!(source = "access_log", error = %error, "collector failed"),
        }

        if let Some(heap) = snapshot.heap_used_pct {
            self.trend.record(now, heap);
        }
        snapshot.predicted_oom_in = self.trend.predict_oom();

        let snapshot = Arc::new(snapshot);
        let health = self.scorer.score(&snapshot);
        let alerts = self.engine.evaluate(&snapshot);

        if !alerts.is_empty() {
            info!(count = alerts.len(), "dispatching alerts");
            let dispatcher = Arc::clone(&self.dispatcher);
            let dispatch_timeout = self.dispatch_timeout;
            self.in_flight_dispatch = Some(tokio::spawn(async move {
                match tokio::time::timeout(dispatch_timeout, dispatcher.dispatch_all(&alerts)).await
                {
                    Ok(delivered) => debug!(delivered, "dispatch batch finished"),
                    Err(_) => warn!("dispatch batch timed out"),
                }
            }));
        }

        self.tick += 1;
        let status = Arc::new(PublishedStatus {
            tick: self.tick,
            snapshot,
            health,
            active_alerts: self.engine.active_alerts(),
            heap_trend: self.trend.points(),
            slow_requests: self.last_slow.clone(),
        });
        self.publish(status);

        debug!(
            tick = self.tick,
            overall = health.overall,
            status = health.status.as_str(),
            "tick complete"
        );
    }

    fn publish(&self, status: Arc<PublishedStatus>) {
        match self.published.write() {
            Ok(mut guard) => *guard = status,
            Err(poisoned) => *poisoned.into_inner() = status,
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, CollectorError>>,
) -> Result<T, CollectorError> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CollectorError::Timeout),
    }
}

/// Cloneable, non-blocking accessor over the latest published tick.
#[derive(Clone)]
pub struct StatusHandle {
    inner: Shared,
}

impl StatusHandle {
    fn current(&self) -> Arc<PublishedStatus> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn get_status(&self) -> Arc<PublishedStatus> {
        self.current()
    }

    pub fn get_health(&self) -> HealthScore {
        self.current().health
    }

    pub fn get_alerts(&self) -> Vec<ActiveAlert> {
        self.current().active_alerts.clone()
    }

    pub fn get_heap_trend(&self) -> Vec<HeapTrendPoint> {
        self.current().heap_trend.clone()
    }

    pub fn get_slow_requests(&self) -> Vec<SlowRequest> {
        self.current().slow_requests.clone()
    }
}
