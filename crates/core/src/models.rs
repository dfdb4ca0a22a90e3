use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// One tick's complete set of collected metrics.
///
/// A field is `None` when the collector owning it failed or timed out that
/// tick. Snapshots are never mutated after the Coordinator finishes merging
/// collector outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub captured_at: SystemTime,
    pub heap_used_pct: Option<f64>,
    pub oldgen_used_pct: Option<f64>,
    pub thread_pool_util_pct: Option<f64>,
    pub stuck_thread_count: Option<u32>,
    pub cpu_pct: Option<f64>,
    pub mem_pct: Option<f64>,
    pub disk_pct: Option<f64>,
    pub request_count: Option<u64>,
    pub slow_request_count: Option<u64>,
    pub avg_response_ms: Option<f64>,
    pub max_response_ms: Option<f64>,
    /// Projected time until heap exhaustion, derived from the heap trend.
    pub predicted_oom_in: Option<Duration>,
}

impl MetricsSnapshot {
    /// A snapshot with every field marked unavailable. Published when no
    /// collector produced usable data so the tick still completes.
    pub fn unavailable(captured_at: SystemTime) -> Self {
        Self {
            captured_at,
            heap_used_pct: None,
            oldgen_used_pct: None,
            thread_pool_util_pct: None,
            stuck_thread_count: None,
            cpu_pct: None,
            mem_pct: None,
            disk_pct: None,
            request_count: None,
            slow_request_count: None,
            avg_response_ms: None,
            max_response_ms: None,
            predicted_oom_in: None,
        }
    }
}

/// A single heap usage sample retained by the trend predictor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeapTrendPoint {
    pub at: SystemTime,
    pub heap_used_pct: f64,
}

/// Output of the node-level collector. Fields fail independently: a `None`
/// marks a query that produced no usable value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    pub cpu_pct: Option<f64>,
    pub mem_pct: Option<f64>,
    pub disk_pct: Option<f64>,
    pub process_count: Option<u64>,
}

/// Output of the JVM collector. Fails as a unit: a dead management endpoint
/// degrades the whole group for the tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JvmMetrics {
    pub heap_used_pct: f64,
    pub oldgen_used_pct: f64,
    pub thread_pool_util_pct: f64,
    pub stuck_thread_count: u32,
}

/// A request that exceeded the configured slow threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlowRequest {
    pub at: SystemTime,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub response_time_ms: u64,
    pub client: String,
}

/// Output of the access-log collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestStats {
    pub request_count: u64,
    pub slow_request_count: u64,
    pub avg_response_ms: f64,
    pub max_response_ms: f64,
    pub slow_requests: Vec<SlowRequest>,
}

/// Per-component health scores. `None` marks a component whose raw metric
/// was unavailable this tick; it is excluded from the weighted overall.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub heap: Option<f64>,
    pub thread_pool: Option<f64>,
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub stuck_threads: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    /// No component could be scored this tick.
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
            HealthStatus::Unknown => "unknown",
        }
    }
}

/// Composite health score, replaced atomically every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    /// Weighted overall score, clamped to [0, 100].
    pub overall: f64,
    pub components: ComponentScores,
    pub status: HealthStatus,
}

impl HealthScore {
    pub fn unknown() -> Self {
        Self {
            overall: 0.0,
            components: ComponentScores::default(),
            status: HealthStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    HeapCritical,
    OldgenHigh,
    OomPrediction,
    StuckThreads,
    ThreadpoolSaturation,
    CpuHigh,
    MemHigh,
}

impl AlertKind {
    pub const ALL: [AlertKind; 7] = [
        AlertKind::HeapCritical,
        AlertKind::OldgenHigh,
        AlertKind::OomPrediction,
        AlertKind::StuckThreads,
        AlertKind::ThreadpoolSaturation,
        AlertKind::CpuHigh,
        AlertKind::MemHigh,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AlertKind::HeapCritical => "heap_critical",
            AlertKind::OldgenHigh => "oldgen_high",
            AlertKind::OomPrediction => "oom_prediction",
            AlertKind::StuckThreads => "stuck_threads",
            AlertKind::ThreadpoolSaturation => "threadpool_saturation",
            AlertKind::CpuHigh => "cpu_high",
            AlertKind::MemHigh => "mem_high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

/// A dispatch-ready alert. Immutable once constructed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub raised_at: SystemTime,
    /// Observed metric value, when the kind has one.
    pub value: Option<f64>,
    /// Threshold the value was compared against.
    pub threshold: Option<f64>,
    /// Breaches swallowed by throttling since the previous dispatch.
    pub suppressed_since_last: u32,
    pub snapshot: Arc<MetricsSnapshot>,
}

/// Summary of a kind currently in a breached state, for the read API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveAlert {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub since: SystemTime,
    pub suppressed_count: u32,
}

/// The read model published by the Coordinator after each tick. Swapped as
/// a whole so readers never observe a partially updated state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedStatus {
    pub tick: u64,
    pub snapshot: Arc<MetricsSnapshot>,
    pub health: HealthScore,
    pub active_alerts: Vec<ActiveAlert>,
    pub heap_trend: Vec<HeapTrendPoint>,
    pub slow_requests: Vec<SlowRequest>,
}

impl PublishedStatus {
    /// State visible to readers before the first tick completes.
    pub fn startup(at: SystemTime) -> Self {
        Self {
            tick: 0,
            snapshot: Arc::new(MetricsSnapshot::unavailable(at)),
            health: HealthScore::unknown(),
            active_alerts: Vec::new(),
            heap_trend: Vec::new(),
            slow_requests: Vec::new(),
        }
    }
}
