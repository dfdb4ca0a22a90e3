//! TOML-compatible configuration for the monitoring agent.
//!
//! `Config` aggregates all agent sub-configurations into a single
//! TOML-deserializable struct. Operator-facing primitives (floats, integers,
//! bools) keep the config file readable; durations are plain seconds.
//!
//! ```toml
//! [agent]
//! tick_interval_secs = 30
//!
//! [thresholds.heap]
//! warn = 70.0
//! critical = 85.0
//! clear = 65.0
//!
//! [channels.webhook]
//! enabled = true
//! url = "https://hooks.example.com/watchbeat"
//! ```
//!
//! Validation is fail-fast: `Config::load` rejects a file that violates any
//! invariant before the scheduler starts. Nothing is re-validated at tick
//! time.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::AlertKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML syntax: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level agent configuration, loadable from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub trend: TrendConfig,
    pub scoring: ScoringConfig,
    pub thresholds: ThresholdsConfig,
    pub alerts: AlertsConfig,
    pub channels: ChannelsConfig,
    pub collectors: CollectorsConfig,
}

impl Config {
    /// Read and validate a config file. Any violation is fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.tick_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "agent.tick_interval_secs must be > 0".to_owned(),
            ));
        }
        if self.agent.collector_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "agent.collector_timeout_secs must be > 0".to_owned(),
            ));
        }
        if self.trend.history_window < 2 {
            return Err(ConfigError::Invalid(format!(
                "trend.history_window must be >= 2, got {}",
                self.trend.history_window
            )));
        }
        if self.trend.smoothing_window == 0 {
            return Err(ConfigError::Invalid(
                "trend.smoothing_window must be >= 1 (1 disables smoothing)".to_owned(),
            ));
        }

        let weights = &self.scoring.weights;
        let total =
            weights.heap + weights.thread_pool + weights.cpu + weights.memory + weights.stuck_threads;
        if !(0.99..=1.01).contains(&total) {
            return Err(ConfigError::Invalid(format!(
                "scoring.weights must sum to 1.0, got {total}"
            )));
        }
        if self.scoring.stuck_thread_cap == 0 {
            return Err(ConfigError::Invalid(
                "scoring.stuck_thread_cap must be > 0".to_owned(),
            ));
        }
        if self.scoring.healthy_min <= self.scoring.warning_min {
            return Err(ConfigError::Invalid(format!(
                "scoring.healthy_min ({}) must be above scoring.warning_min ({})",
                self.scoring.healthy_min, self.scoring.warning_min
            )));
        }

        for (name, rule) in [
            ("heap", &self.thresholds.heap),
            ("oldgen", &self.thresholds.oldgen),
            ("thread_pool", &self.thresholds.thread_pool),
            ("cpu", &self.thresholds.cpu),
            ("memory", &self.thresholds.memory),
            ("stuck_threads", &self.thresholds.stuck_threads),
        ] {
            rule.validate(name)?;
        }

        if self.alerts.throttle_secs == 0 {
            return Err(ConfigError::Invalid(
                "alerts.throttle_secs must be > 0".to_owned(),
            ));
        }

        if self.channels.webhook.enabled && self.channels.webhook.url.is_empty() {
            return Err(ConfigError::Invalid(
                "channels.webhook.url must be set when the webhook channel is enabled".to_owned(),
            ));
        }
        if self.channels.email.enabled {
            if self.channels.email.smtp_host.is_empty() {
                return Err(ConfigError::Invalid(
                    "channels.email.smtp_host must be set when the email channel is enabled"
                        .to_owned(),
                ));
            }
            if self.channels.email.to_addrs.is_empty() {
                return Err(ConfigError::Invalid(
                    "channels.email.to_addrs must not be empty when the email channel is enabled"
                        .to_owned(),
                ));
            }
        }
        if self.channels.telegram.enabled && self.channels.telegram.bot_token.is_empty() {
            return Err(ConfigError::Invalid(
                "channels.telegram.bot_token must be set when the telegram channel is enabled"
                    .to_owned(),
            ));
        }

        Ok(())
    }
}

/// Scheduler and timeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Seconds between ticks.
    pub tick_interval_secs: u64,
    /// Per-source timeout for one collector call.
    pub collector_timeout_secs: u64,
    /// Budget for one tick's outbound dispatch batch.
    pub dispatch_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            collector_timeout_secs: 10,
            dispatch_timeout_secs: 15,
        }
    }
}

impl AgentConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn collector_timeout(&self) -> Duration {
        Duration::from_secs(self.collector_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

/// Heap trend / OOM prediction tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Number of heap samples retained for the line fit.
    pub history_window: usize,
    /// Moving-average window applied before fitting; 1 disables smoothing.
    pub smoothing_window: usize,
    /// Projections further out than this are discarded as noise.
    pub horizon_secs: u64,
    /// An OOM alert fires only when the projection is within this bound.
    pub oom_alert_threshold_secs: u64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            history_window: 120,
            smoothing_window: 3,
            horizon_secs: 24 * 3600,
            oom_alert_threshold_secs: 3600,
        }
    }
}

/// Health score weights and band boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub weights: WeightsConfig,
    /// Stuck-thread count at which the component score reaches 0.
    pub stuck_thread_cap: u32,
    /// Overall score at or above this is healthy.
    pub healthy_min: f64,
    /// Overall score at or above this (and below healthy_min) is warning.
    pub warning_min: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: WeightsConfig::default(),
            stuck_thread_cap: 10,
            healthy_min: 85.0,
            warning_min: 60.0,
        }
    }
}

/// Component weights; validated to sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsConfig {
    pub heap: f64,
    pub thread_pool: f64,
    pub cpu: f64,
    pub memory: f64,
    pub stuck_threads: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            heap: 0.30,
            thread_pool: 0.25,
            cpu: 0.20,
            memory: 0.15,
            stuck_threads: 0.10,
        }
    }
}

/// Warn/critical/clear triple for one alert kind. Values are percentage
/// points for utilization metrics and a plain count for stuck threads.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub warn: f64,
    pub critical: f64,
    pub clear: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            warn: 70.0,
            critical: 85.0,
            clear: 65.0,
        }
    }
}

impl RuleConfig {
    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.warn >= self.critical {
            return Err(ConfigError::Invalid(format!(
                "thresholds.{name}: warn ({}) must be below critical ({})",
                self.warn, self.critical
            )));
        }
        if self.clear > self.warn {
            return Err(ConfigError::Invalid(format!(
                "thresholds.{name}: clear ({}) must not exceed warn ({})",
                self.clear, self.warn
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    pub heap: RuleConfig,
    pub oldgen: RuleConfig,
    pub thread_pool: RuleConfig,
    pub cpu: RuleConfig,
    pub memory: RuleConfig,
    pub stuck_threads: RuleConfig,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            heap: RuleConfig {
                warn: 70.0,
                critical: 85.0,
                clear: 65.0,
            },
            oldgen: RuleConfig {
                warn: 80.0,
                critical: 90.0,
                clear: 75.0,
            },
            thread_pool: RuleConfig {
                warn: 70.0,
                critical: 90.0,
                clear: 65.0,
            },
            cpu: RuleConfig {
                warn: 80.0,
                critical: 95.0,
                clear: 75.0,
            },
            memory: RuleConfig {
                warn: 80.0,
                critical: 90.0,
                clear: 75.0,
            },
            stuck_threads: RuleConfig {
                warn: 1.0,
                critical: 10.0,
                clear: 1.0,
            },
        }
    }
}

/// Throttling intervals for alert dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// Minimum seconds between two dispatches of the same kind.
    pub throttle_secs: u64,
    /// Independent throttle for "resolved" events.
    pub resolution_throttle_secs: u64,
    /// Per-kind overrides of `throttle_secs`.
    pub throttle_overrides: BTreeMap<AlertKind, u64>,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            throttle_secs: 900,
            resolution_throttle_secs: 900,
            throttle_overrides: BTreeMap::new(),
        }
    }
}

impl AlertsConfig {
    pub fn throttle_for(&self, kind: AlertKind) -> Duration {
        let secs = self
            .throttle_overrides
            .get(&kind)
            .copied()
            .unwrap_or(self.throttle_secs);
        Duration::from_secs(secs)
    }

    pub fn resolution_throttle(&self) -> Duration {
        Duration::from_secs(self.resolution_throttle_secs)
    }
}

/// Delivery channel settings. Every channel is disabled by default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub webhook: WebhookChannelConfig,
    pub email: EmailChannelConfig,
    pub telegram: TelegramChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookChannelConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for WebhookChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailChannelConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_addr: String,
    pub to_addrs: Vec<String>,
}

impl Default for EmailChannelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_addr: "watchbeat@localhost".to_owned(),
            to_addrs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramChannelConfig {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: i64,
}

/// Collector endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    pub node: NodeCollectorConfig,
    pub jvm: JvmCollectorConfig,
    pub access_log: AccessLogConfig,
}

/// Prometheus-backed node metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeCollectorConfig {
    pub base_url: String,
    pub cpu_query: String,
    pub mem_query: String,
    pub disk_query: String,
    pub process_count_query: String,
}

impl Default for NodeCollectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_owned(),
            cpu_query: "node_cpu_usage_percent".to_owned(),
            mem_query: "node_memory_usage_percent".to_owned(),
            disk_query: "node_disk_usage_percent".to_owned(),
            process_count_query: "node_procs_running".to_owned(),
        }
    }
}

/// Jolokia-style JMX-over-HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JvmCollectorConfig {
    pub base_url: String,
    /// Old-generation memory pool MBean.
    pub oldgen_mbean: String,
    /// Request thread pool MBean exposing currentThreadsBusy / maxThreads.
    pub thread_pool_mbean: String,
}

impl Default for JvmCollectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8778/jolokia".to_owned(),
            oldgen_mbean: "java.lang:type=MemoryPool,name=G1 Old Gen".to_owned(),
            thread_pool_mbean: "Catalina:type=ThreadPool,name=\"http-nio-8080\"".to_owned(),
        }
    }
}

/// Access-log tailing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessLogConfig {
    pub path: String,
    /// Requests at or above this many milliseconds count as slow.
    pub slow_threshold_ms: u64,
    /// Lines examined from the end of the file per tick.
    pub tail_lines: usize,
    /// Slow entries retained for the read API.
    pub slow_window: usize,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            path: "/var/log/tomcat/access.log".to_owned(),
            slow_threshold_ms: 5000,
            tail_lines: 1000,
            slow_window: 50,
        }
    }
}
