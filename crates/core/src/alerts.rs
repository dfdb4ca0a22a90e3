//! Threshold evaluation and the per-kind alert state machine.
//!
//! Each alert kind moves through `Inactive -> Active -> (Suppressed |
//! Dispatched) -> Resolved -> Inactive`. Dispatch is throttled per kind;
//! breaches swallowed by the throttle are counted and surfaced on the next
//! dispatch. Resolution requires the metric to stay strictly below the clear
//! threshold for a full tick, so oscillation across the critical boundary
//! cannot flap.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::config::{AlertsConfig, Config, RuleConfig, ThresholdsConfig};
use crate::models::{ActiveAlert, Alert, AlertKind, AlertSeverity, MetricsSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertPhase {
    Inactive,
    Active,
    Suppressed,
    Dispatched,
    Resolved,
}

/// Per-kind throttle and hysteresis bookkeeping. Owned exclusively by the
/// engine; mutated only during tick evaluation.
#[derive(Debug, Clone)]
struct AlertState {
    phase: AlertPhase,
    last_triggered_at: Option<SystemTime>,
    last_dispatched_at: Option<SystemTime>,
    last_resolution_sent_at: Option<SystemTime>,
    suppressed_count: u32,
    ticks_below_clear: u32,
    last_severity: AlertSeverity,
    last_value: f64,
}

impl Default for AlertState {
    fn default() -> Self {
        Self {
            phase: AlertPhase::Inactive,
            last_triggered_at: None,
            last_dispatched_at: None,
            last_resolution_sent_at: None,
            suppressed_count: 0,
            ticks_below_clear: 0,
            last_severity: AlertSeverity::Info,
            last_value: 0.0,
        }
    }
}

/// What one kind observed this tick.
struct Observation {
    value: f64,
    breach: Option<AlertSeverity>,
    cleared: bool,
    threshold: f64,
}

pub struct AlertEngine {
    thresholds: ThresholdsConfig,
    alerts: AlertsConfig,
    oom_threshold: Duration,
    states: BTreeMap<AlertKind, AlertState>,
}

impl AlertEngine {
    pub fn new(config: &Config) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            alerts: config.alerts.clone(),
            oom_threshold: Duration::from_secs(config.trend.oom_alert_threshold_secs),
            states: BTreeMap::new(),
        }
    }

    /// Evaluate every kind against the snapshot, using the snapshot's
    /// capture time as "now". Returns the alerts to dispatch this tick:
    /// newly dispatched breaches and Info-severity resolution events. A
    /// kind whose metric is unavailable holds its state unchanged.
    pub fn evaluate(&mut self, snapshot: &Arc<MetricsSnapshot>) -> Vec<Alert> {
        let now = snapshot.captured_at;
        let resolution_throttle = self.alerts.resolution_throttle();
        let mut out = Vec::new();

        for kind in AlertKind::ALL {
            let Some(obs) = self.observe(kind, snapshot) else {
                continue;
            };
            let throttle = self.alerts.throttle_for(kind);
            let state = self.states.entry(kind).or_default();

            if let Some(severity) = obs.breach {
                state.ticks_below_clear = 0;
                if state.phase == AlertPhase::Inactive {
                    state.last_triggered_at = Some(now);
                }
                state.phase = AlertPhase::Active;
                state.last_severity = severity;
                state.last_value = obs.value;

                let due = match state.last_dispatched_at {
                    None => true,
                    Some(previous) => {
                        now.duration_since(previous).unwrap_or(Duration::ZERO) >= throttle
                    }
                };
                if due {
                    let mut message = breach_message(kind, &obs);
                    if state.suppressed_count > 0 {
                        message.push_str(&format!(
                            " ({} suppressed since last dispatch)",
                            state.suppressed_count
                        ));
                    }
                    out.push(Alert {
                        kind,
                        severity,
                        message,
                        raised_at: now,
                        value: Some(obs.value),
                        threshold: Some(obs.threshold),
                        suppressed_since_last: state.suppressed_count,
                        snapshot: Arc::clone(snapshot),
                    });
                    state.last_dispatched_at = Some(now);
                    state.suppressed_count = 0;
                    state.phase = AlertPhase::Dispatched;
                } else {
                    state.suppressed_count += 1;
                    state.phase = AlertPhase::Suppressed;
                }
            } else if state.phase != AlertPhase::Inactive {
                if obs.cleared {
                    state.ticks_below_clear += 1;
                    if state.ticks_below_clear >= 2 {
                        state.phase = AlertPhase::Resolved;
                        let due = match state.last_resolution_sent_at {
                            None => true,
                            Some(previous) => {
                                now.duration_since(previous).unwrap_or(Duration::ZERO)
                                    >= resolution_throttle
                            }
                        };
                        if due {
                            out.push(Alert {
                                kind,
                                severity: AlertSeverity::Info,
                                message: format!("{} resolved", kind.label()),
                                raised_at: now,
                                value: Some(obs.value),
                                threshold: None,
                                suppressed_since_last: 0,
                                snapshot: Arc::clone(snapshot),
                            });
                            state.last_resolution_sent_at = Some(now);
                        }
                        state.phase = AlertPhase::Inactive;
                        state.suppressed_count = 0;
                        state.ticks_below_clear = 0;
                        state.last_triggered_at = None;
                    }
                } else {
                    // Inside the hysteresis band: breached state persists.
                    state.ticks_below_clear = 0;
                }
            }
        }

        out
    }

    /// Kinds currently in a breached state, for the published status.
    pub fn active_alerts(&self) -> Vec<ActiveAlert> {
        let mut active = Vec::new();
        for (kind, state) in &self.states {
            if !matches!(state.phase, AlertPhase::Suppressed | AlertPhase::Dispatched) {
                continue;
            }
            let Some(since) = state.last_triggered_at else {
                continue;
            };
            active.push(ActiveAlert {
                kind: *kind,
                severity: state.last_severity,
                message: active_message(*kind, state.last_value),
                since,
                suppressed_count: state.suppressed_count,
            });
        }
        active
    }

    pub fn phase(&self, kind: AlertKind) -> AlertPhase {
        self.states
            .get(&kind)
            .map(|state| state.phase)
            .unwrap_or(AlertPhase::Inactive)
    }

    fn observe(&self, kind: AlertKind, snapshot: &MetricsSnapshot) -> Option<Observation> {
        match kind {
            AlertKind::OomPrediction => {
                let breached = snapshot
                    .predicted_oom_in
                    .is_some_and(|eta| eta <= self.oom_threshold);
                let value = snapshot
                    .predicted_oom_in
                    .map(|eta| eta.as_secs_f64())
                    .unwrap_or(f64::INFINITY);
                Some(Observation {
                    value,
                    breach: breached.then_some(AlertSeverity::Critical),
                    cleared: !breached,
                    threshold: self.oom_threshold.as_secs_f64(),
                })
            }
            AlertKind::StuckThreads => {
                let count = snapshot.stuck_thread_count?;
                Some(self.threshold_observation(f64::from(count), &self.thresholds.stuck_threads))
            }
            AlertKind::HeapCritical => {
                let value = snapshot.heap_used_pct?;
                Some(self.threshold_observation(value, &self.thresholds.heap))
            }
            AlertKind::OldgenHigh => {
                let value = snapshot.oldgen_used_pct?;
                Some(self.threshold_observation(value, &self.thresholds.oldgen))
            }
            AlertKind::ThreadpoolSaturation => {
                let value = snapshot.thread_pool_util_pct?;
                Some(self.threshold_observation(value, &self.thresholds.thread_pool))
            }
            AlertKind::CpuHigh => {
                let value = snapshot.cpu_pct?;
                Some(self.threshold_observation(value, &self.thresholds.cpu))
            }
            AlertKind::MemHigh => {
                let value = snapshot.mem_pct?;
                Some(self.threshold_observation(value, &self.thresholds.memory))
            }
        }
    }

    fn threshold_observation(&self, value: f64, rule: &RuleConfig) -> Observation {
        let breach = if value >= rule.critical {
            Some(AlertSeverity::Critical)
        } else if value >= rule.warn {
            Some(AlertSeverity::Warning)
        } else {
            None
        };
        let threshold = match breach {
            Some(AlertSeverity::Critical) => rule.critical,
            _ => rule.warn,
        };
        Observation {
            value,
            breach,
            cleared: value < rule.clear,
            threshold,
        }
    }
}

fn breach_message(kind: AlertKind, obs: &Observation) -> String {
    match kind {
        AlertKind::HeapCritical => format!(
            "Heap usage at {:.1}% (threshold {:.1}%)",
            obs.value, obs.threshold
        ),
        AlertKind::OldgenHigh => format!(
            "OldGen usage at {:.1}% (threshold {:.1}%)",
            obs.value, obs.threshold
        ),
        AlertKind::OomPrediction => format!(
            "Heap exhaustion predicted in {:.1} minutes",
            obs.value / 60.0
        ),
        AlertKind::StuckThreads => {
            format!("{:.0} threads stuck or blocked", obs.value)
        }
        AlertKind::ThreadpoolSaturation => format!(
            "Thread pool utilization at {:.1}% (threshold {:.1}%)",
            obs.value, obs.threshold
        ),
        AlertKind::CpuHigh => format!(
            "CPU usage at {:.1}% (threshold {:.1}%)",
            obs.value, obs.threshold
        ),
        AlertKind::MemHigh => format!(
            "Memory usage at {:.1}% (threshold {:.1}%)",
            obs.value, obs.threshold
        ),
    }
}

fn active_message(kind: AlertKind, value: f64) -> String {
    match kind {
        AlertKind::OomPrediction => {
            format!("Heap exhaustion predicted in {:.1} minutes", value / 60.0)
        }
        AlertKind::StuckThreads => format!("{value:.0} threads stuck or blocked"),
        _ => format!("{} at {:.1}%", kind.label(), value),
    }
}
