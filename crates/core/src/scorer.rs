//! Composite health scoring.
//!
//! Each monitored metric maps to a 0-100 component score by piecewise-linear
//! interpolation between its warn and critical thresholds; stuck threads use
//! a step function. The overall score is the weighted sum of the available
//! components, with weights renormalized when a collector failed so one
//! missing input cannot distort the result.

use crate::config::{ScoringConfig, ThresholdsConfig};
use crate::models::{ComponentScores, HealthScore, HealthStatus, MetricsSnapshot};

#[derive(Debug, Clone)]
pub struct HealthScorer {
    scoring: ScoringConfig,
    thresholds: ThresholdsConfig,
}

impl HealthScorer {
    pub fn new(scoring: ScoringConfig, thresholds: ThresholdsConfig) -> Self {
        Self {
            scoring,
            thresholds,
        }
    }

    pub fn score(&self, snapshot: &MetricsSnapshot) -> HealthScore {
        let components = ComponentScores {
            heap: snapshot
                .heap_used_pct
                .map(|value| piecewise(value, self.thresholds.heap.warn, self.thresholds.heap.critical)),
            thread_pool: snapshot.thread_pool_util_pct.map(|value| {
                piecewise(
                    value,
                    self.thresholds.thread_pool.warn,
                    self.thresholds.thread_pool.critical,
                )
            }),
            cpu: snapshot
                .cpu_pct
                .map(|value| piecewise(value, self.thresholds.cpu.warn, self.thresholds.cpu.critical)),
            memory: snapshot.mem_pct.map(|value| {
                piecewise(
                    value,
                    self.thresholds.memory.warn,
                    self.thresholds.memory.critical,
                )
            }),
            stuck_threads: snapshot
                .stuck_thread_count
                .map(|count| stuck_score(count, self.scoring.stuck_thread_cap)),
        };

        let weights = &self.scoring.weights;
        let weighted = [
            (components.heap, weights.heap),
            (components.thread_pool, weights.thread_pool),
            (components.cpu, weights.cpu),
            (components.memory, weights.memory),
            (components.stuck_threads, weights.stuck_threads),
        ];

        let mut weight_total = 0.0;
        let mut score_total = 0.0;
        for (score, weight) in weighted {
            if let Some(score) = score {
                weight_total += weight;
                score_total += score * weight;
            }
        }

        if weight_total <= 0.0 {
            return HealthScore::unknown();
        }

        let overall = (score_total / weight_total).clamp(0.0, 100.0);
        HealthScore {
            overall,
            components,
            status: self.status_for(overall),
        }
    }

    fn status_for(&self, overall: f64) -> HealthStatus {
        if overall >= self.scoring.healthy_min {
            HealthStatus::Healthy
        } else if overall >= self.scoring.warning_min {
            HealthStatus::Warning
        } else {
            HealthStatus::Critical
        }
    }
}

/// 100 at or below warn, 0 at or above critical, linear in between.
fn piecewise(value: f64, warn: f64, critical: f64) -> f64 {
    if value <= warn {
        100.0
    } else if value >= critical {
        0.0
    } else {
        100.0 * (critical - value) / (critical - warn)
    }
}

/// 100 with no stuck threads, decreasing linearly to 0 at the cap.
fn stuck_score(count: u32, cap: u32) -> f64 {
    if count == 0 {
        return 100.0;
    }
    if count >= cap {
        return 0.0;
    }
    100.0 * f64::from(cap - count) / f64::from(cap)
}
